use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sse::SseDecoder;
use crate::error::SessionError;
use crate::signaling::SessionId;
use crate::view::{Element, SessionView, TranscriptDirection, TranscriptEntry};

pub const OUTPUTS_PATH: &str = "/outputs";

/// One server-pushed event, discriminated by `role`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Transcription of what the user said
    User {
        #[serde(default)]
        content: Option<String>,
    },
    /// The assistant's reply text
    Ai {
        #[serde(default)]
        content: Option<String>,
    },
    /// Server speech playback marker
    Speech {
        #[serde(default)]
        state: SpeechState,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechState {
    Starting,
    /// Any state other than `starting`, including null, missing and non-string values
    #[default]
    Stopped,
}

impl<'de> Deserialize<'de> for SpeechState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("starting") => SpeechState::Starting,
            _ => SpeechState::Stopped,
        })
    }
}

/// Apply one stream event to the view
pub fn dispatch_stream_event(event: &StreamEvent, view: &dyn SessionView) {
    match event {
        StreamEvent::User { content } => append_transcript(TranscriptDirection::Sent, content, view),
        StreamEvent::Ai { content } => append_transcript(TranscriptDirection::Received, content, view),
        StreamEvent::Speech { state } => match state {
            SpeechState::Starting => {
                view.hide(Element::Processing);
                view.show(Element::Waveform);
            }
            SpeechState::Stopped => view.hide(Element::Waveform),
        },
        StreamEvent::Unknown => debug!("Ignoring stream event with unknown role"),
    }
}

fn append_transcript(direction: TranscriptDirection, content: &Option<String>, view: &dyn SessionView) {
    let Some(text) = content.as_deref().filter(|text| !text.trim().is_empty()) else {
        return;
    };

    view.append_transcript(TranscriptEntry {
        direction,
        text: text.to_string(),
    });
}

/// Decode an event-stream body into a lazy sequence of stream events
///
/// Undecodable payloads and transport errors surface as `StreamDelivery`
/// items; the sequence ends when the body ends.
pub fn decode_events<S, E>(body: S) -> impl Stream<Item = Result<StreamEvent, SessionError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::<String>::new());

    stream::unfold(state, |(mut body, mut decoder, mut ready)| async move {
        loop {
            if let Some(payload) = ready.pop_front() {
                let item = serde_json::from_str::<StreamEvent>(&payload).map_err(|e| {
                    SessionError::StreamDelivery(format!("undecodable event {payload:?}: {e}"))
                });
                return Some((item, (body, decoder, ready)));
            }

            match body.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.feed(&chunk)),
                Some(Err(e)) => {
                    let item = Err(SessionError::StreamDelivery(e.to_string()));
                    return Some((item, (body, decoder, ready)));
                }
                None => return None,
            }
        }
    })
}

/// Handle to a running subscription; dropping it closes the stream
pub struct EventStreamHandle {
    session_id: SessionId,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for EventStreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribes to the server's push-event stream for a session
#[derive(Clone)]
pub struct EventStreamListener {
    http: reqwest::Client,
    base_url: String,
    view: Arc<dyn SessionView>,
}

impl EventStreamListener {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, view: Arc<dyn SessionView>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            view,
        }
    }

    /// Open the stream for `session_id` and dispatch its events to the view.
    ///
    /// Delivery is at-most-once; a dropped stream is not resubscribed.
    pub fn subscribe(&self, session_id: &SessionId) -> EventStreamHandle {
        let listener = self.clone();
        let id = session_id.clone();

        let task = tokio::spawn(async move {
            let events = match listener.open(&id).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("{}", e);
                    return;
                }
            };

            info!("Event stream open for session {}", id);
            let mut events = Box::pin(events);
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        debug!("event: {:?}", event);
                        dispatch_stream_event(&event, listener.view.as_ref());
                    }
                    Err(e) => warn!("{}", e),
                }
            }
            warn!("Event stream for session {} ended", id);
        });

        EventStreamHandle {
            session_id: session_id.clone(),
            task,
        }
    }

    /// Issue the stream request and return the decoded event sequence
    pub async fn open(
        &self,
        session_id: &SessionId,
    ) -> Result<impl Stream<Item = Result<StreamEvent, SessionError>>, SessionError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), OUTPUTS_PATH);

        let response = self
            .http
            .get(url)
            .query(&[("webrtc_id", session_id.as_str())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| SessionError::StreamDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::StreamDelivery(format!(
                "event stream rejected with status {status}"
            )));
        }

        Ok(decode_events(response.bytes_stream()))
    }
}
