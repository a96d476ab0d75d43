//! Control channel protocol
//!
//! Outbound messages are plain strings (`"preset:<id>"`, `"model:<id>"`, plus a
//! greeting once the channel opens). Inbound messages are JSON objects of the
//! form `{"type": "log", "data": "<marker>"}`; anything unrecognized is ignored.

use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::rtc::DataChannel;
use crate::view::{Element, SessionView};

/// Sent once when the channel opens
pub const GREETING: &str = "Hello server";

/// Messages the client sends on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Greeting,
    Preset(String),
    Model(String),
}

impl ControlMessage {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Greeting => f.write_str(GREETING),
            ControlMessage::Preset(id) => write!(f, "preset:{id}"),
            ControlMessage::Model(id) => write!(f, "model:{id}"),
        }
    }
}

/// Messages received on the control channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    Log { data: LogMarker },
    #[serde(other)]
    Unknown,
}

/// Speech-activity markers carried by `log` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMarker {
    StartedTalking,
    PauseDetected,
    ResponseStarting,
    #[serde(other)]
    Unrecognized,
}

pub fn parse_control_event(raw: &str) -> serde_json::Result<ControlEvent> {
    serde_json::from_str(raw)
}

/// Apply an inbound event to the view
pub fn apply_control_event(event: &ControlEvent, view: &dyn SessionView) {
    match event {
        ControlEvent::Log { data } => match data {
            LogMarker::StartedTalking => view.hide(Element::Processing),
            LogMarker::PauseDetected => view.show(Element::Processing),
            LogMarker::ResponseStarting => {
                view.hide(Element::Processing);
                view.show(Element::Waveform);
            }
            LogMarker::Unrecognized => debug!("Ignoring unrecognized log marker"),
        },
        ControlEvent::Unknown => debug!("Ignoring control event of unknown type"),
    }
}

/// Decode and apply one raw inbound message; undecodable payloads are dropped
pub fn handle_control_message(raw: &str, view: &dyn SessionView) {
    match parse_control_event(raw) {
        Ok(event) => apply_control_event(&event, view),
        Err(e) => debug!("Ignoring undecodable control message {:?}: {}", raw, e),
    }
}

pub async fn send(channel: &dyn DataChannel, message: &ControlMessage) -> Result<()> {
    debug!("Sending control message on {}: {}", channel.label(), message);
    channel.send_text(&message.encode()).await
}

/// Register the protocol's open/message/close handlers on a freshly created channel
pub fn bind(channel: &Arc<dyn DataChannel>, view: Arc<dyn SessionView>) {
    let weak = Arc::downgrade(channel);
    channel.on_open(Box::new(move || {
        info!("Data channel is open and ready to use");
        if let Some(channel) = weak.upgrade() {
            tokio::spawn(async move {
                if let Err(e) = send(channel.as_ref(), &ControlMessage::Greeting).await {
                    warn!("Failed to send greeting: {:#}", e);
                }
            });
        }
    }));

    channel.on_message(Box::new(move |text| {
        debug!("Received message: {}", text);
        handle_control_message(&text, view.as_ref());
    }));

    channel.on_close(Box::new(|| {
        info!("Data channel is closed");
    }));
}
