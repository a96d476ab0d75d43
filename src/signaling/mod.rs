//! HTTP offer/answer and ICE candidate exchange
//!
//! Both message shapes go to `POST /webrtc/offer`:
//! - offer: `{"sdp", "type", "webrtc_id"}`, answered with `{"sdp", "type"}`
//! - candidate: `{"candidate", "webrtc_id", "type": "ice-candidate"}`, fire-and-forget

use rand::Rng;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SignalingError};
use crate::events::{EventStreamHandle, EventStreamListener};
use crate::rtc::{IceCandidate, PeerConnection, SdpType, SessionDescription};

pub const OFFER_PATH: &str = "/webrtc/offer";

const SESSION_ID_LEN: usize = 10;
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque client-minted token correlating signaling, control channel and push stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..SESSION_ID_LEN)
            .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Serialize)]
struct OfferRequest<'a> {
    sdp: &'a str,
    #[serde(rename = "type")]
    kind: SdpType,
    webrtc_id: &'a str,
}

#[derive(Serialize)]
struct CandidateRequest<'a> {
    candidate: &'a IceCandidate,
    webrtc_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Outcome of a successful negotiation
pub struct NegotiatedSession {
    pub session_id: SessionId,
    pub events: EventStreamHandle,
}

#[derive(Clone)]
pub struct SignalingClient {
    http: reqwest::Client,
    base_url: String,
}

impl SignalingClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), OFFER_PATH)
    }

    /// Run the offer/answer exchange for `peer` under a fresh session id,
    /// then open the push-event stream for that id.
    ///
    /// Candidates are forwarded as they are discovered; the candidate handler is
    /// installed before the local description is applied because gathering
    /// only starts once it is. The event stream is opened only after the
    /// remote description has been applied.
    pub async fn negotiate(
        &self,
        peer: &dyn PeerConnection,
        listener: &EventStreamListener,
    ) -> Result<NegotiatedSession, SessionError> {
        let offer = peer.create_offer().await.map_err(SignalingError::Peer)?;
        let session_id = SessionId::random();
        info!("Negotiating session {}", session_id);

        let client = self.clone();
        let id = session_id.clone();
        peer.on_ice_candidate(Box::new(move |candidate| {
            client.forward_candidate(candidate, &id);
        }));

        peer.set_local_description(offer.clone())
            .await
            .map_err(SignalingError::Peer)?;

        let answer = self.send_offer(&offer, &session_id).await?;

        peer.set_remote_description(answer)
            .await
            .map_err(SignalingError::Peer)?;
        info!("Remote description applied for session {}", session_id);

        let events = listener.subscribe(&session_id);

        Ok(NegotiatedSession { session_id, events })
    }

    /// POST the offer and return the server's answer
    pub async fn send_offer(
        &self,
        offer: &SessionDescription,
        session_id: &SessionId,
    ) -> Result<SessionDescription, SignalingError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&OfferRequest {
                sdp: &offer.sdp,
                kind: offer.kind,
                webrtc_id: session_id.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalingError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let answer: SessionDescription = serde_json::from_str(&body)
            .map_err(|e| SignalingError::MalformedAnswer(e.to_string()))?;

        if answer.kind != SdpType::Answer {
            return Err(SignalingError::UnexpectedSdpType(answer.kind.to_string()));
        }

        Ok(answer)
    }

    /// POST one candidate
    pub async fn send_candidate(
        &self,
        candidate: &IceCandidate,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&CandidateRequest {
                candidate,
                webrtc_id: session_id.as_str(),
                kind: "ice-candidate",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalingError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Send a candidate in the background; failures are logged, never retried
    pub fn forward_candidate(&self, candidate: IceCandidate, session_id: &SessionId) {
        let client = self.clone();
        let session_id = session_id.clone();

        tokio::spawn(async move {
            debug!("Sending ICE candidate {}", candidate.candidate);
            if let Err(e) = client.send_candidate(&candidate, &session_id).await {
                warn!("Failed to send ICE candidate for session {}: {}", session_id, e);
            }
        });
    }
}
