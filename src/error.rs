use thiserror::Error;

use crate::rtc::ConnectionState;

/// Failures surfaced at the session controller boundary.
///
/// Every variant leaves the controller in `Idle` with no connection retained.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Audio capture could not be obtained (permission or device failure)
    #[error("media acquisition failed: {0:#}")]
    MediaAcquisition(anyhow::Error),

    /// The offer/answer exchange with the server failed
    #[error("signaling failed: {0}")]
    Signaling(#[from] SignalingError),

    /// The peer connection or control channel could not be set up
    #[error("connection setup failed: {0:#}")]
    Connection(anyhow::Error),

    /// The transport reported a failed or disconnected state
    #[error("connection entered state {0}")]
    ConnectionState(ConnectionState),

    /// The push-event stream could not be delivered
    #[error("event stream delivery failed: {0}")]
    StreamDelivery(String),

    /// An operation needed a live session but none exists
    #[error("no active session")]
    NotActive,
}

/// Failures of the HTTP offer/answer exchange.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("request to signaling endpoint failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("signaling endpoint rejected the offer with status {status}")]
    Rejected { status: u16 },

    #[error("malformed answer: {0}")]
    MalformedAnswer(String),

    #[error("expected an answer description, got {0}")]
    UnexpectedSdpType(String),

    #[error("peer rejected session description: {0:#}")]
    Peer(anyhow::Error),
}
