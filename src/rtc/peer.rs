//! Transport seam: the operations the session needs from a peer connection
//! and its data channels, independent of the WebRTC stack behind them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::media::LocalAudioTrack;

/// Mirrors the transport's reported peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    /// Failed or disconnected; reported but never recovered automatically
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// An offer or answer payload, `{"type": ..., "sdp": ...}` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

/// A discovered ICE candidate in `RTCIceCandidate.toJSON()` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

/// Incoming media announced by the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: String,
}

/// A remote track together with its decoded audio
#[derive(Debug)]
pub struct RemoteAudio {
    pub track: RemoteTrack,
    /// PCM frames decoded from the track's packets
    pub frames: mpsc::Receiver<AudioFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
}

pub type StateHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
pub type CandidateHandler = Box<dyn Fn(IceCandidate) + Send + Sync>;
pub type TrackHandler = Box<dyn Fn(RemoteAudio) + Send + Sync>;
pub type MessageHandler = Box<dyn Fn(String) + Send + Sync>;
pub type EventHandler = Box<dyn Fn() + Send + Sync>;

/// A peer connection as seen by the session
///
/// Registering a handler replaces any previously registered one.
#[async_trait::async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the local description; candidate gathering starts here
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Attach a captured audio track and start sending it
    async fn add_audio_track(&self, track: LocalAudioTrack) -> Result<()>;

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    fn on_connection_state_change(&self, handler: StateHandler);

    fn on_ice_candidate(&self, handler: CandidateHandler);

    fn on_remote_track(&self, handler: TrackHandler);

    fn connection_state(&self) -> ConnectionState;

    async fn close(&self) -> Result<()>;
}

/// A message channel overlaid on a peer connection
#[async_trait::async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Fails unless the channel has been observed open
    async fn send_text(&self, text: &str) -> Result<()>;

    fn on_open(&self, handler: EventHandler);

    fn on_message(&self, handler: MessageHandler);

    fn on_close(&self, handler: EventHandler);

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections
#[async_trait::async_trait]
pub trait RtcBackend: Send + Sync {
    async fn new_peer_connection(&self, ice_servers: Vec<IceServer>) -> Result<Arc<dyn PeerConnection>>;
}
