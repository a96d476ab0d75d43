//! Peer connection management
//!
//! - `peer`: transport traits and wire types (descriptions, candidates, states)
//! - `webrtc_rs`: the webrtc-rs backed implementation
//! - `manager`: connection creation wired to the view and control protocol

mod manager;
mod peer;
mod webrtc_rs;

pub use manager::{Connection, PeerConnectionManager, RtcConfig, CONTROL_CHANNEL_LABEL, DEFAULT_STUN_URL};
pub use peer::{
    CandidateHandler, ConnectionState, DataChannel, EventHandler, IceCandidate, IceServer,
    MessageHandler, PeerConnection, RemoteAudio, RemoteTrack, RtcBackend, SdpType, SessionDescription,
    StateHandler, TrackHandler,
};
pub use webrtc_rs::{WebRtcBackend, WebRtcDataChannel, WebRtcPeer};
