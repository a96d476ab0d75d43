use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::rtc::RtcConfig;

/// Delay between `stop` and closing the connection, letting in-flight sends settle
pub const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Configuration for a conversation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the server hosting `/webrtc/offer` and `/outputs`
    pub server_url: String,

    /// Peer connection options
    pub rtc: RtcConfig,

    /// Where local audio comes from
    pub audio_source: AudioSource,

    /// Capture format
    pub audio: AudioBackendConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            rtc: RtcConfig::default(),
            audio_source: AudioSource::Microphone,
            audio: AudioBackendConfig::default(),
        }
    }
}
