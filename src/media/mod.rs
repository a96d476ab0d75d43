//! Local media acquisition
//!
//! Turns the configured [`AudioSource`] into a running capture backend and
//! exposes its output as attachable audio tracks. Video is never requested.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
use crate::error::SessionError;

/// One captured audio track, ready to be attached to a peer connection
pub struct LocalAudioTrack {
    /// Track identifier announced in the offer
    pub id: String,
    /// Frame size the backend produces, in milliseconds
    pub frame_ms: u64,
    /// Captured frames
    pub frames: mpsc::Receiver<AudioFrame>,
}

/// Handle to acquired local media
///
/// Owns the capture backend; dropping the tracks does not stop capture,
/// [`LocalMedia::stop`] does.
pub struct LocalMedia {
    backend: Box<dyn AudioBackend>,
    tracks: Vec<LocalAudioTrack>,
}

impl LocalMedia {
    /// Take every audio track out of the handle for attachment
    pub fn take_audio_tracks(&mut self) -> Vec<LocalAudioTrack> {
        std::mem::take(&mut self.tracks)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_capturing(&self) -> bool {
        self.backend.is_capturing()
    }

    /// Release the capture device
    pub async fn stop(mut self) {
        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop {}: {:#}", self.backend.name(), e);
        }
    }
}

/// Requests local audio capture
#[derive(Debug, Clone)]
pub struct MediaAcquisition {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl MediaAcquisition {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    /// Acquire audio capture. No retry is attempted on failure.
    pub async fn acquire_audio(&self) -> Result<LocalMedia, SessionError> {
        let mut backend = AudioBackendFactory::create(&self.source, self.config.clone())
            .map_err(SessionError::MediaAcquisition)?;

        let frames = backend
            .start()
            .await
            .map_err(SessionError::MediaAcquisition)?;

        info!("Acquired audio from {}", backend.name());

        Ok(LocalMedia {
            backend,
            tracks: vec![LocalAudioTrack {
                id: "audio".to_string(),
                frame_ms: self.config.buffer_duration_ms,
                frames,
            }],
        })
    }
}
