use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[cfg(feature = "device-cpal")]
use super::device::{MicrophoneBackend, SpeakerPlayback};
use super::file::FileBackend;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate the outgoing track is encoded at
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 8000, // PCMU clock rate
            target_channels: 1,       // Mono
            buffer_duration_ms: 20,   // One RTP packet
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: default input device through cpal (`device-cpal` feature)
/// - File: replays a WAV file in real time (headless sessions, tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Plays remote audio as it arrives
pub trait AudioPlayback: Send + Sync {
    /// Start playing `frames`; playback ends when the sender side is dropped
    fn play(&self, track_id: &str, frames: mpsc::Receiver<AudioFrame>) -> Result<()>;

    /// Get playback name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the requested source
    pub fn create(
        source: &AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            #[cfg(feature = "device-cpal")]
            AudioSource::Microphone => Ok(Box::new(MicrophoneBackend::new(config))),

            #[cfg(not(feature = "device-cpal"))]
            AudioSource::Microphone => {
                anyhow::bail!("Microphone capture requires building with the `device-cpal` feature")
            }

            AudioSource::File(path) => {
                let backend = FileBackend::new(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }

    /// Create playback on the default output device
    pub fn create_playback() -> Result<Arc<dyn AudioPlayback>> {
        #[cfg(feature = "device-cpal")]
        {
            Ok(Arc::new(SpeakerPlayback::new()))
        }

        #[cfg(not(feature = "device-cpal"))]
        {
            anyhow::bail!("Audio playback requires building with the `device-cpal` feature")
        }
    }
}

/// Cuts a continuous sample stream into fixed-duration frames
///
/// Device callbacks deliver buffers of arbitrary size; frames leave with
/// timestamps counted from the first sample.
#[derive(Debug)]
pub struct FrameAssembler {
    sample_rate: u32,
    channels: u16,
    frame_ms: u64,
    frame_len: usize,
    pending: Vec<i16>,
    emitted: u64,
}

impl FrameAssembler {
    pub fn new(sample_rate: u32, channels: u16, frame_ms: u64) -> Self {
        let frame_ms = frame_ms.max(1);
        let per_channel = (sample_rate as u64 * frame_ms / 1000).max(1) as usize;
        let frame_len = per_channel * channels.max(1) as usize;

        Self {
            sample_rate,
            channels,
            frame_ms,
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
            emitted: 0,
        }
    }

    /// Samples per frame, all channels included
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Feed interleaved samples; returns every frame now complete
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: self.emitted * self.frame_ms,
            });
            self.emitted += 1;
        }
        frames
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Live microphone input
    Microphone,
    /// File input, replayed in real time
    File(PathBuf),
}
