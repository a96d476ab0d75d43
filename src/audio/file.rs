use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Unsupported WAV format: {}-bit {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into frames of `frame_ms` each, timestamped from zero
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame =
            (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(index, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: index as u64 * frame_ms,
            })
            .collect()
    }
}

/// Capture backend that replays a WAV file at real-time pace
pub struct FileBackend {
    file: Arc<AudioFile>,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;

        Ok(Self {
            file: Arc::new(file),
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let frame_ms = self.config.buffer_duration_ms.max(1);
        let frames = self.file.frames(frame_ms);
        let (tx, rx) = mpsc::channel(64);

        info!(
            "Replaying {} ({} frames of {}ms)",
            self.file.path,
            frames.len(),
            frame_ms
        );

        self.capturing.store(true, Ordering::SeqCst);
        let capturing = Arc::clone(&self.capturing);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) || tx.send(frame).await.is_err() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
            debug!("File replay finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            info!("File audio capture stopped");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
