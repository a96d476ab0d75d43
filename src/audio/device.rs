// cpal-backed audio devices
//
// cpal streams are not Send, so each stream lives on its own thread and is
// dropped (stopping it) when that thread receives its shutdown signal.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, AudioPlayback, FrameAssembler};
use super::codec::{downmix_to_mono, resample_frame};

/// Captured frames buffered before the consumer falls behind
const CAPTURE_QUEUE: usize = 256;

/// Playback buffer cap, in seconds of device audio
const PLAYBACK_BUFFER_SECS: usize = 2;

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

fn i16_to_u16(sample: i16) -> u16 {
    (sample as i32 + 32768) as u16
}

// ============================================================================
// Capture
// ============================================================================

/// Live capture from the default input device
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    device_name: String,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            device_name: "default input".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let frame_ms = self.config.buffer_duration_ms;
        let capturing = Arc::clone(&self.capturing);

        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(frame_ms, tx) {
                    Ok((stream, name)) => {
                        capturing.store(true, Ordering::SeqCst);
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Sender dropped counts as shutdown too
                let _ = shutdown_rx.blocking_recv();
                drop(stream);
                capturing.store(false, Ordering::SeqCst);
                info!("Microphone capture stopped");
            })
            .context("Failed to spawn capture thread")?;

        self.device_name = ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited before the stream started"))??;
        self.shutdown = Some(shutdown_tx);

        info!("Capturing from {}", self.device_name);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "Microphone (cpal)"
    }
}

/// Open and start the default input stream at its native format
fn open_input_stream(frame_ms: u64, tx: mpsc::Sender<AudioFrame>) -> Result<(Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No default input device available")?;
    let name = device.name().unwrap_or_else(|_| "unknown input".to_string());

    let supported = device
        .default_input_config()
        .with_context(|| format!("Failed to query input config of {name}"))?;
    let config: StreamConfig = supported.config();
    debug!(
        "Input device {}: {}Hz, {} channels, {:?}",
        name,
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );

    let assembler = FrameAssembler::new(config.sample_rate.0, config.channels, frame_ms);
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&device, &config, assembler, tx, f32_to_i16)?,
        SampleFormat::I16 => build_input::<i16>(&device, &config, assembler, tx, |s| s)?,
        SampleFormat::U16 => build_input::<u16>(&device, &config, assembler, tx, u16_to_i16)?,
        other => bail!("Unsupported input sample format {other:?}"),
    };

    stream
        .play()
        .with_context(|| format!("Failed to start input stream on {name}"))?;
    Ok((stream, name))
}

fn build_input<T: SizedSample + Send + 'static>(
    device: &Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
    tx: mpsc::Sender<AudioFrame>,
    convert: fn(T) -> i16,
) -> Result<Stream> {
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data.iter().map(|&s| convert(s)).collect();
                for frame in assembler.push(&samples) {
                    if let Err(e) = tx.try_send(frame) {
                        warn!("Dropping captured frame: {}", e);
                    }
                }
            },
            |err| error!("Audio capture error: {}", err),
            None,
        )
        .context("Failed to build input stream")?;
    Ok(stream)
}

// ============================================================================
// Playback
// ============================================================================

/// Plays remote audio on the default output device
#[derive(Debug, Default)]
pub struct SpeakerPlayback;

impl SpeakerPlayback {
    pub fn new() -> Self {
        Self
    }
}

impl AudioPlayback for SpeakerPlayback {
    fn play(&self, track_id: &str, mut frames: mpsc::Receiver<AudioFrame>) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No default output device available")?;
        let supported = device
            .default_output_config()
            .context("Failed to query output config")?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        let sample_rate = config.sample_rate.0;
        let channels = config.channels.max(1) as usize;
        let buffer = Arc::new(Mutex::new(VecDeque::<i16>::new()));
        let (done_tx, done_rx) = oneshot::channel::<()>();

        // Frames are conditioned to the device format on the runtime side
        let feed = Arc::clone(&buffer);
        let track = track_id.to_string();
        tokio::spawn(async move {
            let cap = sample_rate as usize * channels * PLAYBACK_BUFFER_SECS;
            while let Some(frame) = frames.recv().await {
                let mono = resample_frame(downmix_to_mono(frame), sample_rate);
                let Ok(mut buffer) = feed.lock() else {
                    break;
                };
                for sample in mono.samples {
                    for _ in 0..channels {
                        buffer.push_back(sample);
                    }
                }
                let overflow = buffer.len().saturating_sub(cap);
                buffer.drain(..overflow);
            }
            debug!("Remote audio {} ended", track);
            let _ = done_tx.send(());
        });

        let name = device.name().unwrap_or_else(|_| "unknown output".to_string());
        std::thread::Builder::new()
            .name("speaker-playback".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::F32 => build_output::<f32>(&device, &config, buffer, i16_to_f32),
                    SampleFormat::I16 => build_output::<i16>(&device, &config, buffer, |s| s),
                    SampleFormat::U16 => build_output::<u16>(&device, &config, buffer, i16_to_u16),
                    other => Err(anyhow!("Unsupported output sample format {other:?}")),
                };
                let started = stream.and_then(|stream| {
                    stream.play().context("Failed to start output stream")?;
                    Ok(stream)
                });
                let stream = match started {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Audio playback on {} failed: {:#}", name, e);
                        return;
                    }
                };

                info!("Playing remote audio on {}", name);
                let _ = done_rx.blocking_recv();
                drop(stream);
                info!("Audio playback on {} stopped", name);
            })
            .context("Failed to spawn playback thread")?;

        Ok(())
    }

    fn name(&self) -> &str {
        "Speaker (cpal)"
    }
}

fn build_output<T: SizedSample + Send + 'static>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    convert: fn(i16) -> T,
) -> Result<Stream> {
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut buffer = match buffer.lock() {
                    Ok(buffer) => buffer,
                    Err(_) => {
                        data.fill(convert(0));
                        return;
                    }
                };
                for out in data.iter_mut() {
                    *out = convert(buffer.pop_front().unwrap_or(0));
                }
            },
            |err| error!("Audio playback error: {}", err),
            None,
        )
        .context("Failed to build output stream")?;
    Ok(stream)
}
