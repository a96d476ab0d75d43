use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::rtc::RtcConfig;
use crate::session::SessionConfig;

/// Environment variable prefix, e.g. `VOICE_RTC__SERVER__BASE_URL`
pub const ENV_PREFIX: &str = "VOICE_RTC";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rtc: RtcConfig,
    pub audio: AudioConfig,
    pub session: SelectionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceKind {
    File,
    Microphone,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub source: AudioSourceKind,
    pub file_path: Option<PathBuf>,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let backend = AudioBackendConfig::default();
        Self {
            source: AudioSourceKind::Microphone,
            file_path: None,
            sample_rate: backend.target_sample_rate,
            channels: backend.target_channels,
            buffer_duration_ms: backend.buffer_duration_ms,
        }
    }
}

/// Preset/model to select once the session is up
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub preset: Option<String>,
    pub model: Option<String>,
}

impl Config {
    /// Load from an optional config file, overlaid with `VOICE_RTC__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn audio_source(&self) -> Result<AudioSource> {
        match (self.audio.source, &self.audio.file_path) {
            (AudioSourceKind::Microphone, _) => Ok(AudioSource::Microphone),
            (AudioSourceKind::File, Some(path)) => Ok(AudioSource::File(path.clone())),
            (AudioSourceKind::File, None) => bail!("audio.source = \"file\" requires audio.file_path"),
        }
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig {
            server_url: self.server.base_url.clone(),
            rtc: self.rtc.clone(),
            audio_source: self.audio_source()?,
            audio: AudioBackendConfig {
                target_sample_rate: self.audio.sample_rate,
                target_channels: self.audio.channels,
                buffer_duration_ms: self.audio.buffer_duration_ms,
            },
        })
    }
}
