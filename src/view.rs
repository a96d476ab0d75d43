//! UI collaborator contract
//!
//! The session core only triggers effects (visibility toggles, status text,
//! transcript entries); how they are rendered is up to the implementor.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::{AudioFrame, AudioPlayback};
use crate::rtc::RemoteTrack;

/// UI elements the session toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    SessionName,
    Presets,
    Models,
    Messages,
    Camera,
    /// "Processing" spinner shown while the server works on a reply
    Processing,
    /// Waveform shown while the server is speaking
    Waveform,
}

impl Element {
    /// Revealed by a successful start
    pub const SESSION: [Element; 5] = [
        Element::SessionName,
        Element::Presets,
        Element::Models,
        Element::Messages,
        Element::Camera,
    ];

    /// Hidden again by stop; the message list stays readable
    pub const SESSION_CONTROLS: [Element; 4] = [
        Element::SessionName,
        Element::Presets,
        Element::Models,
        Element::Camera,
    ];
}

/// Mic button indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    On,
    Off,
    /// Starting or stopping
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptDirection {
    /// Spoken by the local user
    Sent,
    /// Spoken by the assistant
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub direction: TranscriptDirection,
    pub text: String,
}

pub trait SessionView: Send + Sync {
    fn set_status(&self, status: &str);

    fn set_visible(&self, element: Element, visible: bool);

    fn set_mic(&self, state: MicState);

    fn append_transcript(&self, entry: TranscriptEntry);

    fn set_session_name(&self, name: &str);

    /// Route remote audio to playback.
    ///
    /// Without a playback sink the frames are drained and discarded.
    fn attach_remote_audio(&self, track: &RemoteTrack, frames: mpsc::Receiver<AudioFrame>) {
        warn!("No playback for remote {} track {}, discarding its audio", track.kind, track.id);
        drain(frames);
    }

    fn show(&self, element: Element) {
        self.set_visible(element, true);
    }

    fn hide(&self, element: Element) {
        self.set_visible(element, false);
    }
}

fn drain(mut frames: mpsc::Receiver<AudioFrame>) {
    tokio::spawn(async move { while frames.recv().await.is_some() {} });
}

/// Renders session effects to the terminal and plays remote audio
#[derive(Default)]
pub struct ConsoleView {
    playback: Option<Arc<dyn AudioPlayback>>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playback(playback: Arc<dyn AudioPlayback>) -> Self {
        Self {
            playback: Some(playback),
        }
    }
}

impl SessionView for ConsoleView {
    fn set_status(&self, status: &str) {
        info!("Connection status: {}", status);
    }

    fn set_visible(&self, element: Element, visible: bool) {
        match (element, visible) {
            (Element::Processing, true) => println!("… processing"),
            (Element::Waveform, true) => println!("♪ speaking"),
            _ => {}
        }
    }

    fn set_mic(&self, state: MicState) {
        info!("Mic: {:?}", state);
    }

    fn append_transcript(&self, entry: TranscriptEntry) {
        match entry.direction {
            TranscriptDirection::Sent => println!("you> {}", entry.text),
            TranscriptDirection::Received => println!("ai > {}", entry.text),
        }
    }

    fn set_session_name(&self, name: &str) {
        info!("Session: {}", name);
    }

    fn attach_remote_audio(&self, track: &RemoteTrack, frames: mpsc::Receiver<AudioFrame>) {
        let Some(playback) = &self.playback else {
            warn!("No playback device, discarding remote audio {}", track.id);
            drain(frames);
            return;
        };

        info!("Playing remote {} track {} through {}", track.kind, track.id, playback.name());
        if let Err(e) = playback.play(&track.id, frames) {
            warn!("Failed to play remote audio {}: {:#}", track.id, e);
        }
    }
}
