// Shared fakes for integration tests
//
// - FakeRtcBackend / FakePeer / FakeChannel: in-memory transport that records a journal
// - RecordingView: captures every effect the session triggers on the UI
// - MockServer: axum server implementing /webrtc/offer and the /outputs event stream

#![allow(dead_code)]

use anyhow::{bail, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use voice_rtc_client::audio::{AudioFrame, AudioPlayback};
use voice_rtc_client::media::LocalAudioTrack;
use voice_rtc_client::rtc::{
    CandidateHandler, ConnectionState, DataChannel, EventHandler, IceCandidate, IceServer,
    MessageHandler, PeerConnection, RemoteAudio, RemoteTrack, RtcBackend, SdpType, SessionDescription,
    StateHandler, TrackHandler,
};
use voice_rtc_client::view::{Element, MicState, SessionView, TranscriptEntry};

// ============================================================================
// Journal
// ============================================================================

/// Ordered record of transport and server events, shared between fakes
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn positions(&self, entry: &str) -> Vec<usize> {
        self.entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| *e == entry)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.positions(entry).len()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Fake transport
// ============================================================================

#[derive(Default)]
pub struct FakeRtcBackend {
    pub journal: Journal,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
    pub ice_servers: Mutex<Vec<Vec<IceServer>>>,
    pub fail_data_channel: AtomicBool,
}

impl FakeRtcBackend {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn peer(&self, index: usize) -> Arc<FakePeer> {
        Arc::clone(&self.peers.lock().unwrap()[index])
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl RtcBackend for FakeRtcBackend {
    async fn new_peer_connection(&self, ice_servers: Vec<IceServer>) -> Result<Arc<dyn PeerConnection>> {
        self.journal.push("peer_created");
        self.ice_servers.lock().unwrap().push(ice_servers);

        let peer = Arc::new(FakePeer::new(self.journal.clone()));
        peer.fail_data_channel
            .store(self.fail_data_channel.load(Ordering::SeqCst), Ordering::SeqCst);
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

pub struct FakePeer {
    pub journal: Journal,
    state: Mutex<ConnectionState>,
    state_handler: Mutex<Option<StateHandler>>,
    candidate_handler: Mutex<Option<CandidateHandler>>,
    track_handler: Mutex<Option<TrackHandler>>,
    pub channels: Mutex<Vec<Arc<FakeChannel>>>,
    pub tracks: Mutex<Vec<String>>,
    pub local_set: AtomicBool,
    pub remote_set: AtomicBool,
    pub close_count: AtomicUsize,
    pub fail_data_channel: AtomicBool,
    pub candidates: Vec<IceCandidate>,
}

impl FakePeer {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(ConnectionState::New),
            state_handler: Mutex::new(None),
            candidate_handler: Mutex::new(None),
            track_handler: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            fail_data_channel: AtomicBool::new(false),
            candidates: vec![
                IceCandidate {
                    candidate: "candidate:1 1 udp 2130706431 192.168.1.10 50000 typ host".to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                    username_fragment: Some("abcd".to_string()),
                },
                IceCandidate {
                    candidate: "candidate:2 1 udp 1694498815 203.0.113.7 50001 typ srflx".to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                    username_fragment: Some("abcd".to_string()),
                },
            ],
        }
    }

    /// Report a transport state change as the real stack would
    pub fn emit_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        if let Some(handler) = self.state_handler.lock().unwrap().as_ref() {
            handler(state);
        }
    }

    /// Announce a remote track; frames sent on the returned sender reach the session
    pub fn emit_remote_track(&self, track: RemoteTrack) -> mpsc::Sender<AudioFrame> {
        let (tx, frames) = mpsc::channel(16);
        if let Some(handler) = self.track_handler.lock().unwrap().as_ref() {
            handler(RemoteAudio { track, frames });
        }
        tx
    }

    pub fn channel(&self, index: usize) -> Arc<FakeChannel> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }

    pub fn is_closed(&self) -> bool {
        self.close_count.load(Ordering::SeqCst) > 0
    }
}

#[async_trait::async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpType::Offer,
            sdp: "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=fake-offer\r\n".to_string(),
        })
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        if description.kind != SdpType::Offer {
            bail!("expected a local offer");
        }
        self.journal.push("set_local");
        self.local_set.store(true, Ordering::SeqCst);

        // Gathering starts once the local description is applied
        if let Some(handler) = self.candidate_handler.lock().unwrap().as_ref() {
            for candidate in &self.candidates {
                self.journal.push("candidate_emitted");
                handler(candidate.clone());
            }
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if !self.local_set.load(Ordering::SeqCst) {
            bail!("remote description applied before local description");
        }
        self.journal.push("set_remote");
        self.remote_set.store(true, Ordering::SeqCst);
        let _ = description;

        self.emit_state(ConnectionState::Connecting);
        self.emit_state(ConnectionState::Connected);
        let channels: Vec<_> = self.channels.lock().unwrap().clone();
        for channel in channels {
            channel.open();
        }
        Ok(())
    }

    async fn add_audio_track(&self, track: LocalAudioTrack) -> Result<()> {
        self.journal.push("track_added");
        self.tracks.lock().unwrap().push(track.id);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        if self.fail_data_channel.load(Ordering::SeqCst) {
            bail!("data channel creation refused");
        }
        let channel = Arc::new(FakeChannel::new(label));
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel)
    }

    fn on_connection_state_change(&self, handler: StateHandler) {
        *self.state_handler.lock().unwrap() = Some(handler);
    }

    fn on_ice_candidate(&self, handler: CandidateHandler) {
        *self.candidate_handler.lock().unwrap() = Some(handler);
    }

    fn on_remote_track(&self, handler: TrackHandler) {
        *self.track_handler.lock().unwrap() = Some(handler);
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.journal.push("peer_closed");
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.emit_state(ConnectionState::Closed);
        Ok(())
    }
}

pub struct FakeChannel {
    label: String,
    open: AtomicBool,
    pub closed: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    open_handler: Mutex<Option<EventHandler>>,
    message_handler: Mutex<Option<MessageHandler>>,
    close_handler: Mutex<Option<EventHandler>>,
}

impl FakeChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            open_handler: Mutex::new(None),
            message_handler: Mutex::new(None),
            close_handler: Mutex::new(None),
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        if let Some(handler) = self.open_handler.lock().unwrap().as_ref() {
            handler();
        }
    }

    /// Simulate a message arriving from the server
    pub fn deliver(&self, text: &str) {
        if let Some(handler) = self.message_handler.lock().unwrap().as_ref() {
            handler(text.to_string());
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DataChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            bail!("data channel {} is not open", self.label);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn on_open(&self, handler: EventHandler) {
        *self.open_handler.lock().unwrap() = Some(handler);
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.message_handler.lock().unwrap() = Some(handler);
    }

    fn on_close(&self, handler: EventHandler) {
        *self.close_handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handler) = self.close_handler.lock().unwrap().as_ref() {
            handler();
        }
        Ok(())
    }
}

// ============================================================================
// Recording view
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub status: String,
    pub visible: HashSet<Element>,
    pub mic: Option<MicState>,
    pub mic_history: Vec<MicState>,
    pub transcript: Vec<TranscriptEntry>,
    pub session_name: Option<String>,
    pub remote_tracks: Vec<String>,
}

#[derive(Default)]
pub struct RecordingView {
    state: Mutex<ViewState>,
    played: Arc<Mutex<Vec<i16>>>,
}

impl RecordingView {
    /// Samples of every remote frame that reached playback
    pub fn played_samples(&self) -> Vec<i16> {
        self.played.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_visible(&self, element: Element) -> bool {
        self.state.lock().unwrap().visible.contains(&element)
    }

    pub fn status(&self) -> String {
        self.state.lock().unwrap().status.clone()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state.lock().unwrap().transcript.clone()
    }
}

impl SessionView for RecordingView {
    fn set_status(&self, status: &str) {
        self.state.lock().unwrap().status = status.to_string();
    }

    fn set_visible(&self, element: Element, visible: bool) {
        let mut state = self.state.lock().unwrap();
        if visible {
            state.visible.insert(element);
        } else {
            state.visible.remove(&element);
        }
    }

    fn set_mic(&self, mic: MicState) {
        let mut state = self.state.lock().unwrap();
        state.mic = Some(mic);
        state.mic_history.push(mic);
    }

    fn append_transcript(&self, entry: TranscriptEntry) {
        self.state.lock().unwrap().transcript.push(entry);
    }

    fn set_session_name(&self, name: &str) {
        self.state.lock().unwrap().session_name = Some(name.to_string());
    }

    fn attach_remote_audio(&self, track: &RemoteTrack, mut frames: mpsc::Receiver<AudioFrame>) {
        self.state.lock().unwrap().remote_tracks.push(track.id.clone());

        let played = Arc::clone(&self.played);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                played.lock().unwrap().extend(frame.samples);
            }
        });
    }
}

// ============================================================================
// Playback sink
// ============================================================================

/// Playback that records what it was asked to play
#[derive(Default)]
pub struct RecordingPlayback {
    pub tracks: Mutex<Vec<String>>,
    pub played: Arc<Mutex<Vec<AudioFrame>>>,
}

impl AudioPlayback for RecordingPlayback {
    fn play(&self, track_id: &str, mut frames: mpsc::Receiver<AudioFrame>) -> Result<()> {
        self.tracks.lock().unwrap().push(track_id.to_string());
        let played = Arc::clone(&self.played);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                played.lock().unwrap().push(frame);
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording playback"
    }
}

// ============================================================================
// Mock server
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    Answer,
    Reject,
    InvalidJson,
    WrongType,
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub answer: AnswerMode,
    pub reject_candidates: bool,
    /// Payloads pushed on every /outputs subscription
    pub events: Vec<Value>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            answer: AnswerMode::Answer,
            reject_candidates: false,
            events: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct ServerState {
    journal: Journal,
    options: Arc<MockOptions>,
    offers: Arc<Mutex<Vec<Value>>>,
    candidates: Arc<Mutex<Vec<Value>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

pub struct MockServer {
    pub base_url: String,
    state: ServerState,
}

impl MockServer {
    pub async fn spawn(options: MockOptions, journal: Journal) -> Self {
        let state = ServerState {
            journal,
            options: Arc::new(options),
            offers: Arc::default(),
            candidates: Arc::default(),
            subscriptions: Arc::default(),
        };

        let app = Router::new()
            .route("/webrtc/offer", post(offer))
            .route("/outputs", get(outputs))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn offers(&self) -> Vec<Value> {
        self.state.offers.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<Value> {
        self.state.candidates.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }
}

async fn offer(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    if body.get("type").and_then(Value::as_str) == Some("ice-candidate") {
        state.journal.push("candidate_posted");
        state.candidates.lock().unwrap().push(body);
        if state.options.reject_candidates {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        return StatusCode::OK.into_response();
    }

    state.journal.push("offer_posted");
    state.offers.lock().unwrap().push(body);

    match state.options.answer {
        AnswerMode::Answer => Json(json!({
            "type": "answer",
            "sdp": "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=fake-answer\r\n",
        }))
        .into_response(),
        AnswerMode::Reject => (StatusCode::INTERNAL_SERVER_ERROR, "offer rejected").into_response(),
        AnswerMode::InvalidJson => (StatusCode::OK, "<html>not json</html>").into_response(),
        AnswerMode::WrongType => Json(json!({ "type": "offer", "sdp": "v=0\r\n" })).into_response(),
    }
}

async fn outputs(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.journal.push("outputs_subscribed");
    state
        .subscriptions
        .lock()
        .unwrap()
        .push(params.get("webrtc_id").cloned().unwrap_or_default());

    let events: Vec<Result<Event, Infallible>> = state
        .options
        .events
        .iter()
        .map(|payload| Ok(Event::default().data(payload.to_string())))
        .collect();

    Sse::new(stream::iter(events).chain(stream::pending()))
}

// ============================================================================
// Audio fixtures
// ============================================================================

/// Write a 16-bit mono sine WAV file and return its path
pub fn write_wav(dir: &Path, name: &str, sample_rate: u32, duration_ms: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let total = sample_rate * duration_ms / 1000;
    for i in 0..total {
        let t = i as f32 / sample_rate as f32;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0;
        writer.write_sample(sample as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}
