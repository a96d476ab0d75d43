// webrtc-rs implementation of the transport seam

use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_PCMU};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::peer::{
    CandidateHandler, ConnectionState, DataChannel, EventHandler, IceCandidate, IceServer,
    MessageHandler, PeerConnection, RemoteAudio, RemoteTrack, RtcBackend, SdpType, SessionDescription,
    StateHandler, TrackHandler,
};
use crate::audio::{decode_pcmu, PcmuPacketizer, PCMU_PAYLOAD_TYPE, PCMU_SAMPLE_RATE};
use crate::media::LocalAudioTrack;

/// Duration of each outgoing PCMU packet
const PACKET_MS: u64 = 20;

/// Decoded remote frames buffered for playback
const REMOTE_AUDIO_QUEUE: usize = 128;

/// Builds webrtc-rs peer connections with the default codecs and interceptors
pub struct WebRtcBackend {
    api: API,
}

impl WebRtcBackend {
    pub fn new() -> Result<Self> {
        // PCMU only, so both directions negotiate the codec the audio path speaks
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: pcmu_capability(),
                    payload_type: PCMU_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .context("Failed to register PCMU codec")?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .context("Failed to register interceptors")?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait::async_trait]
impl RtcBackend for WebRtcBackend {
    async fn new_peer_connection(&self, ice_servers: Vec<IceServer>) -> Result<Arc<dyn PeerConnection>> {
        let config = RTCConfiguration {
            ice_servers: ice_servers
                .into_iter()
                .map(|server| RTCIceServer {
                    urls: server.urls,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = self
            .api
            .new_peer_connection(config)
            .await
            .context("Failed to create peer connection")?;

        Ok(Arc::new(WebRtcPeer {
            pc: Arc::new(pc),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

/// A webrtc-rs peer connection plus the media pump tasks it owns
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebRtcPeer {
    fn track_task(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }
}

fn pcmu_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_PCMU.to_owned(),
        clock_rate: PCMU_SAMPLE_RATE,
        channels: 1,
        ..Default::default()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => bail!("Rollback descriptions are not supported"),
    };
    Ok(rtc)
}

fn from_rtc_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

#[async_trait::async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .context("Failed to create offer")?;

        Ok(SessionDescription {
            kind: SdpType::Offer,
            sdp: offer.sdp,
        })
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .context("Failed to set local description")
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .context("Failed to set remote description")
    }

    async fn add_audio_track(&self, local: LocalAudioTrack) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            pcmu_capability(),
            local.id.clone(),
            "voice-rtc-client".to_owned(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .context("Failed to add audio track")?;

        // RTCP must be read for interceptors to run
        self.track_task(tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        }));

        let track_id = local.id;
        let mut frames = local.frames;
        self.track_task(tokio::spawn(async move {
            let mut packetizer = PcmuPacketizer::new(PACKET_MS);
            while let Some(frame) = frames.recv().await {
                for payload in packetizer.push(frame) {
                    let sample = Sample {
                        data: payload,
                        duration: Duration::from_millis(PACKET_MS),
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        warn!("Failed to write audio sample on {}: {}", track_id, e);
                        return;
                    }
                }
            }
            debug!("Audio source for {} ended", track_id);
        }));

        info!("Attached local audio track");
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .with_context(|| format!("Failed to create data channel {label}"))?;

        Ok(Arc::new(WebRtcDataChannel { dc }))
    }

    fn on_connection_state_change(&self, handler: StateHandler) {
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                handler(from_rtc_state(state));
                Box::pin(async {})
            }));
    }

    fn on_ice_candidate(&self, handler: CandidateHandler) {
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                // None marks the end of gathering
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => handler(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                        Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                    }
                }
                Box::pin(async {})
            }));
    }

    fn on_remote_track(&self, handler: TrackHandler) {
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let (tx, frames) = mpsc::channel(REMOTE_AUDIO_QUEUE);
                handler(RemoteAudio {
                    track: RemoteTrack {
                        id: track.id(),
                        kind: track.kind().to_string(),
                    },
                    frames,
                });

                // Packets are read until the track ends, whether or not anyone listens
                tokio::spawn(async move {
                    let mut played_ms = 0;
                    while let Ok((packet, _)) = track.read_rtp().await {
                        if packet.header.payload_type != PCMU_PAYLOAD_TYPE {
                            debug!("Skipping packet with payload type {}", packet.header.payload_type);
                            continue;
                        }
                        let frame = decode_pcmu(&packet.payload, played_ms);
                        played_ms += frame.duration_ms();
                        if let Err(TrySendError::Full(_)) = tx.try_send(frame) {
                            warn!("Remote audio consumer is behind, dropping a frame");
                        }
                    }
                    debug!("Remote track ended");
                });
                Box::pin(async {})
            },
        ));
    }

    fn connection_state(&self) -> ConnectionState {
        from_rtc_state(self.pc.connection_state())
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.pc
            .close()
            .await
            .context("Failed to close peer connection")
    }
}

pub struct WebRtcDataChannel {
    dc: Arc<RTCDataChannel>,
}

#[async_trait::async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.dc
            .send_text(text.to_owned())
            .await
            .with_context(|| format!("Failed to send on data channel {}", self.dc.label()))?;
        Ok(())
    }

    fn on_open(&self, handler: EventHandler) {
        self.dc.on_open(Box::new(move || {
            handler();
            Box::pin(async {})
        }));
    }

    fn on_message(&self, handler: MessageHandler) {
        self.dc.on_message(Box::new(move |msg: DataChannelMessage| {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => handler(text),
                Err(_) => debug!("Ignoring binary data channel message ({} bytes)", msg.data.len()),
            }
            Box::pin(async {})
        }));
    }

    fn on_close(&self, handler: EventHandler) {
        self.dc.on_close(Box::new(move || {
            handler();
            Box::pin(async {})
        }));
    }

    async fn close(&self) -> Result<()> {
        self.dc
            .close()
            .await
            .context("Failed to close data channel")
    }
}
