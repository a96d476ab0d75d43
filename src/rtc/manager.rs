use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::peer::{
    ConnectionState, DataChannel, IceServer, PeerConnection, RemoteAudio, RtcBackend,
};
use crate::control;
use crate::error::SessionError;
use crate::view::SessionView;

/// Logical name of the control channel
pub const CONTROL_CHANNEL_LABEL: &str = "chat";

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Peer connection options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Add the public STUN servers to the ICE server list
    pub use_stun: bool,
    pub stun_urls: Vec<String>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            use_stun: false,
            stun_urls: vec![DEFAULT_STUN_URL.to_string()],
        }
    }
}

impl RtcConfig {
    pub fn ice_servers(&self) -> Vec<IceServer> {
        if self.use_stun && !self.stun_urls.is_empty() {
            vec![IceServer {
                urls: self.stun_urls.clone(),
            }]
        } else {
            Vec::new()
        }
    }
}

/// A live peer connection together with its control channel
pub struct Connection {
    pub peer: Arc<dyn PeerConnection>,
    pub control: Arc<dyn DataChannel>,
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        self.peer.connection_state()
    }

    /// Close the control channel and then the peer connection
    pub async fn close(&self) {
        if let Err(e) = self.control.close().await {
            warn!("Failed to close control channel: {:#}", e);
        }
        if let Err(e) = self.peer.close().await {
            warn!("Failed to close peer connection: {:#}", e);
        }
    }
}

/// Creates peer connections wired to the view and the control protocol
pub struct PeerConnectionManager {
    backend: Arc<dyn RtcBackend>,
    view: Arc<dyn SessionView>,
}

impl PeerConnectionManager {
    pub fn new(backend: Arc<dyn RtcBackend>, view: Arc<dyn SessionView>) -> Self {
        Self { backend, view }
    }

    /// Create a peer connection and its control channel.
    ///
    /// Terminal states are reported to the view; nothing reconnects automatically.
    pub async fn create_connection(&self, config: &RtcConfig) -> Result<Connection, SessionError> {
        let ice_servers = config.ice_servers();
        info!("Creating peer connection ({} ICE servers)", ice_servers.len());

        let peer = self
            .backend
            .new_peer_connection(ice_servers)
            .await
            .map_err(SessionError::Connection)?;

        let view = Arc::clone(&self.view);
        peer.on_connection_state_change(Box::new(move |state| {
            if state.is_degraded() {
                warn!("{}", SessionError::ConnectionState(state));
            } else {
                info!("Peer connection state: {}", state);
            }
            view.set_status(state.as_str());
        }));

        let view = Arc::clone(&self.view);
        peer.on_remote_track(Box::new(move |audio: RemoteAudio| {
            info!("Received remote stream");
            view.attach_remote_audio(&audio.track, audio.frames);
        }));

        let control = match peer.create_data_channel(CONTROL_CHANNEL_LABEL).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = peer.close().await {
                    warn!("Failed to close peer connection: {:#}", close_err);
                }
                return Err(SessionError::Connection(e));
            }
        };
        control::bind(&control, Arc::clone(&self.view));

        Ok(Connection { peer, control })
    }
}
