use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::{SessionConfig, CLOSE_GRACE};
use crate::control::{self, ControlMessage};
use crate::error::SessionError;
use crate::events::{EventStreamHandle, EventStreamListener};
use crate::media::{LocalMedia, MediaAcquisition};
use crate::rtc::{Connection, ConnectionState, PeerConnectionManager, RtcBackend};
use crate::signaling::{SessionId, SignalingClient};
use crate::view::{Element, MicState, SessionView};

/// Lifecycle phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Everything scoped to one negotiated session
struct ActiveSession {
    session_id: SessionId,
    connection: Connection,
    media: LocalMedia,
    events: EventStreamHandle,
}

impl ActiveSession {
    async fn release(self) {
        self.events.close();
        self.connection.close().await;
        self.media.stop().await;
    }
}

/// Orchestrates start/stop of a conversation session
///
/// The controller is the only owner of the connection, control channel, media
/// and event stream handles. At most one session exists at a time.
pub struct SessionController {
    config: SessionConfig,
    media: MediaAcquisition,
    connections: PeerConnectionManager,
    signaling: SignalingClient,
    events: EventStreamListener,
    view: Arc<dyn SessionView>,
    state: LifecycleState,
    session: Option<ActiveSession>,
    closing: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        rtc: Arc<dyn RtcBackend>,
        view: Arc<dyn SessionView>,
    ) -> Self {
        let http = reqwest::Client::new();

        let controller = Self {
            media: MediaAcquisition::new(config.audio_source.clone(), config.audio.clone()),
            connections: PeerConnectionManager::new(rtc, Arc::clone(&view)),
            signaling: SignalingClient::new(http.clone(), config.server_url.clone()),
            events: EventStreamListener::new(http, config.server_url.clone(), Arc::clone(&view)),
            config,
            view,
            state: LifecycleState::Idle,
            session: None,
            closing: None,
        };
        controller.view.set_status(controller.status_text());
        controller
    }

    pub fn state(&self) -> LifecycleState {
        match self.state {
            LifecycleState::Stopping if !self.is_closing() => LifecycleState::Idle,
            state => state,
        }
    }

    pub fn has_connection(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|session| &session.session_id)
    }

    pub fn control_channel_open(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.connection.control.is_open())
    }

    /// Live connection state, or `closed` when there is no connection
    pub fn status_text(&self) -> &'static str {
        self.session
            .as_ref()
            .map(|session| session.connection.state())
            .unwrap_or(ConnectionState::Closed)
            .as_str()
    }

    /// Start a session, releasing any current one first.
    ///
    /// On failure everything acquired so far is released and the controller is
    /// back in `Idle`.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.session.is_some() {
            info!("Session already active, stopping it before restart");
            self.stop();
        }
        self.settle().await;

        self.transition(LifecycleState::Starting);
        self.view.set_mic(MicState::Waiting);

        match self.establish().await {
            Ok(session) => {
                info!("Session {} started", session.session_id);
                self.session = Some(session);
                self.transition(LifecycleState::Active);
                for element in Element::SESSION {
                    self.view.show(element);
                }
                self.view.set_mic(MicState::On);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                self.transition(LifecycleState::Idle);
                for element in Element::SESSION_CONTROLS {
                    self.view.hide(element);
                }
                self.view.set_mic(MicState::Off);
                self.view.set_status(self.status_text());
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<ActiveSession, SessionError> {
        let mut media = self.media.acquire_audio().await?;

        let connection = match self.connections.create_connection(&self.config.rtc).await {
            Ok(connection) => connection,
            Err(e) => {
                media.stop().await;
                return Err(e);
            }
        };

        for track in media.take_audio_tracks() {
            if let Err(e) = connection.peer.add_audio_track(track).await {
                rollback(connection, media).await;
                return Err(SessionError::Connection(e));
            }
        }

        match self
            .signaling
            .negotiate(connection.peer.as_ref(), &self.events)
            .await
        {
            Ok(negotiated) => Ok(ActiveSession {
                session_id: negotiated.session_id,
                connection,
                media,
                events: negotiated.events,
            }),
            Err(e) => {
                rollback(connection, media).await;
                Err(e)
            }
        }
    }

    /// Hide the session UI and close the connection after the grace delay.
    ///
    /// Handles are detached immediately; a second call only repeats the UI reset.
    pub fn stop(&mut self) {
        self.view.set_mic(MicState::Waiting);
        for element in Element::SESSION_CONTROLS {
            self.view.hide(element);
        }

        if let Some(session) = self.session.take() {
            info!("Stopping session {}", session.session_id);
            self.transition(LifecycleState::Stopping);

            let view = Arc::clone(&self.view);
            self.closing = Some(tokio::spawn(async move {
                tokio::time::sleep(CLOSE_GRACE).await;
                let session_id = session.session_id.clone();
                session.release().await;
                view.set_status(ConnectionState::Closed.as_str());
                info!("Session {} closed", session_id);
            }));
        }

        self.view.set_mic(MicState::Off);
    }

    /// Stop when connected, start otherwise
    pub async fn toggle(&mut self) -> Result<(), SessionError> {
        let connected = self
            .session
            .as_ref()
            .is_some_and(|session| session.connection.state() == ConnectionState::Connected);

        if connected {
            self.stop();
            Ok(())
        } else {
            self.start().await
        }
    }

    /// Wait for a pending close from `stop` to finish
    pub async fn settle(&mut self) {
        if let Some(handle) = self.closing.take() {
            if let Err(e) = handle.await {
                error!("Session close task failed: {}", e);
            }
        }
        if self.state == LifecycleState::Stopping {
            self.transition(LifecycleState::Idle);
        }
    }

    pub async fn select_preset(&self, preset_id: &str) -> Result<(), SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotActive)?;
        info!("Selecting preset {}", preset_id);

        control::send(
            session.connection.control.as_ref(),
            &ControlMessage::Preset(preset_id.to_string()),
        )
        .await
        .map_err(SessionError::Connection)
    }

    /// Send a model selection; the session name updates without waiting for the server
    pub async fn select_model(&self, model_id: &str) -> Result<(), SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotActive)?;
        info!("Selecting model {}", model_id);

        self.view.set_session_name(model_id);
        control::send(
            session.connection.control.as_ref(),
            &ControlMessage::Model(model_id.to_string()),
        )
        .await
        .map_err(SessionError::Connection)
    }

    fn is_closing(&self) -> bool {
        self.closing
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            info!("Session state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Release a connection and media from a failed start
async fn rollback(connection: Connection, media: LocalMedia) {
    warn!("Rolling back partially started session");
    connection.close().await;
    media.stop().await;
}
