pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod media;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod view;

pub use audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource};
pub use config::Config;
pub use control::{ControlEvent, ControlMessage, LogMarker};
pub use error::{SessionError, SignalingError};
pub use events::{EventStreamListener, StreamEvent};
pub use media::{LocalMedia, MediaAcquisition};
pub use rtc::{ConnectionState, PeerConnectionManager, RtcConfig, WebRtcBackend};
pub use session::{LifecycleState, SessionConfig, SessionController};
pub use signaling::{SessionId, SignalingClient};
pub use view::{ConsoleView, Element, MicState, SessionView, TranscriptDirection, TranscriptEntry};
