//! Server push-event stream
//!
//! The server publishes transcript and speech markers for a session as
//! server-sent events on `GET /outputs?webrtc_id=<session id>`.

pub mod sse;
pub mod stream;

pub use sse::SseDecoder;
pub use stream::{
    decode_events, dispatch_stream_event, EventStreamHandle, EventStreamListener, SpeechState,
    StreamEvent, OUTPUTS_PATH,
};
