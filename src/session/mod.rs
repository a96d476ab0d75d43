//! Session lifecycle
//!
//! This module provides the `SessionController` that manages:
//! - Audio acquisition and attachment to the peer connection
//! - Connection and control channel creation
//! - Offer/answer negotiation and the push-event subscription
//! - Teardown on stop or failed start

mod config;
mod controller;

pub use config::{SessionConfig, CLOSE_GRACE};
pub use controller::{LifecycleState, SessionController};
