//! Client library for the P&ID symbol detection server.
//!
//! [`api::ApiClient`] speaks the server's two endpoints; [`session`]
//! wraps it in the idle → loading → success | error state machine the
//! upload flow follows.

pub mod api;
pub mod session;

pub use api::{ApiClient, ClientConfig, ClientError, DetectionSettings, ProcessedImage};
pub use session::{DetectionSession, SessionError, SessionState};
