//! HTTP gateway for the Surf crypto research assistant
//!
//! One chat endpoint streaming engine events over SSE, a health probe, and
//! env-based configuration. All chat semantics live in `surf-core`; this
//! crate only maps HTTP to the engine and engine errors to statuses.

pub mod config;
pub mod error;
pub mod routes;

pub use config::Config;
pub use error::ApiError;
pub use routes::{app, AppState};
