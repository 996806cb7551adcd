//! LLM provider abstractions
//!
//! The `Provider` trait is the seam between the chat engine and the hosted
//! model API. `GenaiProvider` is the production implementation; `MockProvider`
//! drives deterministic streams in tests.

mod error;
mod genai_adapter;
mod genai_provider;
mod mock;
mod traits;

pub use error::{ProviderError, ProviderResult};
pub use genai_provider::GenaiProvider;
pub use mock::MockProvider;
pub use traits::{ChatOptions, Provider, StreamResponse};
