// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod fetch;
pub mod gate;
pub mod generate;
pub mod image;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod store;
pub mod trends;

// ---- Re-exports for stable public API ----
// Convenient access to the router and the app state it serves from.
pub use crate::api::{create_router, AppState};
pub use crate::config::{Credentials, EngineConfig};
pub use crate::pipeline::{ContentPipeline, RunSummary, TopicOutcome};
pub use crate::store::{DocumentStore, MemoryStore};
