//! PaperWatch Common Library
//!
//! Shared code for the aggregation pipeline and its stores:
//! - Domain models and canonical item identity
//! - Error types and handling
//! - Configuration management
//! - Retry with exponential backoff
//! - Run persistence (PostgreSQL and in-memory)
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use identity::{CanonicalKey, KeyResolver, SeenKeySet};
pub use models::{Item, Score, ScoreReason, ScoredItem, SourceResult, Tier};
pub use store::{MemoryStore, RunStore, RunSummary, ScoreRecord};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
