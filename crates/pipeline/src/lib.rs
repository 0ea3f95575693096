//! PaperWatch aggregation pipeline
//!
//! Fans out to every registered feed, filters each feed's items, then merges,
//! deduplicates, scores and selects a bounded, tier-aware subset:
//!
//! ```text
//! FetchOrchestrator -> ItemFilter (per source) -> Ranker (ScoringEngine) -> RunStore
//! ```

pub mod filter;
pub mod orchestrator;
pub mod ranking;
pub mod run;
pub mod scoring;
pub mod sources;

pub use filter::{FilterStats, ItemFilter};
pub use orchestrator::FetchOrchestrator;
pub use ranking::{RankStats, Ranker, Selection};
pub use run::{Pipeline, RunReport, RunStatus, SourceReport};
pub use scoring::ScoringEngine;
pub use sources::{FetchContext, RecordedSource, SourceAdapter};
