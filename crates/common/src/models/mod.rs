//! Domain models shared by adapters, the pipeline, and storage
//!
//! Items are produced once by an adapter and never mutated afterwards; every
//! later stage wraps them (ScoredItem) instead of editing them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A candidate document from one feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    /// Publication date exactly as the feed reported it
    #[serde(default)]
    pub date: Option<String>,

    /// Label of the source that produced the item
    #[serde(default)]
    pub origin: String,

    #[serde(default)]
    pub doi: String,

    #[serde(default)]
    pub link: String,

    #[serde(default)]
    pub citation_count: u32,

    #[serde(default)]
    pub influential_citation_count: u32,
}

impl Item {
    pub fn new(title: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abstract_text: String::new(),
            date: None,
            origin: origin.into(),
            doi: String::new(),
            link: String::new(),
            citation_count: 0,
            influential_citation_count: 0,
        }
    }

    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = doi.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_citations(mut self, citations: u32, influential: u32) -> Self {
        self.citation_count = citations;
        self.influential_citation_count = influential;
        self
    }

    /// Lowercased title and abstract joined by a space
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text).to_lowercase()
    }

    /// Shortened title for log lines
    pub fn short_title(&self) -> String {
        self.title.chars().take(50).collect()
    }
}

/// Outcome of one adapter for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub origin: String,

    #[serde(default)]
    pub items: Vec<Item>,

    /// Set when the adapter failed outright; its items are not merged
    #[serde(default)]
    pub error: Option<String>,

    /// Some, but not all, of the adapter's sub-queries failed
    #[serde(default)]
    pub degraded: bool,

    #[serde(default)]
    pub degraded_reason: Option<String>,

    /// Wall-clock time of the fetch
    #[serde(default, with = "latency_ms")]
    pub latency: Option<Duration>,
}

impl SourceResult {
    pub fn ok(origin: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            origin: origin.into(),
            items,
            error: None,
            degraded: false,
            degraded_reason: None,
            latency: None,
        }
    }

    pub fn failed(origin: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            items: Vec::new(),
            error: Some(error.into()),
            degraded: false,
            degraded_reason: None,
            latency: None,
        }
    }

    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = true;
        self.degraded_reason = Some(reason.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

mod latency_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// One contribution to a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReason {
    /// Machine-readable factor, e.g. `synergy_bonus`
    pub category: String,
    pub points: f64,
    pub description: String,
}

/// Additive, explainable score. The total is always the sum of the reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    total: f64,
    reasons: Vec<ScoreReason>,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor. Zero-point factors are not recorded.
    pub fn add(&mut self, category: &str, points: f64, description: impl Into<String>) {
        if points == 0.0 {
            return;
        }
        self.reasons.push(ScoreReason {
            category: category.to_string(),
            points,
            description: description.into(),
        });
        self.total = self.reasons.iter().map(|r| r.points).sum();
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn reasons(&self) -> &[ScoreReason] {
        &self.reasons
    }

    pub fn has(&self, category: &str) -> bool {
        self.reasons.iter().any(|r| r.category == category)
    }
}

/// Priority bucket derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    P0,
    P1,
    P2,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::P0 => "P0",
            Tier::P1 => "P1",
            Tier::P2 => "P2",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item paired with its canonical key, score and tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: Item,
    pub key: String,
    pub score: Score,
    pub tier: Tier,
}
