//! Exclusion, exemption and recency filtering
//!
//! An item that mentions an exclusion term is dropped unless it earns enough
//! exemption points from high-value terms and still matches a topic keyword.
//! Recency is judged against the run's reference date, never the wall clock.

use chrono::{DateTime, NaiveDate};
use paperwatch_common::config::PipelineConfig;
use paperwatch_common::errors::{AppError, Result};
use paperwatch_common::metrics::record_dropped;
use paperwatch_common::models::{Item, SourceResult};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const TITLE_POINTS: f64 = 10.0;
const ABSTRACT_POINTS: f64 = 3.0;
const VERB_POINTS: f64 = 5.0;
const POSITION_POINTS: f64 = 2.0;

/// Per-source filter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub kept: usize,
    /// Hit an exclusion term and was not exempted
    pub excluded: usize,
    /// Hit an exclusion term but was kept
    pub exempted: usize,
    /// Outside the recency window
    pub stale: usize,
}

impl FilterStats {
    pub fn merge(&mut self, other: &FilterStats) {
        self.kept += other.kept;
        self.excluded += other.excluded;
        self.exempted += other.exempted;
        self.stale += other.stale;
    }
}

struct HighValueTerm {
    term: String,
    /// Matches a core verb anywhere before or after the term
    verb_near: Option<Regex>,
}

pub struct ItemFilter {
    exclusion: Vec<String>,
    topic_keywords: Vec<String>,
    high_value: Vec<HighValueTerm>,
    exemption_threshold: f64,
    weighted_exemption: bool,
    window_days: i64,
    min_age_days: i64,
    trusted_origins: Vec<String>,
    trusted_date_tolerance: bool,
    today: NaiveDate,
}

impl ItemFilter {
    pub fn new(config: &PipelineConfig, today: NaiveDate) -> Result<Self> {
        let verbs: Vec<String> = config
            .vocabulary
            .core_verbs
            .iter()
            .map(|v| regex_lite::escape(&v.to_lowercase()))
            .collect();
        let verb_group = verbs.join("|");

        let mut high_value = Vec::with_capacity(config.vocabulary.high_value.len());
        for term in &config.vocabulary.high_value {
            let term = term.to_lowercase();
            let verb_near = if verbs.is_empty() {
                None
            } else {
                let escaped = regex_lite::escape(&term);
                let pattern = format!("(?s)(?:{verb_group}).*{escaped}|{escaped}.*(?:{verb_group})");
                let re = Regex::new(&pattern).map_err(|e| {
                    AppError::config(format!("invalid core verb pattern for '{}': {}", term, e))
                })?;
                Some(re)
            };
            high_value.push(HighValueTerm { term, verb_near });
        }

        Ok(Self {
            exclusion: lowercase_all(&config.vocabulary.exclusion),
            topic_keywords: lowercase_all(config.all_topic_keywords()),
            high_value,
            exemption_threshold: config.filter.exemption_threshold,
            weighted_exemption: config.filter.weighted_exemption,
            window_days: config.filter.window_days,
            min_age_days: config.filter.min_age_days,
            trusted_origins: lowercase_all(&config.filter.trusted_origins),
            trusted_date_tolerance: config.filter.trusted_date_tolerance,
            today,
        })
    }

    /// True when the item hits an exclusion term and is not exempted
    pub fn should_exclude(&self, item: &Item, exclusion_terms: &[String]) -> bool {
        let text = item.search_text();
        let hit = exclusion_terms
            .iter()
            .find(|term| text.contains(term.to_lowercase().as_str()));
        let Some(hit) = hit else {
            return false;
        };

        if self.is_exempt(item, &text) {
            info!(
                title = %item.short_title(),
                exclusion = %hit,
                "Exclusion term hit but item exempted"
            );
            return false;
        }

        debug!(title = %item.short_title(), exclusion = %hit, "Item excluded");
        true
    }

    fn is_exempt(&self, item: &Item, text: &str) -> bool {
        if !self.weighted_exemption {
            return self.high_value.iter().any(|hv| text.contains(&hv.term));
        }

        let score = self.exemption_score(item);
        let on_topic = self.topic_keywords.iter().any(|kw| text.contains(kw.as_str()));
        debug!(
            score,
            threshold = self.exemption_threshold,
            on_topic,
            "Exemption evaluated"
        );
        score >= self.exemption_threshold && on_topic
    }

    /// Weighted evidence that an excluded item is still worth keeping.
    ///
    /// Per high-value term: 10 if in the title; in the abstract 3, plus 5 when
    /// a core verb appears before or after it, plus 2 when its first
    /// occurrence falls in the first half of the abstract.
    pub fn exemption_score(&self, item: &Item) -> f64 {
        let title = item.title.to_lowercase();
        let abstract_text = item.abstract_text.to_lowercase();
        let half = abstract_text.len() as f64 / 2.0;
        let mut score = 0.0;

        for hv in &self.high_value {
            if title.contains(&hv.term) {
                score += TITLE_POINTS;
            }

            let Some(pos) = abstract_text.find(&hv.term) else {
                continue;
            };
            score += ABSTRACT_POINTS;
            if hv.verb_near.as_ref().is_some_and(|re| re.is_match(&abstract_text)) {
                score += VERB_POINTS;
            }
            if (pos as f64) < half {
                score += POSITION_POINTS;
            }
        }

        score
    }

    /// Whether `origin` carries one of the trusted markers
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        let origin = origin.to_lowercase();
        self.trusted_origins.iter().any(|m| origin.contains(m.as_str()))
    }

    /// Whether a raw feed date falls within `min_age_days..=window_days` of today.
    /// Missing or unparseable dates pass only for trusted origins with tolerance on.
    pub fn is_recent(&self, date: Option<&str>, window_days: i64, trusted_origin: bool) -> bool {
        let parsed = date.and_then(parse_date);
        let Some(parsed) = parsed else {
            if trusted_origin && self.trusted_date_tolerance {
                warn!(date = date.unwrap_or(""), "Trusted origin date unusable, keeping item");
                return true;
            }
            return false;
        };

        let elapsed = (self.today - parsed).num_days();
        self.min_age_days <= elapsed && elapsed <= window_days
    }

    /// Filter the items of one source result. Failed results pass through untouched.
    pub fn apply(&self, mut result: SourceResult) -> (SourceResult, FilterStats) {
        let mut stats = FilterStats::default();
        if !result.is_success() {
            return (result, stats);
        }

        let trusted = self.is_trusted_origin(&result.origin);
        let items = std::mem::take(&mut result.items);
        let mut kept = Vec::with_capacity(items.len());

        for item in items {
            let text = item.search_text();
            let hits_exclusion = self.exclusion.iter().any(|t| text.contains(t.as_str()));
            if hits_exclusion {
                if self.should_exclude(&item, &self.exclusion) {
                    stats.excluded += 1;
                    continue;
                }
                stats.exempted += 1;
            }

            if !self.is_recent(item.date.as_deref(), self.window_days, trusted) {
                stats.stale += 1;
                continue;
            }

            kept.push(item);
        }

        stats.kept = kept.len();
        result.items = kept;

        record_dropped("excluded", stats.excluded);
        record_dropped("stale", stats.stale);
        debug!(
            origin = %result.origin,
            kept = stats.kept,
            excluded = stats.excluded,
            exempted = stats.exempted,
            stale = stats.stale,
            "Source filtered"
        );

        (result, stats)
    }
}

/// Parse a feed date. Accepts RFC 3339, `YYYY-MM-DD` with optional trailing
/// time, RFC 2822 with `GMT`/`UTC`/offset, and `YYYY/MM/DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let looks_rfc2822 = raw.contains("GMT") || raw.contains("UTC") || (raw.contains(',') && raw.len() > 10);
    if looks_rfc2822 {
        let normalized = raw.replace(" UTC", " GMT");
        if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
            return Some(dt.date_naive());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    let head = raw.get(..10).unwrap_or(raw);
    if head.contains('-') {
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    } else if head.contains('/') {
        NaiveDate::parse_from_str(head, "%Y/%m/%d").ok()
    } else {
        None
    }
}

fn lowercase_all<'a>(terms: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    terms.into_iter().map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn filter() -> ItemFilter {
        ItemFilter::new(&PipelineConfig::default(), today()).unwrap()
    }

    fn filter_with(edit: impl FnOnce(&mut PipelineConfig)) -> ItemFilter {
        let mut config = PipelineConfig::default();
        edit(&mut config);
        ItemFilter::new(&config, today()).unwrap()
    }

    #[test]
    fn test_item_without_exclusion_terms_is_kept() {
        let f = filter();
        let item = Item::new("Nitrogenase cofactor assembly", "PubMed");
        assert!(!f.should_exclude(&item, &PipelineConfig::default().vocabulary.exclusion));
    }

    #[test]
    fn test_exclusion_without_exemption_drops_item() {
        let f = filter();
        let item = Item::new("Tumor microenvironment in mouse models", "PubMed")
            .with_abstract("We profile immune cells in mice.");
        let terms = PipelineConfig::default().vocabulary.exclusion;
        assert!(f.should_exclude(&item, &terms));
    }

    #[test]
    fn test_structural_title_exempts_on_topic_item() {
        let f = filter();
        // "human" is an exclusion term; cryo-em in the title earns 10 points
        let item = Item::new("Cryo-EM structure of a human receptor kinase", "PubMed");
        let terms = PipelineConfig::default().vocabulary.exclusion;
        assert!(f.exemption_score(&item) >= 10.0);
        assert!(!f.should_exclude(&item, &terms));
    }

    #[test]
    fn test_exemption_requires_topic_keyword() {
        let f = filter_with(|c| {
            c.vocabulary.topics.values_mut().for_each(|v| v.retain(|t| t != "cryo-em"));
        });
        let item = Item::new("Cryo-EM of a human ion channel", "PubMed");
        let terms = PipelineConfig::default().vocabulary.exclusion;
        assert!(f.should_exclude(&item, &terms));
    }

    #[test]
    fn test_exemption_score_components() {
        let f = filter_with(|c| {
            c.vocabulary.high_value = vec!["resistosome".into()];
            c.vocabulary.core_verbs = vec!["revealed".into()];
        });

        // abstract 3 + verb 5 + first half 2
        let early = Item::new("Plant immunity", "x")
            .with_abstract("The resistosome was revealed by imaging of purified complexes today.");
        assert_eq!(f.exemption_score(&early), 10.0);

        // abstract 3 only: late position, no verb
        let late = Item::new("Plant immunity", "x")
            .with_abstract("Long introduction about pathogen recognition and then the resistosome");
        assert_eq!(f.exemption_score(&late), 3.0);

        // title 10 + abstract 3 + verb (term before verb) 5
        let both = Item::new("Resistosome assembly", "x")
            .with_abstract("Earlier work on assembly of NLR complexes, the resistosome, revealed");
        assert_eq!(f.exemption_score(&both), 18.0);
    }

    #[test]
    fn test_legacy_boolean_exemption() {
        let f = filter_with(|c| c.filter.weighted_exemption = false);
        let item = Item::new("Ion channel in patient cells", "PubMed")
            .with_abstract("An inflammasome was observed.");
        let terms = PipelineConfig::default().vocabulary.exclusion;
        assert!(!f.should_exclude(&item, &terms));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(parse_date("2024-05-01"), Some(expected));
        assert_eq!(parse_date("2024-05-01T08:30:00Z"), Some(expected));
        assert_eq!(parse_date("2024-05-01 08:30"), Some(expected));
        assert_eq!(parse_date("2024/05/01"), Some(expected));
        assert_eq!(parse_date("Wed, 01 May 2024 08:30:00 GMT"), Some(expected));
        assert_eq!(parse_date("Wed, 01 May 2024 08:30:00 UTC"), Some(expected));
        assert_eq!(parse_date("Wed, 01 May 2024 08:30:00 +0200"), Some(expected));
        assert_eq!(parse_date("sometime in May"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_default_window_is_yesterday_only() {
        let f = filter();
        assert!(f.is_recent(Some("2024-05-01"), 1, false));
        assert!(!f.is_recent(Some("2024-05-02"), 1, false));
        assert!(!f.is_recent(Some("2024-04-30"), 1, false));
        assert!(f.is_recent(Some("2024-04-30"), 2, false));
    }

    #[test]
    fn test_trusted_origin_date_tolerance() {
        let f = filter();
        assert!(f.is_trusted_origin("RSS_TopJournal/Nature"));
        assert!(!f.is_trusted_origin("PubMed"));

        assert!(f.is_recent(None, 1, true));
        assert!(f.is_recent(Some("unknown"), 1, true));
        assert!(!f.is_recent(None, 1, false));

        let strict = filter_with(|c| c.filter.trusted_date_tolerance = false);
        assert!(!strict.is_recent(None, 1, true));
    }

    #[test]
    fn test_apply_counts_each_outcome() {
        let f = filter();
        let result = SourceResult::ok(
            "PubMed",
            vec![
                Item::new("Nitrogenase cofactor biosynthesis", "PubMed").with_date("2024-05-01"),
                Item::new("Cancer drug screen", "PubMed").with_date("2024-05-01"),
                Item::new("Cryo-EM structure of human receptor kinase", "PubMed").with_date("2024-05-01"),
                Item::new("Nodulation signalling", "PubMed").with_date("2024-04-20"),
            ],
        );

        let (filtered, stats) = f.apply(result);
        assert_eq!(filtered.items.len(), 2);
        assert_eq!(
            stats,
            FilterStats {
                kept: 2,
                excluded: 1,
                exempted: 1,
                stale: 1,
            }
        );
    }

    #[test]
    fn test_apply_passes_failed_result_through() {
        let f = filter();
        let (result, stats) = f.apply(SourceResult::failed("arXiv", "timeout"));
        assert_eq!(result.error.as_deref(), Some("timeout"));
        assert_eq!(stats, FilterStats::default());
    }
}
