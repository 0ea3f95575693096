//! Explainable additive scoring
//!
//! Every factor that contributes points is recorded as a `ScoreReason`, and the
//! total is the sum of those reasons. Scores depend only on the item, the
//! configuration and the reference date.

use crate::filter::parse_date;
use chrono::NaiveDate;
use paperwatch_common::config::{FreshnessWeights, ScoringConfig, ScoringWeights, VenueWeight};
use paperwatch_common::models::{Item, Score};

/// Text marker for the preprint bonus
const STRUCTURE_MARKER: &str = "structure";

pub struct ScoringEngine {
    structural: Vec<String>,
    /// Field lists flattened in table order; a term in two lists counts twice
    field: Vec<String>,
    breakthrough: Vec<String>,
    relevant_context: Vec<String>,
    non_relevant_context: Vec<String>,
    trusted_feed_markers: Vec<String>,
    precision_search_markers: Vec<String>,
    preprint_markers: Vec<String>,
    venues: Vec<VenueWeight>,
    weights: ScoringWeights,
    today: NaiveDate,
}

impl ScoringEngine {
    pub fn new(config: &ScoringConfig, today: NaiveDate) -> Self {
        Self {
            structural: lowercase(&config.structural),
            field: lowercase(config.field.values().flatten()),
            breakthrough: lowercase(&config.breakthrough),
            relevant_context: lowercase(&config.relevant_context),
            non_relevant_context: lowercase(&config.non_relevant_context),
            trusted_feed_markers: lowercase(&config.trusted_feed_markers),
            precision_search_markers: lowercase(&config.precision_search_markers),
            preprint_markers: lowercase(&config.preprint_markers),
            venues: config
                .venues
                .iter()
                .map(|v| VenueWeight {
                    name: v.name.to_lowercase(),
                    points: v.points,
                })
                .collect(),
            weights: config.weights.clone(),
            today,
        }
    }

    pub fn score(&self, item: &Item) -> Score {
        let text = item.search_text();
        let origin = item.origin.to_lowercase();
        let w = &self.weights;
        let mut score = Score::new();

        let matched_struct = matches(&self.structural, &text);
        let matched_field = matches(&self.field, &text);
        let relevant = contains_any(&self.relevant_context, &text);
        let non_relevant = contains_any(&self.non_relevant_context, &text);

        if !matched_struct.is_empty() {
            let n = matched_struct.len() as f64;
            if non_relevant && !relevant {
                score.add(
                    "struct_match_weak",
                    n * w.struct_match_weak,
                    format!("structural terms without relevant context: {}", preview(&matched_struct)),
                );
            } else {
                score.add(
                    "struct_match",
                    n * w.struct_match,
                    format!("structural terms: {}", preview(&matched_struct)),
                );
            }
        }

        if !matched_field.is_empty() {
            score.add(
                "field_match",
                matched_field.len() as f64 * w.field_match,
                format!("field terms: {}", preview(&matched_field)),
            );
        }

        if !matched_struct.is_empty() || !matched_field.is_empty() {
            if relevant {
                score.add("core_direction_match", w.core_direction, "core research direction");
            } else {
                score.add(
                    "core_direction_match_weak",
                    w.core_direction_weak,
                    "topic terms without relevant context",
                );
            }
        }

        if !matched_struct.is_empty() && !matched_field.is_empty() {
            score.add("synergy_bonus", w.synergy, "structure combined with field mechanism");
        }

        if contains_any(&self.trusted_feed_markers, &origin) {
            score.add("top_journal_source", w.trusted_feed, "curated journal feed");
        }

        if contains_any(&self.precision_search_markers, &origin) {
            score.add("source_bonus", w.precision_search, "precision search source");
        }

        let breakthrough = matches(&self.breakthrough, &text);
        if !breakthrough.is_empty() {
            score.add(
                "structural_breakthrough",
                w.breakthrough,
                format!("breakthrough terms: {}", preview(&breakthrough)),
            );
        }

        if contains_any(&self.preprint_markers, &origin) && text.contains(STRUCTURE_MARKER) {
            score.add("preprint_structure", w.preprint_structure, "structural preprint");
        }

        if let Some(venue) = self.best_venue(&origin) {
            score.add("journal_impact", venue.points, format!("venue: {}", venue.name));
        }

        if item.citation_count > 0 {
            score.add(
                "citation",
                item.citation_count as f64 * w.citation_multiplier,
                format!("{} citations", item.citation_count),
            );
        }

        if let Some(days) = item.date.as_deref().and_then(parse_date).map(|d| (self.today - d).num_days()) {
            let points = freshness_points(&w.freshness, days);
            score.add("freshness", points, format!("{} days old", days));
        }

        score
    }

    /// Longest venue name contained in the origin
    fn best_venue(&self, origin: &str) -> Option<&VenueWeight> {
        self.venues
            .iter()
            .filter(|v| !v.name.is_empty() && origin.contains(v.name.as_str()))
            .max_by_key(|v| v.name.len())
    }
}

/// Step decay for the first days, linear taper afterwards, zero past the end
/// of the taper and for future dates.
pub fn freshness_points(weights: &FreshnessWeights, days: i64) -> f64 {
    match days {
        0 => weights.same_day,
        1 => weights.one_day,
        2 => weights.two_days,
        d if d >= 3 && d <= weights.taper_end_days => {
            ((weights.taper_end_days - d) as f64 * weights.taper_per_day).max(0.0)
        }
        _ => 0.0,
    }
}

fn lowercase<'a>(terms: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    terms.into_iter().map(|t| t.to_lowercase()).collect()
}

fn matches<'a>(terms: &'a [String], text: &str) -> Vec<&'a str> {
    terms
        .iter()
        .filter(|t| text.contains(t.as_str()))
        .map(String::as_str)
        .collect()
}

fn contains_any(terms: &[String], text: &str) -> bool {
    terms.iter().any(|t| text.contains(t.as_str()))
}

fn preview(terms: &[&str]) -> String {
    terms.iter().take(2).copied().collect::<Vec<_>>().join(", ")
}
