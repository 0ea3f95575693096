//! Merge, deduplicate, score and select
//!
//! Selection keeps every P0 item, caps P1 and P2, and never comes back empty
//! while at least one candidate survived deduplication.

use crate::scoring::ScoringEngine;
use paperwatch_common::config::SelectionConfig;
use paperwatch_common::identity::{KeyResolver, SeenKeySet};
use paperwatch_common::metrics::{record_dropped, record_selection};
use paperwatch_common::models::{ScoredItem, SourceResult, Tier};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Item counts at each stage of ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankStats {
    /// Items from non-errored results
    pub merged: usize,
    /// Errored results left out of the merge
    pub skipped_sources: usize,
    pub already_seen: usize,
    pub duplicates: usize,
    pub unresolvable: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Chosen items, highest score first
    pub selected: Vec<ScoredItem>,
    /// Keys of the selected items, in selection order
    pub new_keys: Vec<String>,
    /// Every scored candidate, highest score first
    pub candidates: Vec<ScoredItem>,
    pub stats: RankStats,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn tier_counts(&self) -> (usize, usize, usize) {
        tier_counts(&self.selected)
    }
}

pub struct Ranker {
    resolver: KeyResolver,
    scoring: ScoringEngine,
    config: SelectionConfig,
}

impl Ranker {
    pub fn new(resolver: KeyResolver, scoring: ScoringEngine, config: SelectionConfig) -> Self {
        Self {
            resolver,
            scoring,
            config,
        }
    }

    /// Inclusive lower bounds: a score of exactly `p0_threshold` is P0
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.config.p0_threshold {
            Tier::P0
        } else if score >= self.config.p1_threshold {
            Tier::P1
        } else {
            Tier::P2
        }
    }

    pub fn rank_and_select(&self, results: &[SourceResult], seen: &SeenKeySet, target_k: usize) -> Selection {
        let mut stats = RankStats::default();
        let mut batch: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for result in results {
            if let Some(ref error) = result.error {
                warn!(origin = %result.origin, error = %error, "Skipping failed source");
                stats.skipped_sources += 1;
                continue;
            }

            for item in &result.items {
                stats.merged += 1;

                let Some(key) = self.resolver.resolve(item) else {
                    warn!(origin = %item.origin, "Dropping item without canonical key");
                    stats.unresolvable += 1;
                    continue;
                };

                if seen.contains(&key) {
                    stats.already_seen += 1;
                    continue;
                }

                let key = key.to_string();
                if !batch.insert(key.clone()) {
                    debug!(key = %key, origin = %item.origin, "Duplicate within batch");
                    stats.duplicates += 1;
                    continue;
                }

                let score = self.scoring.score(item);
                let tier = self.tier_for(score.total());
                candidates.push(ScoredItem {
                    item: item.clone(),
                    key,
                    score,
                    tier,
                });
            }
        }

        record_dropped("unresolvable", stats.unresolvable);
        record_dropped("seen", stats.already_seen);
        record_dropped("duplicate", stats.duplicates);

        // Stable: equal scores keep merge order
        candidates.sort_by(by_score_desc);

        info!(
            merged = stats.merged,
            unseen = candidates.len(),
            already_seen = stats.already_seen,
            duplicates = stats.duplicates,
            unresolvable = stats.unresolvable,
            "Candidates ranked"
        );

        let mut selected = if self.config.tiered {
            self.select_tiered(&candidates, target_k)
        } else {
            candidates.iter().take(target_k).cloned().collect()
        };

        if selected.is_empty() {
            if let Some(top) = candidates.first() {
                warn!(target_k, "Selection empty, falling back to top candidate");
                selected.push(top.clone());
            }
        }

        let (p0, p1, p2) = tier_counts(&selected);
        record_selection(p0, p1, p2);
        info!(selected = selected.len(), p0, p1, p2, "Selection complete");

        let new_keys = selected.iter().map(|s| s.key.clone()).collect();
        Selection {
            selected,
            new_keys,
            candidates,
            stats,
        }
    }

    /// All of P0, capped P1 and P2. Over `target_k`, P0 stays whole and the
    /// remaining room is filled from the capped P1+P2 pool by score.
    fn select_tiered(&self, candidates: &[ScoredItem], target_k: usize) -> Vec<ScoredItem> {
        let in_tier = move |tier: Tier| candidates.iter().filter(move |c| c.tier == tier);

        let p0: Vec<&ScoredItem> = in_tier(Tier::P0).collect();
        let p1: Vec<&ScoredItem> = in_tier(Tier::P1).take(self.config.p1_cap).collect();
        let p2: Vec<&ScoredItem> = in_tier(Tier::P2).take(self.config.p2_cap).collect();

        debug!(p0 = p0.len(), p1 = p1.len(), p2 = p2.len(), "Tier buckets");

        let mut selected: Vec<&ScoredItem> = Vec::with_capacity(p0.len() + p1.len() + p2.len());
        if p0.len() + p1.len() + p2.len() <= target_k {
            selected.extend(p0);
            selected.extend(p1);
            selected.extend(p2);
        } else {
            let remaining = target_k.saturating_sub(p0.len());
            if remaining == 0 {
                info!(p0 = p0.len(), target_k, "P0 alone fills the target, keeping all of it");
            }
            let mut pool: Vec<&ScoredItem> = p1.into_iter().chain(p2).collect();
            pool.sort_by(|a, b| by_score_desc(a, b));
            selected.extend(p0);
            selected.extend(pool.into_iter().take(remaining));
        }

        selected.into_iter().cloned().collect()
    }
}

fn by_score_desc(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total()
        .partial_cmp(&a.score.total())
        .unwrap_or(Ordering::Equal)
}

fn tier_counts(items: &[ScoredItem]) -> (usize, usize, usize) {
    items.iter().fold((0, 0, 0), |(p0, p1, p2), s| match s.tier {
        Tier::P0 => (p0 + 1, p1, p2),
        Tier::P1 => (p0, p1 + 1, p2),
        Tier::P2 => (p0, p1, p2 + 1),
    })
}
