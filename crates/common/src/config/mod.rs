//! Configuration management for PaperWatch
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values, which carry the production vocabularies and weights
//!
//! Everything the pipeline needs to filter and score is held here and passed
//! down as an immutable value; no component reads globals.

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration (seen keys, runs, score records)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Aggregation pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

/// Everything the aggregation core consumes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Canonical key strategy toggles
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DedupConfig {
    /// Use the title fingerprint after DOI (catches preprint -> publication)
    #[serde(default = "default_enabled")]
    pub title_fingerprint: bool,

    /// Hash the normalized link instead of keying on the raw link
    #[serde(default = "default_enabled")]
    pub link_hash: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Maximum adapters running at once (0 is invalid)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Guard timeout around each adapter, in seconds
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// Retry budget shared by every adapter
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_retry_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds
    #[serde(default = "default_retry_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Oldest accepted item, in days before the reference date
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Youngest accepted item, in days before the reference date
    #[serde(default = "default_min_age_days")]
    pub min_age_days: i64,

    /// Exemption score needed to keep an item that hit an exclusion term
    #[serde(default = "default_exemption_threshold")]
    pub exemption_threshold: f64,

    /// Weighted exemption scoring; when off, any high-value term exempts
    #[serde(default = "default_enabled")]
    pub weighted_exemption: bool,

    /// Keep trusted-origin items whose date is missing or unparseable
    #[serde(default = "default_enabled")]
    pub trusted_date_tolerance: bool,

    /// Origin substrings (case-insensitive) that mark a trusted origin
    #[serde(default = "default_trusted_origins")]
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VocabularyConfig {
    /// Named research-topic keyword lists
    #[serde(default = "default_topics")]
    pub topics: BTreeMap<String, Vec<String>>,

    /// Terms that exclude an item outright unless exempted
    #[serde(default = "default_exclusion")]
    pub exclusion: Vec<String>,

    /// High-value terms feeding the exemption score
    #[serde(default = "default_high_value")]
    pub high_value: Vec<String>,

    /// Verbs that strengthen a nearby high-value term
    #[serde(default = "default_core_verbs")]
    pub core_verbs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Structural vocabulary
    #[serde(default = "default_structural")]
    pub structural: Vec<String>,

    /// Field vocabularies (topic A, topic B, ...)
    #[serde(default = "default_field")]
    pub field: BTreeMap<String, Vec<String>>,

    /// Terms that mark a structural breakthrough
    #[serde(default = "default_breakthrough")]
    pub breakthrough: Vec<String>,

    /// Context that confirms a keyword hit is on-topic
    #[serde(default = "default_relevant_context")]
    pub relevant_context: Vec<String>,

    /// Context (clinical, disease) that down-weights a keyword hit
    #[serde(default = "default_non_relevant_context")]
    pub non_relevant_context: Vec<String>,

    /// Origin substrings for curated journal feeds
    #[serde(default = "default_trusted_feed_markers")]
    pub trusted_feed_markers: Vec<String>,

    /// Origin substrings for precision-search origins
    #[serde(default = "default_precision_search_markers")]
    pub precision_search_markers: Vec<String>,

    /// Origin substrings for preprint servers
    #[serde(default = "default_preprint_markers")]
    pub preprint_markers: Vec<String>,

    /// Venue name -> impact points (matched as a substring of the origin)
    #[serde(default = "default_venues")]
    pub venues: Vec<VenueWeight>,

    #[serde(default)]
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VenueWeight {
    pub name: String,
    pub points: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringWeights {
    #[serde(default = "default_w_struct")]
    pub struct_match: f64,
    #[serde(default = "default_w_struct_weak")]
    pub struct_match_weak: f64,
    #[serde(default = "default_w_field")]
    pub field_match: f64,
    #[serde(default = "default_w_core")]
    pub core_direction: f64,
    #[serde(default = "default_w_core_weak")]
    pub core_direction_weak: f64,
    #[serde(default = "default_w_synergy")]
    pub synergy: f64,
    #[serde(default = "default_w_trusted_feed")]
    pub trusted_feed: f64,
    #[serde(default = "default_w_precision")]
    pub precision_search: f64,
    #[serde(default = "default_w_breakthrough")]
    pub breakthrough: f64,
    #[serde(default = "default_w_preprint")]
    pub preprint_structure: f64,
    #[serde(default = "default_w_citation")]
    pub citation_multiplier: f64,
    #[serde(default)]
    pub freshness: FreshnessWeights,
}

/// Freshness step function breakpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FreshnessWeights {
    #[serde(default = "default_fresh_same_day")]
    pub same_day: f64,
    #[serde(default = "default_fresh_one_day")]
    pub one_day: f64,
    #[serde(default = "default_fresh_two_days")]
    pub two_days: f64,
    /// Points per remaining day in the taper (days 3..=taper_end_days)
    #[serde(default = "default_fresh_taper_rate")]
    pub taper_per_day: f64,
    #[serde(default = "default_fresh_taper_end")]
    pub taper_end_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Target selection size
    #[serde(default = "default_target_k")]
    pub target_k: usize,

    /// Inclusive lower bound of P0
    #[serde(default = "default_p0_threshold")]
    pub p0_threshold: f64,

    /// Inclusive lower bound of P1
    #[serde(default = "default_p1_threshold")]
    pub p1_threshold: f64,

    #[serde(default = "default_p1_cap")]
    pub p1_cap: usize,

    #[serde(default = "default_p2_cap")]
    pub p2_cap: usize,

    /// Tier-aware selection; when off, plain top-K
    #[serde(default = "default_enabled")]
    pub tiered: bool,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/paperwatch".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_enabled() -> bool { true }
fn default_max_workers() -> usize { 8 }
fn default_adapter_timeout() -> u64 { 600 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_initial_delay() -> u64 { 1_000 }
fn default_retry_max_delay() -> u64 { 60_000 }
fn default_window_days() -> i64 { 1 }
fn default_min_age_days() -> i64 { 1 }
fn default_exemption_threshold() -> f64 { 10.0 }
fn default_w_struct() -> f64 { 20.0 }
fn default_w_struct_weak() -> f64 { 5.0 }
fn default_w_field() -> f64 { 12.0 }
fn default_w_core() -> f64 { 20.0 }
fn default_w_core_weak() -> f64 { 5.0 }
fn default_w_synergy() -> f64 { 25.0 }
fn default_w_trusted_feed() -> f64 { 20.0 }
fn default_w_precision() -> f64 { 5.0 }
fn default_w_breakthrough() -> f64 { 15.0 }
fn default_w_preprint() -> f64 { 10.0 }
fn default_w_citation() -> f64 { 2.0 }
fn default_fresh_same_day() -> f64 { 10.0 }
fn default_fresh_one_day() -> f64 { 5.0 }
fn default_fresh_two_days() -> f64 { 2.0 }
fn default_fresh_taper_rate() -> f64 { 0.1 }
fn default_fresh_taper_end() -> i64 { 30 }
fn default_target_k() -> usize { 12 }
fn default_p0_threshold() -> f64 { 50.0 }
fn default_p1_threshold() -> f64 { 30.0 }
fn default_p1_cap() -> usize { 5 }
fn default_p2_cap() -> usize { 7 }

fn strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn default_trusted_origins() -> Vec<String> {
    strings(&["rss_topjournal", "nature.com", "sciencemag.org", "cell.com"])
}

fn default_topics() -> BTreeMap<String, Vec<String>> {
    let mut topics = BTreeMap::new();
    topics.insert(
        "nitrogen_fixation".to_string(),
        strings(&[
            "nitrogen fixation", "biological nitrogen fixation", "nitrogenase",
            "rhizobia", "rhizobium", "root nodule", "nodulation", "symbiosis",
            "diazotroph", "nif genes", "nitrogen-fixing", "nitrogen fixing bacteria",
            "legume-rhizobium", "symbiosome", "nitrogenase complex", "nif cluster",
            "nitrogen metabolism", "ammonia", "legume", "soybean", "bradyrhizobium",
            "sinorhizobium", "azotobacter", "cyanobacteria", "heterocyst",
        ]),
    );
    topics.insert(
        "signal_transduction".to_string(),
        strings(&[
            "extracellular signal", "signal perception", "signal transduction",
            "receptor kinase", "receptor-like kinase", "rlk", "g-protein coupled receptor",
            "gpcr", "ligand binding", "ligand recognition", "phosphorylation cascade",
            "signal pathway", "signaling pathway", "two-component system",
            "histidine kinase", "response regulator", "receptor activation",
            "membrane receptor", "protein kinase", "map kinase", "mapk",
            "calcium signaling", "hormone signaling", "plant immunity", "defense response",
            "pattern recognition", "elicitor", "pamp", "effector", "nlr", "resistosome",
            "effector-triggered immunity", "calcium-dependent protein kinase", "cdpk",
            "plant immune receptor", "immune signaling", "cell surface receptor",
            "plasma membrane receptor", "pattern-triggered immunity",
            "pattern recognition receptor", "fls2", "bak1", "bik1", "flg22", "elf18",
            "ros burst", "oxidative burst", "callose deposition", "mapk cascade",
        ]),
    );
    topics.insert(
        "enzyme_mechanism".to_string(),
        strings(&[
            "enzyme structure", "enzyme mechanism", "catalytic mechanism", "active site",
            "catalytic site", "allosteric regulation", "allosteric site", "enzyme kinetics",
            "cryo-em structure", "cryo-em", "cryo-electron microscopy", "crystal structure",
            "x-ray crystallography", "substrate specificity", "substrate binding",
            "transition state", "cofactor", "enzyme-substrate complex", "enzyme catalysis",
            "catalytic domain", "enzyme conformation", "structural biology",
            "protein structure", "molecular structure", "binding site",
            "conformational change", "protein folding", "metalloenzyme",
            "oxidoreductase", "hydrolase", "transferase", "isomerase",
            "nlr structure", "resistosome structure",
        ]),
    );
    topics
}

fn default_exclusion() -> Vec<String> {
    strings(&[
        "human", "patient", "clinical", "mouse", "mice", "rat", "rats", "avian", "bird",
        "fish", "cancer", "tumor", "tumour", "carcinoma", "mammal", "vertebrate",
        "zebrafish", "drosophila", "therapy", "treatment", "drug", "medicine", "medical",
        "hospital",
    ])
}

fn default_high_value() -> Vec<String> {
    strings(&[
        "cryo-em", "cryo-electron microscopy", "crystal structure", "x-ray crystallography",
        "atomic resolution", "angstrom resolution", "structural biology", "nlr",
        "nlr structure", "nlr receptor", "nlr complex", "resistosome", "inflammasome",
        "receptor structure", "protein complex structure", "conformational change",
        "active site structure",
    ])
}

fn default_core_verbs() -> Vec<String> {
    strings(&[
        "resolved", "determined", "revealed", "elucidated", "complex structure of",
        "mechanism of", "architecture of",
    ])
}

fn default_structural() -> Vec<String> {
    strings(&[
        "cryo-em", "cryo-electron microscopy", "crystal structure", "x-ray crystallography",
        "atomic resolution", "angstrom resolution", "active site", "conformation",
        "mechanism", "nlr structure", "resistosome", "inflammasome", "conformational change",
    ])
}

fn default_field() -> BTreeMap<String, Vec<String>> {
    let mut field = BTreeMap::new();
    field.insert(
        "nitrogen_fixation".to_string(),
        strings(&[
            "nitrogen fixation", "nitrogenase", "nif", "nodulation", "symbiosome",
            "rhizobia", "root nodule", "diazotroph", "legume-rhizobium",
        ]),
    );
    field.insert(
        "signal_transduction".to_string(),
        strings(&[
            "signal transduction", "receptor kinase", "ligand", "phosphorylation",
            "signaling pathway", "receptor-like kinase", "rlk", "two-component system",
            "pattern-triggered immunity", "pattern triggered immunity", "pti",
            "pattern recognition receptor", "prr", "cell surface receptor",
            "plasma membrane receptor", "fls2", "efr", "bak1", "serk", "bik1", "flg22",
            "elf18", "mapk", "mpk3", "mpk6", "ros burst", "callose deposition",
        ]),
    );
    field
}

fn default_breakthrough() -> Vec<String> {
    strings(&[
        "nlr", "resistosome", "inflammasome", "cryo-em", "cryo-electron microscopy",
        "atomic resolution",
    ])
}

fn default_relevant_context() -> Vec<String> {
    strings(&[
        "enzyme structure", "protein structure", "molecular structure", "catalytic",
        "mechanism", "active site", "substrate", "nitrogenase", "nitrogen fixation",
        "signal transduction", "receptor", "kinase", "phosphorylation", "enzyme mechanism",
        "catalytic mechanism", "allosteric", "substrate binding", "enzyme-substrate",
        "catalytic domain", "root nodule", "symbiosis", "rhizobium", "legume",
        "receptor activation", "ligand binding", "signal pathway", "two-component",
        "histidine kinase", "response regulator",
    ])
}

fn default_non_relevant_context() -> Vec<String> {
    strings(&[
        "cancer", "tumor", "oncology", "clinical", "disease", "pathology", "diagnostic",
        "biomarker", "therapeutic", "drug discovery", "pharmaceutical", "medical",
        "patient", "treatment", "diabetes", "metabolic disease", "cardiovascular",
        "neurological", "immunotherapy", "chemotherapy", "surgery", "diagnosis",
        "prognosis", "epidemiology", "public health", "healthcare",
    ])
}

fn default_trusted_feed_markers() -> Vec<String> { strings(&["rss"]) }
fn default_precision_search_markers() -> Vec<String> { strings(&["europepmc"]) }
fn default_preprint_markers() -> Vec<String> { strings(&["biorxiv"]) }

fn default_venues() -> Vec<VenueWeight> {
    [
        ("nature", 15.0), ("science", 15.0), ("cell", 15.0),
        ("nature plants", 12.0), ("nature chemical biology", 12.0),
        ("nature structural", 12.0), ("nature structural & molecular biology", 12.0),
        ("nature communications", 10.0), ("molecular plant", 10.0), ("plant cell", 10.0),
        ("molecular cell", 12.0), ("pnas", 8.0), ("plos biology", 8.0), ("elife", 8.0),
        ("biorxiv", 0.0), ("arxiv", 0.0),
    ]
    .into_iter()
    .map(|(name, points)| VenueWeight { name: name.to_string(), points })
    .collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { title_fingerprint: true, link_hash: true }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            adapter_timeout_secs: default_adapter_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial_delay(),
            max_delay_ms: default_retry_max_delay(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_age_days: default_min_age_days(),
            exemption_threshold: default_exemption_threshold(),
            weighted_exemption: true,
            trusted_date_tolerance: true,
            trusted_origins: default_trusted_origins(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            exclusion: default_exclusion(),
            high_value: default_high_value(),
            core_verbs: default_core_verbs(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            structural: default_structural(),
            field: default_field(),
            breakthrough: default_breakthrough(),
            relevant_context: default_relevant_context(),
            non_relevant_context: default_non_relevant_context(),
            trusted_feed_markers: default_trusted_feed_markers(),
            precision_search_markers: default_precision_search_markers(),
            preprint_markers: default_preprint_markers(),
            venues: default_venues(),
            weights: ScoringWeights::default(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            struct_match: default_w_struct(),
            struct_match_weak: default_w_struct_weak(),
            field_match: default_w_field(),
            core_direction: default_w_core(),
            core_direction_weak: default_w_core_weak(),
            synergy: default_w_synergy(),
            trusted_feed: default_w_trusted_feed(),
            precision_search: default_w_precision(),
            breakthrough: default_w_breakthrough(),
            preprint_structure: default_w_preprint(),
            citation_multiplier: default_w_citation(),
            freshness: FreshnessWeights::default(),
        }
    }
}

impl Default for FreshnessWeights {
    fn default() -> Self {
        Self {
            same_day: default_fresh_same_day(),
            one_day: default_fresh_one_day(),
            two_days: default_fresh_two_days(),
            taper_per_day: default_fresh_taper_rate(),
            taper_end_days: default_fresh_taper_end(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            target_k: default_target_k(),
            p0_threshold: default_p0_threshold(),
            p1_threshold: default_p1_threshold(),
            p1_cap: default_p1_cap(),
            p2_cap: default_p2_cap(),
            tiered: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__PIPELINE__SELECTION__TARGET_K=20
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.pipeline.validate()?;
        Ok(app)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.pipeline.validate()?;
        Ok(app)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl FetchConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }
}

impl PipelineConfig {
    /// All topic keywords across every named topic list
    pub fn all_topic_keywords(&self) -> impl Iterator<Item = &String> {
        self.vocabulary.topics.values().flatten()
    }

    /// Check everything a run needs before any fetch begins.
    ///
    /// Every problem found is reported in one error.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let vocab = &self.vocabulary;
        let scoring = &self.scoring;
        if vocab.topics.len() < 3 {
            problems.push(format!(
                "vocabulary.topics needs at least 3 named lists, found {}",
                vocab.topics.len()
            ));
        }
        if scoring.field.is_empty() {
            problems.push("scoring.field needs at least one named list".to_string());
        }

        let mut required: Vec<(String, &Vec<String>)> = vec![
            ("vocabulary.exclusion".into(), &vocab.exclusion),
            ("vocabulary.high_value".into(), &vocab.high_value),
            ("vocabulary.core_verbs".into(), &vocab.core_verbs),
            ("scoring.structural".into(), &scoring.structural),
        ];
        required.extend(vocab.topics.iter().map(|(name, terms)| (format!("vocabulary.topics.{}", name), terms)));
        required.extend(scoring.field.iter().map(|(name, terms)| (format!("scoring.field.{}", name), terms)));
        for (field, terms) in &required {
            if terms.is_empty() {
                problems.push(format!("{} is empty", field));
            }
        }

        // A blank term is a substring of every text, so it would match everything
        let optional: [(String, &Vec<String>); 7] = [
            ("scoring.breakthrough".into(), &scoring.breakthrough),
            ("scoring.relevant_context".into(), &scoring.relevant_context),
            ("scoring.non_relevant_context".into(), &scoring.non_relevant_context),
            ("scoring.trusted_feed_markers".into(), &scoring.trusted_feed_markers),
            ("scoring.precision_search_markers".into(), &scoring.precision_search_markers),
            ("scoring.preprint_markers".into(), &scoring.preprint_markers),
            ("filter.trusted_origins".into(), &self.filter.trusted_origins),
        ];
        for (field, terms) in required.iter().chain(optional.iter()) {
            for (i, term) in terms.iter().enumerate() {
                if term.trim().is_empty() {
                    problems.push(format!("{}[{}] is blank", field, i));
                }
            }
        }
        for (i, venue) in scoring.venues.iter().enumerate() {
            if venue.name.trim().is_empty() {
                problems.push(format!("scoring.venues[{}] has a blank name", i));
            }
            if !venue.points.is_finite() {
                problems.push(format!("scoring.venues[{}] ({}) points must be finite", i, venue.name));
            }
        }

        let filter = &self.filter;
        if !filter.exemption_threshold.is_finite() {
            problems.push("filter.exemption_threshold must be finite".to_string());
        }
        if filter.min_age_days < 0 {
            problems.push("filter.min_age_days must not be negative".to_string());
        }
        if filter.window_days < filter.min_age_days {
            problems.push(format!(
                "filter.window_days ({}) is below filter.min_age_days ({})",
                filter.window_days, filter.min_age_days
            ));
        }

        let sel = &self.selection;
        if !sel.p0_threshold.is_finite() || !sel.p1_threshold.is_finite() {
            problems.push("selection thresholds must be finite".to_string());
        } else if sel.p1_threshold > sel.p0_threshold {
            problems.push(format!(
                "selection.p1_threshold ({}) is above selection.p0_threshold ({})",
                sel.p1_threshold, sel.p0_threshold
            ));
        }

        let w = &self.scoring.weights;
        let f = &w.freshness;
        for (name, value) in [
            ("struct_match", w.struct_match),
            ("struct_match_weak", w.struct_match_weak),
            ("field_match", w.field_match),
            ("core_direction", w.core_direction),
            ("core_direction_weak", w.core_direction_weak),
            ("synergy", w.synergy),
            ("trusted_feed", w.trusted_feed),
            ("precision_search", w.precision_search),
            ("breakthrough", w.breakthrough),
            ("preprint_structure", w.preprint_structure),
            ("citation_multiplier", w.citation_multiplier),
            ("freshness.same_day", f.same_day),
            ("freshness.one_day", f.one_day),
            ("freshness.two_days", f.two_days),
            ("freshness.taper_per_day", f.taper_per_day),
        ] {
            if !value.is_finite() {
                problems.push(format!("scoring.weights.{} must be finite", name));
            }
        }
        if f.taper_end_days < 3 {
            problems.push("scoring.weights.freshness.taper_end_days must be 3 or later".to_string());
        }

        if self.fetch.max_workers == 0 {
            problems.push("fetch.max_workers must be at least 1".to_string());
        }
        if self.fetch.retry.max_attempts == 0 {
            problems.push("fetch.retry.max_attempts must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::config(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.selection.target_k, 12);
        assert_eq!(config.pipeline.selection.p0_threshold, 50.0);
        assert_eq!(config.pipeline.filter.window_days, 1);
        assert!(config.pipeline.dedup.title_fingerprint);
    }

    #[test]
    fn test_default_pipeline_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/paperwatch");
    }

    #[test]
    fn test_missing_vocabulary_is_reported() {
        let mut config = PipelineConfig::default();
        config.vocabulary.exclusion.clear();
        config.vocabulary.topics.remove("enzyme_mechanism");

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(err.is_fatal());
        assert!(message.contains("vocabulary.exclusion"));
        assert!(message.contains("at least 3"));
    }

    #[test]
    fn test_blank_term_rejected() {
        let mut config = PipelineConfig::default();
        config.vocabulary.exclusion.push(" ".to_string());
        config.scoring.relevant_context.push(String::new());
        if let Some(terms) = config.vocabulary.topics.values_mut().next() {
            terms.push("  ".to_string());
        }

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(err.is_fatal());
        let exclusion_index = config.vocabulary.exclusion.len() - 1;
        assert!(message.contains(&format!("vocabulary.exclusion[{}] is blank", exclusion_index)));
        assert!(message.contains("scoring.relevant_context["));
        assert!(message.contains("vocabulary.topics."));
    }

    #[test]
    fn test_non_finite_weights_rejected() {
        let mut config = PipelineConfig::default();
        config.scoring.weights.synergy = f64::NAN;
        config.scoring.weights.freshness.same_day = f64::INFINITY;
        config.scoring.venues.push(VenueWeight {
            name: "Broken Journal".to_string(),
            points: f64::NAN,
        });

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("scoring.weights.synergy must be finite"));
        assert!(message.contains("scoring.weights.freshness.same_day must be finite"));
        assert!(message.contains("(Broken Journal) points must be finite"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = PipelineConfig::default();
        config.selection.p1_threshold = 60.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.filter.window_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [selection]
            target_k = 20
        "#;
        let config: PipelineConfig = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.selection.target_k, 20);
        assert_eq!(config.selection.p1_cap, 5);
        assert_eq!(config.vocabulary.topics.len(), 3);
    }
}
