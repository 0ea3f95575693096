//! Canonical identity for items
//!
//! Resolution is a cascade; the first applicable strategy wins:
//! 1. DOI (with any resolver prefix stripped)
//! 2. Title fingerprint (when enabled)
//! 3. Normalized link hash (when enabled) or the raw link
//! 4. Title hash, qualified by origin when one is known
//!
//! Keys from different strategies never compare equal, even when they name
//! the same paper. An item with a DOI from one feed and only a link from
//! another resolves to two different keys.

use crate::config::DedupConfig;
use crate::errors::AppError;
use crate::models::Item;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error};
use url::{form_urlencoded, Url};

/// Query parameters that never identify a document
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
    "fbclid", "gclid", "ref", "source", "from",
];

const DOI_PREFIXES: &[&str] = &["https://doi.org/", "http://doi.org/", "doi:"];

const GREEK_LETTERS: &[(char, &str)] = &[
    ('α', "alpha"), ('β', "beta"), ('γ', "gamma"), ('δ', "delta"), ('ε', "epsilon"),
    ('ζ', "zeta"), ('η', "eta"), ('θ', "theta"), ('ι', "iota"), ('κ', "kappa"),
    ('λ', "lambda"), ('μ', "mu"), ('ν', "nu"), ('ξ', "xi"), ('ο', "omicron"),
    ('π', "pi"), ('ρ', "rho"), ('σ', "sigma"), ('τ', "tau"), ('υ', "upsilon"),
    ('φ', "phi"), ('χ', "chi"), ('ψ', "psi"), ('ω', "omega"),
];

/// Which strategy produced a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Doi,
    TitleFingerprint,
    LinkHash,
    Link,
    Title,
}

impl KeyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            KeyKind::Doi => "DOI",
            KeyKind::TitleFingerprint => "TITLE_FP",
            KeyKind::LinkHash => "LINK_HASH",
            KeyKind::Link => "LINK",
            KeyKind::Title => "TITLE",
        }
    }
}

/// Deduplication identity of an item, tagged with the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalKey {
    Doi(String),
    TitleFingerprint(String),
    LinkHash(String),
    Link(String),
    Title { origin: Option<String>, digest: String },
}

impl CanonicalKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            CanonicalKey::Doi(_) => KeyKind::Doi,
            CanonicalKey::TitleFingerprint(_) => KeyKind::TitleFingerprint,
            CanonicalKey::LinkHash(_) => KeyKind::LinkHash,
            CanonicalKey::Link(_) => KeyKind::Link,
            CanonicalKey::Title { .. } => KeyKind::Title,
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.kind().tag();
        match self {
            CanonicalKey::Doi(v)
            | CanonicalKey::TitleFingerprint(v)
            | CanonicalKey::LinkHash(v)
            | CanonicalKey::Link(v) => write!(f, "{}:{}", tag, v),
            CanonicalKey::Title { origin: Some(origin), digest } => {
                write!(f, "{}:{}:{}", tag, origin, digest)
            }
            CanonicalKey::Title { origin: None, digest } => write!(f, "{}:{}", tag, digest),
        }
    }
}

impl Serialize for CanonicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Keys delivered by earlier runs, as stored
///
/// Read-only for the duration of a run; the delta is returned separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SeenKeySet(HashSet<String>);

impl SeenKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.0.contains(&key.to_string())
    }

    pub fn contains_str(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SeenKeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Computes canonical keys under the configured strategy toggles
#[derive(Debug, Clone, Copy)]
pub struct KeyResolver {
    title_fingerprint: bool,
    link_hash: bool,
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

impl KeyResolver {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            title_fingerprint: config.title_fingerprint,
            link_hash: config.link_hash,
        }
    }

    /// Resolve the canonical key, or `None` when the item has no DOI, link or title
    pub fn resolve(&self, item: &Item) -> Option<CanonicalKey> {
        let doi = strip_doi(&item.doi);
        if !doi.is_empty() {
            return Some(self.traced(CanonicalKey::Doi(doi.to_string()), item));
        }

        let has_title = !item.title.trim().is_empty();
        if self.title_fingerprint && has_title {
            if let Some(fp) = title_fingerprint(&item.title) {
                return Some(self.traced(CanonicalKey::TitleFingerprint(fp), item));
            }
        }

        let link = item.link.trim();
        if !link.is_empty() {
            let key = if self.link_hash {
                CanonicalKey::LinkHash(digest16(&normalize_link(link)))
            } else {
                CanonicalKey::Link(link.to_string())
            };
            return Some(self.traced(key, item));
        }

        if has_title {
            let origin = Some(item.origin.clone()).filter(|o| !o.is_empty());
            let key = CanonicalKey::Title {
                origin,
                digest: digest16(&item.title),
            };
            return Some(self.traced(key, item));
        }

        let e = AppError::UnresolvableItem {
            origin: item.origin.clone(),
        };
        error!(error = %e, "Cannot derive canonical key: DOI, link and title are all empty");
        None
    }

    fn traced(&self, key: CanonicalKey, item: &Item) -> CanonicalKey {
        debug!(kind = key.kind().tag(), key = %key, title = %item.short_title(), "Resolved canonical key");
        key
    }
}

/// Strip resolver prefixes from a DOI
pub fn strip_doi(doi: &str) -> &str {
    let mut rest = doi.trim();
    // Prefixes can stack, e.g. "doi:https://doi.org/10.1/x"
    while let Some(stripped) = DOI_PREFIXES.iter().find_map(|p| rest.strip_prefix(p)) {
        rest = stripped.trim();
    }
    rest
}

/// Fingerprint a title so that a preprint and its published version collide.
///
/// Returns `None` when nothing alphanumeric is left after normalization.
pub fn title_fingerprint(title: &str) -> Option<String> {
    let mut normalized = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if let Some((_, latin)) = GREEK_LETTERS.iter().find(|(g, _)| *g == c) {
            normalized.push_str(latin);
        } else if c.is_alphanumeric() {
            normalized.push(c);
        }
    }

    if normalized.is_empty() {
        return None;
    }
    Some(digest16(&normalized))
}

/// Canonicalize a link so trivial variants hash identically.
///
/// Links that do not parse as URLs are returned trimmed but otherwise raw.
pub fn normalize_link(link: &str) -> String {
    let raw = link.trim();
    let mut parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };

    if parsed.scheme() == "http" {
        // http -> https is always permitted between special schemes
        let _ = parsed.set_scheme("https");
    }
    parsed.set_fragment(None);

    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_str()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        parsed.set_query(Some(&query));
    }

    parsed.to_string()
}

/// SHA-256 truncated to 16 hex characters
pub fn digest16(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(title_fingerprint: bool, link_hash: bool) -> KeyResolver {
        KeyResolver::new(&DedupConfig { title_fingerprint, link_hash })
    }

    #[test]
    fn test_doi_wins_over_everything() {
        let item = Item::new("Structure of nitrogenase", "PubMed")
            .with_doi("https://doi.org/10.1038/s41586-024-0001")
            .with_link("https://example.com/p");

        let key = KeyResolver::default().resolve(&item).unwrap();
        assert_eq!(key, CanonicalKey::Doi("10.1038/s41586-024-0001".into()));
        assert_eq!(key.to_string(), "DOI:10.1038/s41586-024-0001");
    }

    #[test]
    fn test_doi_prefix_variants() {
        assert_eq!(strip_doi("doi:10.1/x"), "10.1/x");
        assert_eq!(strip_doi("http://doi.org/10.1/x"), "10.1/x");
        assert_eq!(strip_doi("  10.1/x "), "10.1/x");
        assert_eq!(strip_doi("doi:"), "");
    }

    #[test]
    fn test_stacked_doi_prefixes_resolve_to_one_key() {
        assert_eq!(strip_doi("doi:https://doi.org/10.1/x"), "10.1/x");
        assert_eq!(strip_doi("https://doi.org/ doi:10.1/x"), "10.1/x");

        let plain = Item::new("Nitrogenase", "PubMed").with_doi("10.1/x");
        let stacked = Item::new("Nitrogenase", "RSS").with_doi("doi:https://doi.org/10.1/x");
        let resolver = KeyResolver::default();
        assert_eq!(resolver.resolve(&plain), resolver.resolve(&stacked));
    }

    #[test]
    fn test_prefix_only_doi_falls_through() {
        let item = Item::new("", "RSS").with_doi("doi: ").with_link("https://example.com/a");
        let key = resolver(true, true).resolve(&item).unwrap();
        assert_eq!(key.kind(), KeyKind::LinkHash);
    }

    #[test]
    fn test_title_fingerprint_matches_preprint_and_publication() {
        let preprint = Item::new("Cryo-EM structure of α-subunit", "bioRxiv")
            .with_link("https://www.biorxiv.org/content/10.1101/1");
        let published = Item::new("Cryo-EM Structure of Alpha Subunit.", "Nature")
            .with_link("https://www.nature.com/articles/x");

        let r = resolver(true, true);
        let a = r.resolve(&preprint).unwrap();
        let b = r.resolve(&published).unwrap();
        assert_eq!(a.kind(), KeyKind::TitleFingerprint);
        assert_eq!(a, b);
        assert!(a.to_string().starts_with("TITLE_FP:"));
        assert_eq!(a.to_string().len(), "TITLE_FP:".len() + 16);
    }

    #[test]
    fn test_link_hash_stable_under_trivial_variation() {
        let r = resolver(false, true);
        let variants = [
            "https://example.com/p",
            "http://example.com/p",
            "http://Example.COM/p/",
            "https://example.com/p?utm_source=x&utm_medium=email",
            "https://example.com/p/?fbclid=abc#section",
        ];
        let keys: Vec<_> = variants
            .iter()
            .map(|link| r.resolve(&Item::new("t", "o").with_link(*link)).unwrap())
            .collect();

        assert_eq!(keys[0].kind(), KeyKind::LinkHash);
        assert!(keys.iter().all(|k| *k == keys[0]), "keys differ: {:?}", keys);
    }

    #[test]
    fn test_query_order_is_normalized() {
        assert_eq!(
            normalize_link("http://Example.com/a/?b=2&a=1&ref=home"),
            "https://example.com/a?a=1&b=2"
        );
        assert_ne!(
            normalize_link("https://example.com/a?id=1"),
            normalize_link("https://example.com/a?id=2")
        );
    }

    #[test]
    fn test_unparseable_link_is_kept_raw() {
        assert_eq!(normalize_link(" not a url "), "not a url");
    }

    #[test]
    fn test_raw_link_mode() {
        let item = Item::new("t", "o").with_link("http://Example.com/p/");
        let key = resolver(false, false).resolve(&item).unwrap();
        assert_eq!(key.to_string(), "LINK:http://Example.com/p/");
    }

    #[test]
    fn test_title_origin_fallback() {
        let r = resolver(false, true);
        let with_origin = r.resolve(&Item::new("Some title", "PubMed")).unwrap();
        let without_origin = r.resolve(&Item::new("Some title", "")).unwrap();

        let digest = digest16("Some title");
        assert_eq!(with_origin.to_string(), format!("TITLE:PubMed:{}", digest));
        assert_eq!(without_origin.to_string(), format!("TITLE:{}", digest));
    }

    #[test]
    fn test_empty_item_is_unresolvable() {
        assert!(KeyResolver::default().resolve(&Item::new("", "PubMed")).is_none());
    }

    #[test]
    fn test_doi_and_link_do_not_merge() {
        // The same paper seen through a DOI-bearing feed and a link-only feed
        let r = resolver(false, true);
        let via_doi = Item::new("Paper", "EuropePMC").with_doi("10.1/x");
        let via_link = Item::new("Paper", "RSS").with_link("http://Example.com/p/?utm_source=x");

        let a = r.resolve(&via_doi).unwrap();
        let b = r.resolve(&via_link).unwrap();
        assert_eq!(a.kind(), KeyKind::Doi);
        assert_eq!(b.kind(), KeyKind::LinkHash);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seen_set_matches_rendered_keys() {
        let seen: SeenKeySet = ["DOI:10.1/x", "LINK_HASH:abc"].into_iter().collect();
        assert!(seen.contains(&CanonicalKey::Doi("10.1/x".into())));
        assert!(!seen.contains(&CanonicalKey::Link("10.1/x".into())));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let item = Item::new("β-barrel assembly", "bioRxiv").with_link("https://x.org/1");
        let r = KeyResolver::default();
        assert_eq!(r.resolve(&item), r.resolve(&item));
        assert_eq!(title_fingerprint("β-barrel"), title_fingerprint("Beta barrel"));
    }
}
