//! Detectors and the match model they share.

pub mod normalize;
pub mod pattern;
pub mod phone;
pub mod semantic;
pub mod user_rules;

pub use normalize::{normalize_text, NormalizedText};
pub use pattern::PatternDetector;
pub use semantic::{SemanticDetector, SemanticFinding, SemanticTransport};
pub use user_rules::UserRuleDetector;

use crate::error::DetectionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Priority of user-defined rule matches. Outranks every other source.
pub const USER_RULE_PRIORITY: i32 = 200;
/// Priority of semantic service matches
pub const SEMANTIC_PRIORITY: i32 = 100;

/// Where a match came from. Drives cache and merge policy, not detector identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Pattern,
    Semantic,
    User,
}

/// Kind of PII a match represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Email,
    PhoneNumber,
    CreditCardNumber,
    SocialSecurityNumber,
    ContextualPii,
    UserDefinedPii,
}

/// Whether a run was fired implicitly on text change or requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    #[default]
    Auto,
    Manual,
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Trigger::Auto),
            "manual" => Ok(Trigger::Manual),
            _ => Err(format!("Invalid trigger: {}", s)),
        }
    }
}

/// Identifies the surface a scan belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionContext {
    /// Identifier of the watched surface (or the filter that discovered it)
    pub surface_id: String,
    /// Index of the field within its surface group
    pub field_index: usize,
    /// Caller locale, e.g. `en-US`; its region seeds phone validation
    pub locale: Option<String>,
}

impl DetectionContext {
    pub fn new(surface_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
            ..Default::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Region part of the locale, upper-cased (`en-us` -> `US`)
    pub fn region(&self) -> Option<String> {
        let locale = self.locale.as_deref()?;
        let mut parts = locale.split(['-', '_']);
        parts.next()?;
        parts
            .last()
            .filter(|r| !r.is_empty())
            .map(|r| r.to_uppercase())
    }
}

/// Everything a detector needs for one scan
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub text: &'a str,
    pub context: &'a DetectionContext,
    pub trigger: Trigger,
}

/// A detected span of PII.
///
/// `start`/`end` are half-open UTF-8 byte offsets on `char` boundaries. A
/// detector reports them against the text it was handed; the engine reports
/// them against the caller's text. `value` is always the normalized literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub detector_id: String,
    pub source: DetectionSource,
    pub entity_type: EntityType,
    /// The literal matched text; used as the cache and ignore key
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Match {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Half-open interval intersection test
    pub fn overlaps(&self, other: &Match) -> bool {
        spans_overlap(self.start, self.end, other.start, other.end)
    }
}

/// `max(a_start, b_start) < min(a_end, b_end)`
pub fn spans_overlap(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// Byte offsets of every non-overlapping occurrence of `needle` in `haystack`.
pub(crate) fn find_all(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .map(|(start, m)| (start, start + m.len()))
        .collect()
}

/// A strategy that finds PII in text.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable identifier stamped on every match this detector emits
    fn id(&self) -> &str;

    /// Human readable name
    fn label(&self) -> &str;

    fn source(&self) -> DetectionSource;

    /// Scan `input.text`. Offsets in the returned matches refer to that text.
    async fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Match>, DetectionError>;
}
