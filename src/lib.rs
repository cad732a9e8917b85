//! PII detection and masking for editable text surfaces.
//!
//! Provides:
//! - Pattern detection of emails, SSNs, phone numbers and credit cards
//! - User-defined literal rules
//! - Contextual detection through an external semantic analysis service
//! - A per-surface engine that merges, caches and de-overlaps findings
//! - Length-preserving masking of flat text and of structured fragment trees

pub mod detection;
pub mod engine;
pub mod error;
pub mod masking;
pub mod projection;
pub mod service;

pub use detection::{
    DetectionContext, DetectionInput, DetectionSource, Detector, EntityType, Match,
    PatternDetector, SemanticDetector, SemanticFinding, SemanticTransport, Trigger,
    UserRuleDetector,
};
pub use engine::DetectionEngine;
pub use error::DetectionError;
pub use masking::{mask_structured, mask_text, MaskOutcome, MaskedText, DEFAULT_MASK_CHAR};
pub use projection::{
    project, FragmentId, FragmentMapping, Node, Projection, RichText, StructuredSource, Visit,
};

use detection::pattern::PatternConfig;
use detection::phone::PhoneRules;
use serde::Deserialize;
use std::path::Path;

/// JSON-serializable configuration for a detection engine
///
/// Field names use kebab-case to match typical JSON config style.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GuardConfigJson {
    /// Character written over masked text
    pub mask_char: String,
    /// Default locale (e.g. "en-US") when the caller supplies none
    pub locale: Option<String>,
    /// Regions tried when the locale region rejects a phone number
    pub fallback_regions: Vec<String>,
    pub min_phone_digits: usize,
    pub max_phone_digits: usize,
    /// Memoized phone validation verdicts
    pub phone_cache_size: usize,
    /// Maximum literals remembered from manual semantic runs
    pub semantic_cache_limit: usize,
    pub email_enabled: bool,
    pub phone_enabled: bool,
    pub credit_card_enabled: bool,
    pub ssn_enabled: bool,
}

impl Default for GuardConfigJson {
    fn default() -> Self {
        let phone = PhoneRules::default();
        Self {
            mask_char: DEFAULT_MASK_CHAR.to_string(),
            locale: None,
            fallback_regions: phone.fallback_regions,
            min_phone_digits: phone.min_digits,
            max_phone_digits: phone.max_digits,
            phone_cache_size: phone.cache_size,
            semantic_cache_limit: 512,
            email_enabled: true,
            phone_enabled: true,
            credit_card_enabled: true,
            ssn_enabled: true,
        }
    }
}

impl TryFrom<GuardConfigJson> for GuardConfig {
    type Error = DetectionError;

    fn try_from(json: GuardConfigJson) -> Result<Self, Self::Error> {
        let mut chars = json.mask_char.chars();
        let mask_char = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(DetectionError::Config(format!(
                    "mask-char must be exactly one character, got {:?}",
                    json.mask_char
                )))
            }
        };

        if json.min_phone_digits > json.max_phone_digits {
            return Err(DetectionError::Config(format!(
                "min-phone-digits ({}) exceeds max-phone-digits ({})",
                json.min_phone_digits, json.max_phone_digits
            )));
        }

        Ok(Self {
            mask_char,
            locale: json.locale.filter(|l| !l.is_empty()),
            pattern: PatternConfig {
                email_enabled: json.email_enabled,
                phone_enabled: json.phone_enabled,
                credit_card_enabled: json.credit_card_enabled,
                ssn_enabled: json.ssn_enabled,
                phone: PhoneRules {
                    min_digits: json.min_phone_digits,
                    max_digits: json.max_phone_digits,
                    fallback_regions: json
                        .fallback_regions
                        .into_iter()
                        .map(|r| r.trim().to_uppercase())
                        .filter(|r| !r.is_empty())
                        .collect(),
                    cache_size: json.phone_cache_size,
                },
            },
            semantic_cache_limit: json.semantic_cache_limit,
        })
    }
}

/// Configuration for a detection engine
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub mask_char: char,
    /// Default locale when the detection context carries none
    pub locale: Option<String>,
    pub pattern: PatternConfig,
    /// Maximum literals remembered from manual semantic runs (0 = unbounded)
    pub semantic_cache_limit: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mask_char: DEFAULT_MASK_CHAR,
            locale: None,
            pattern: PatternConfig::default(),
            semantic_cache_limit: 512,
        }
    }
}

impl GuardConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, DetectionError> {
        let parsed: GuardConfigJson =
            serde_json::from_str(json).map_err(|e| DetectionError::Config(e.to_string()))?;
        parsed.try_into()
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.mask_char, '*');
        assert!(config.pattern.email_enabled);
        assert!(config.pattern.phone_enabled);
        assert_eq!(config.pattern.phone.min_digits, 7);
        assert_eq!(config.pattern.phone.max_digits, 15);
        assert_eq!(config.pattern.phone.fallback_regions, vec!["US", "KR"]);
    }

    #[test]
    fn test_parse_partial_json() {
        let config = GuardConfig::from_json_str(
            r##"{"mask-char": "#", "locale": "ko-KR", "phone-enabled": false, "fallback-regions": ["gb"]}"##,
        )
        .unwrap();
        assert_eq!(config.mask_char, '#');
        assert_eq!(config.locale.as_deref(), Some("ko-KR"));
        assert!(!config.pattern.phone_enabled);
        assert!(config.pattern.ssn_enabled);
        assert_eq!(config.pattern.phone.fallback_regions, vec!["GB"]);
    }

    #[test]
    fn test_rejects_bad_mask_char() {
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"mask-char": "**"}"#),
            Err(DetectionError::Config(_))
        ));
        assert!(GuardConfig::from_json_str(r#"{"mask-char": ""}"#).is_err());
    }

    #[test]
    fn test_rejects_inverted_digit_bounds() {
        assert!(GuardConfig::from_json_str(
            r#"{"min-phone-digits": 12, "max-phone-digits": 8}"#
        )
        .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"semantic-cache-limit": 3}}"#).unwrap();
        let config = GuardConfig::load(file.path()).unwrap();
        assert_eq!(config.semantic_cache_limit, 3);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            GuardConfig::load("/nonexistent/spicy-mask.json"),
            Err(DetectionError::Io(_))
        ));
    }
}
