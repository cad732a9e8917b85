//! Pattern-based PII detection.
//!
//! Detects emails, SSNs, phone numbers and credit cards with prioritized
//! regular expressions, then validates credit cards (Luhn) and phone numbers
//! (date heuristics, digit bounds, numbering plans) before accepting them.

use super::normalize::normalize_text;
use super::phone::{PhoneRules, PhoneValidator};
use super::{spans_overlap, DetectionInput, DetectionSource, Detector, EntityType, Match};
use crate::error::DetectionError;
use async_trait::async_trait;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

pub const PATTERN_DETECTOR_ID: &str = "pattern-detector";

/// Pattern kinds, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    CreditCard,
    Ssn,
    Email,
    PhoneNumber,
}

impl PatternKind {
    /// All kinds in the order they are scanned
    pub const ALL: [PatternKind; 4] = [
        PatternKind::CreditCard,
        PatternKind::Ssn,
        PatternKind::Email,
        PatternKind::PhoneNumber,
    ];

    /// Get the display name for this pattern
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::CreditCard => "Credit Card",
            PatternKind::Ssn => "SSN",
            PatternKind::Email => "Email",
            PatternKind::PhoneNumber => "Phone Number",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            PatternKind::CreditCard => EntityType::CreditCardNumber,
            PatternKind::Ssn => EntityType::SocialSecurityNumber,
            PatternKind::Email => EntityType::Email,
            PatternKind::PhoneNumber => EntityType::PhoneNumber,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            PatternKind::CreditCard => 120,
            PatternKind::Ssn => 110,
            PatternKind::Email => 100,
            PatternKind::PhoneNumber => 90,
        }
    }

    fn regex_source(&self) -> &'static str {
        match self {
            PatternKind::CreditCard => {
                r"\b(?:3[47][0-9]{2}[\s-]?[0-9]{6}[\s-]?[0-9]{5}|(?:4[0-9]{3}|5[1-5][0-9]{2}|6011)[\s-]?[0-9]{4}[\s-]?[0-9]{4}[\s-]?[0-9]{4})\b"
            }
            PatternKind::Ssn => r"\b[0-9]{3}-[0-9]{2}-[0-9]{4}\b",
            PatternKind::Email => r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            // The phone number itself is capture group 1; the prefix stands in
            // for a look-behind on start of text, whitespace or a colon.
            PatternKind::PhoneNumber => {
                r"(?:^|[\s:])([+(]?(?:[0-9][ \-().~;:]*){7,15}[0-9])\b"
            }
        }
    }
}

/// Which patterns are scanned, plus phone validation settings
#[derive(Debug, Clone)]
pub struct PatternConfig {
    pub email_enabled: bool,
    pub phone_enabled: bool,
    pub credit_card_enabled: bool,
    pub ssn_enabled: bool,
    pub phone: PhoneRules,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            email_enabled: true,
            phone_enabled: true,
            credit_card_enabled: true,
            ssn_enabled: true,
            phone: PhoneRules::default(),
        }
    }
}

impl PatternConfig {
    fn is_enabled(&self, kind: PatternKind) -> bool {
        match kind {
            PatternKind::CreditCard => self.credit_card_enabled,
            PatternKind::Ssn => self.ssn_enabled,
            PatternKind::Email => self.email_enabled,
            PatternKind::PhoneNumber => self.phone_enabled,
        }
    }
}

/// Luhn checksum over the digits of `value`, which must hold 13 to 19 digits
pub fn is_valid_luhn(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

#[derive(Debug, Clone)]
struct Candidate {
    kind: PatternKind,
    start: usize,
    end: usize,
}

impl Candidate {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Detector for PII with a recognizable shape
pub struct PatternDetector {
    config: PatternConfig,
    patterns: Vec<(PatternKind, Regex)>,
    phone: PhoneValidator,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(PatternConfig::default())
    }
}

impl PatternDetector {
    /// Create a new pattern detector
    pub fn new(config: PatternConfig) -> Self {
        let patterns = PatternKind::ALL
            .iter()
            .filter(|kind| config.is_enabled(**kind))
            .map(|kind| {
                (
                    *kind,
                    Regex::new(kind.regex_source()).expect("Invalid PII pattern"),
                )
            })
            .collect();

        Self {
            phone: PhoneValidator::new(config.phone.clone()),
            config,
            patterns,
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Detect all pattern PII in `text`.
    ///
    /// The text is normalized first; offsets and values in the result refer
    /// to [`normalize_text`]`(text)`. Already-normalized input is unchanged by
    /// that step.
    pub fn scan(&self, text: &str, region: Option<&str>) -> Vec<Match> {
        if text.is_empty() {
            return Vec::new();
        }

        let normalized = normalize_text(text);
        let text: Cow<'_, str> = if normalized == text {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(normalized)
        };

        let mut candidates = self.collect_candidates(&text);
        if candidates.is_empty() {
            return Vec::new();
        }

        // Claim order: priority, then longer spans, then earlier spans
        candidates.sort_by(|a, b| {
            b.kind
                .priority()
                .cmp(&a.kind.priority())
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.start.cmp(&b.start))
        });

        let mut accepted: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if accepted
                .iter()
                .any(|a| spans_overlap(a.start, a.end, candidate.start, candidate.end))
            {
                continue;
            }

            let value = &text[candidate.start..candidate.end];
            let valid = match candidate.kind {
                PatternKind::CreditCard => is_valid_luhn(value),
                PatternKind::PhoneNumber => self.phone.is_plausible(value, region),
                PatternKind::Ssn | PatternKind::Email => true,
            };
            if valid {
                accepted.push(candidate);
            }
        }

        let mut matches: Vec<Match> = accepted
            .into_iter()
            .map(|c| Match {
                detector_id: PATTERN_DETECTOR_ID.to_string(),
                source: DetectionSource::Pattern,
                entity_type: c.kind.entity_type(),
                value: text[c.start..c.end].to_string(),
                start: c.start,
                end: c.end,
                priority: c.kind.priority(),
                reason: Some(format!("Matched PII pattern for {}.", c.kind.label())),
            })
            .collect();

        matches.sort_by_key(|m| m.start);
        matches
    }

    fn collect_candidates(&self, text: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (kind, regex) in &self.patterns {
            if *kind == PatternKind::PhoneNumber {
                for caps in regex.captures_iter(text) {
                    if let Some(m) = caps.get(1) {
                        candidates.push(Candidate {
                            kind: *kind,
                            start: m.start(),
                            end: m.end(),
                        });
                    }
                }
            } else {
                for m in regex.find_iter(text) {
                    if m.is_empty() {
                        continue;
                    }
                    candidates.push(Candidate {
                        kind: *kind,
                        start: m.start(),
                        end: m.end(),
                    });
                }
            }
        }
        candidates
    }
}

#[async_trait]
impl Detector for PatternDetector {
    fn id(&self) -> &str {
        PATTERN_DETECTOR_ID
    }

    fn label(&self) -> &str {
        "PII Pattern Detector"
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::Pattern
    }

    async fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Match>, DetectionError> {
        let region = input.context.region();
        let matches = self.scan(input.text, region.as_deref());
        if !matches.is_empty() {
            debug!(
                surface = %input.context.surface_id,
                field = input.context.field_index,
                count = matches.len(),
                "Pattern matches found"
            );
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Vec<Match> {
        PatternDetector::default().scan(text, Some("US"))
    }

    #[test]
    fn test_detects_email() {
        let matches = scan("Contact me at john@example.com please");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, EntityType::Email);
        assert_eq!(matches[0].value, "john@example.com");
        assert_eq!(matches[0].start, 14);
        assert_eq!(matches[0].end, 30);
    }

    #[test]
    fn test_detects_ssn() {
        let matches = scan("My SSN is 123-45-6789");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, EntityType::SocialSecurityNumber);
        assert_eq!(matches[0].value, "123-45-6789");
    }

    #[test]
    fn test_detects_phone() {
        let matches = scan("Call me at 650-253-0000");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, EntityType::PhoneNumber);
        assert_eq!(matches[0].value, "650-253-0000");
    }

    #[test]
    fn test_detects_credit_card_passing_luhn() {
        let text = "4111 1111 1111 1111";
        let matches = scan(text);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, EntityType::CreditCardNumber);
        assert_eq!(matches[0].start, 0);
        assert_eq!(matches[0].end, text.len());
    }

    #[test]
    fn test_rejects_credit_card_failing_luhn() {
        assert!(scan("4111 1111 1111 1112").is_empty());
    }

    #[test]
    fn test_rejects_dates_as_phones() {
        assert!(scan("Meeting on 2024-01-15 at noon").is_empty());
        assert!(scan("Build 20240115 shipped").is_empty());
    }

    #[test]
    fn test_luhn() {
        assert!(is_valid_luhn("4111111111111111"));
        assert!(is_valid_luhn("5500 0000 0000 0004"));
        assert!(!is_valid_luhn("1234567890123456"));
        assert!(!is_valid_luhn("123"));
    }

    #[test]
    fn test_results_sorted_and_disjoint() {
        let matches = scan("SSN 123-45-6789, mail a@b.io, card 4111-1111-1111-1111");
        assert_eq!(matches.len(), 3);
        for pair in matches.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn test_disabled_pattern_is_skipped() {
        let detector = PatternDetector::new(PatternConfig {
            email_enabled: false,
            ..Default::default()
        });
        assert!(detector.scan("john@example.com", None).is_empty());
    }

    #[test]
    fn test_no_pii() {
        assert!(scan("Hello, how are you today?").is_empty());
    }
}
