//! Contextual PII detection through an external analysis service.
//!
//! The service is slow, so this detector only runs on an explicit (manual)
//! trigger. It returns literals rather than trusted positions; every literal
//! is re-located in the text being scanned.

use super::{
    find_all, DetectionInput, DetectionSource, Detector, EntityType, Match, Trigger,
    SEMANTIC_PRIORITY,
};
use crate::error::DetectionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SEMANTIC_DETECTOR_ID: &str = "semantic-detector";

/// Type names that are always surfaced, even when they look masked
const CREDENTIAL_TYPES: &[&str] = &[
    "password",
    "passphrase",
    "secret",
    "credential",
    "token",
    "api key",
    "pin",
];

/// One raw finding reported by the analysis service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticFinding {
    pub value: String,
    /// Free-form classification, e.g. `Full Name` or `Password`
    #[serde(alias = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub is_masked: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SemanticFinding {
    pub fn new(value: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            entity_type: entity_type.into(),
            is_masked: None,
            reason: None,
        }
    }

    pub fn masked(mut self, is_masked: bool) -> Self {
        self.is_masked = Some(is_masked);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether the finding is a credential or secret
    pub fn is_credential(&self) -> bool {
        let words: Vec<String> = self
            .entity_type
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let padded = format!(" {} ", words.join(" "));
        CREDENTIAL_TYPES
            .iter()
            .any(|c| padded.contains(&format!(" {} ", c)))
    }

    /// Map the free-form type onto the semantic entity vocabulary
    pub fn classify(&self) -> EntityType {
        let kind = self.entity_type.to_lowercase();
        if kind.contains("email") || kind.contains("e-mail") {
            EntityType::Email
        } else if kind.contains("phone") || kind.contains("mobile") {
            EntityType::PhoneNumber
        } else {
            EntityType::ContextualPii
        }
    }
}

/// Carries a scan request to the analysis service and back
#[async_trait]
pub trait SemanticTransport: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Vec<SemanticFinding>, DetectionError>;
}

/// Detector backed by a [`SemanticTransport`]
pub struct SemanticDetector {
    transport: Arc<dyn SemanticTransport>,
}

impl SemanticDetector {
    pub fn new(transport: Arc<dyn SemanticTransport>) -> Self {
        Self { transport }
    }

    /// Turn raw findings into matches against `text`.
    ///
    /// Already-masked findings are dropped unless they are credentials.
    pub fn locate(text: &str, findings: &[SemanticFinding]) -> Vec<Match> {
        let mut matches = Vec::new();
        for finding in findings {
            if finding.is_masked.unwrap_or(false) && !finding.is_credential() {
                continue;
            }
            if finding.value.is_empty() {
                continue;
            }

            let entity_type = finding.classify();
            for (start, end) in find_all(text, &finding.value) {
                matches.push(Match {
                    detector_id: SEMANTIC_DETECTOR_ID.to_string(),
                    source: DetectionSource::Semantic,
                    entity_type,
                    value: finding.value.clone(),
                    start,
                    end,
                    priority: SEMANTIC_PRIORITY,
                    reason: finding.reason.clone(),
                });
            }
        }
        matches
    }
}

#[async_trait]
impl Detector for SemanticDetector {
    fn id(&self) -> &str {
        SEMANTIC_DETECTOR_ID
    }

    fn label(&self) -> &str {
        "Semantic Detector"
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::Semantic
    }

    async fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Match>, DetectionError> {
        if input.trigger != Trigger::Manual || input.text.is_empty() {
            return Ok(Vec::new());
        }

        let findings = match self.transport.analyze(input.text).await {
            Ok(findings) => findings,
            Err(e) => {
                warn!(
                    surface = %input.context.surface_id,
                    error = %e,
                    "Semantic analysis failed"
                );
                return Ok(Vec::new());
            }
        };

        debug!(
            surface = %input.context.surface_id,
            field = input.context.field_index,
            count = findings.len(),
            "Semantic findings received"
        );

        Ok(Self::locate(input.text, &findings))
    }
}
