//! Prompt-side adapter for the semantic analysis service.
//!
//! The analysis itself runs in an out-of-process language model. This module
//! builds the prompt, constrains the reply with a JSON schema, validates the
//! reply and turns it into [`SemanticFinding`]s, so any model client that can
//! answer a prompt can back a [`SemanticTransport`].

pub mod schema;

use crate::detection::{SemanticFinding, SemanticTransport};
use crate::error::DetectionError;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A language model that answers a prompt with a schema-constrained reply
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn prompt(&self, prompt: &str, schema: &Value) -> Result<String, DetectionError>;
}

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    contains_pii: bool,
    #[serde(default)]
    pii_items: Option<Vec<AnalysisItem>>,
}

#[derive(Debug, Deserialize)]
struct AnalysisItem {
    pii_type: String,
    pii_value: String,
    reason: String,
    is_masked: bool,
}

fn blank_lines_regex() -> &'static Regex {
    static COMPILED: OnceLock<Regex> = OnceLock::new();
    COMPILED.get_or_init(|| Regex::new(r"(?:\r\n|\n){3,}").expect("Invalid blank line regex"))
}

/// Trim and collapse runs of three or more line breaks into one blank line
pub fn prepare_text(text: &str) -> String {
    blank_lines_regex()
        .replace_all(text.trim(), "\n\n")
        .into_owned()
}

/// Build the analysis prompt for `text`
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Role: You are a privacy expert. Your task is to identify PII that is **difficult to detect with simple patterns such as regex**.

Analyze the user's input for PII. For each piece of PII found, provide its type (e.g., "Full Name", "Password"), the exact value, and a brief reason for your decision.

For each item, you must also set a boolean 'is_masked' field. Follow these rules in order:
1. If the 'pii_type' is 'Password', you **must** set 'is_masked' to false.
2. For all other types, set 'is_masked' to true **only if** a significant portion of the value is replaced by masking characters (like '*', 'X', '#'), making it unreadable. (e.g., 'john.doe@*****.com' is masked, but 'User*s' is not).
3. If the above conditions are not met, set 'is_masked' to false.

If you find multiple instances of a valid PII type, return an object for each. Do not summarize.
Respond with a JSON object conforming to the schema.
---
SELECTED TEXT:
"{}""#,
        prepare_text(text)
    )
}

/// Parse and validate a raw model reply
pub fn parse_reply(raw: &str) -> Result<Vec<SemanticFinding>, DetectionError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| DetectionError::InvalidResponse(format!("Invalid JSON: {}", e)))?;

    schema::validate_reply(&value).map_err(DetectionError::Schema)?;

    let reply: AnalysisReply = serde_json::from_value(value)
        .map_err(|e| DetectionError::InvalidResponse(e.to_string()))?;

    if !reply.contains_pii {
        return Ok(Vec::new());
    }

    Ok(reply
        .pii_items
        .unwrap_or_default()
        .into_iter()
        .map(|item| {
            SemanticFinding::new(item.pii_value, item.pii_type)
                .masked(item.is_masked)
                .with_reason(item.reason)
        })
        .collect())
}

/// [`SemanticTransport`] that prompts a [`LanguageModel`]
pub struct PromptTransport<M> {
    model: M,
}

impl<M: LanguageModel> PromptTransport<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: LanguageModel> SemanticTransport for PromptTransport<M> {
    async fn analyze(&self, text: &str) -> Result<Vec<SemanticFinding>, DetectionError> {
        let prompt = build_prompt(text);
        let raw = self.model.prompt(&prompt, schema::analysis_schema()).await?;

        match parse_reply(&raw) {
            Ok(findings) => {
                debug!(count = findings.len(), "Semantic reply parsed");
                Ok(findings)
            }
            Err(e) => {
                warn!(error = %e, "Semantic reply rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedModel(&'static str);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn prompt(&self, prompt: &str, schema: &Value) -> Result<String, DetectionError> {
            assert!(prompt.contains("SELECTED TEXT"));
            assert!(schema.get("properties").is_some());
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_prepare_text() {
        assert_eq!(prepare_text("  a\n\n\n\nb  "), "a\n\nb");
        assert_eq!(prepare_text("a\r\n\r\n\r\nb"), "a\n\nb");
        assert_eq!(prepare_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_prompt_embeds_prepared_text() {
        let prompt = build_prompt("  hello\n\n\n\nworld ");
        assert!(prompt.ends_with("\"hello\n\nworld\""));
    }

    #[test]
    fn test_parse_reply() {
        let findings = parse_reply(
            r#"{"contains_pii": true, "pii_items": [
                {"pii_type": "Full Name", "pii_value": "Jane Doe", "reason": "a person", "is_masked": false}
            ]}"#,
        )
        .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].value, "Jane Doe");
        assert_eq!(findings[0].is_masked, Some(false));
        assert_eq!(findings[0].reason.as_deref(), Some("a person"));
    }

    #[test]
    fn test_parse_reply_without_pii() {
        let findings = parse_reply(r#"{"contains_pii": false, "pii_items": []}"#).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        assert!(matches!(
            parse_reply("not json"),
            Err(DetectionError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"contains_pii": "yes"}"#),
            Err(DetectionError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_prompt_transport_round_trip() {
        let transport = PromptTransport::new(CannedModel(
            r#"{"contains_pii": true, "pii_items": [
                {"pii_type": "Password", "pii_value": "hunter2", "reason": "secret", "is_masked": false}
            ]}"#,
        ));
        let findings = transport.analyze("my password is hunter2").await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_credential());
    }
}
