//! Exact-literal detection against rules the user maintains.

use super::{find_all, DetectionInput, DetectionSource, Detector, EntityType, Match, USER_RULE_PRIORITY};
use crate::error::DetectionError;
use async_trait::async_trait;
use tokio::sync::RwLock;

pub const USER_RULE_DETECTOR_ID: &str = "user-rule-detector";

/// Detector for user-defined literals.
///
/// Rules are case-sensitive, kept in insertion order and deduplicated.
#[derive(Debug, Default)]
pub struct UserRuleDetector {
    rules: RwLock<Vec<String>>,
}

impl UserRuleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Empty and duplicate literals are ignored.
    pub async fn add_rule(&self, rule: impl Into<String>) -> bool {
        let rule = rule.into();
        if rule.is_empty() {
            return false;
        }
        let mut rules = self.rules.write().await;
        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    pub async fn remove_rule(&self, rule: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r != rule);
        rules.len() != before
    }

    pub async fn list_rules(&self) -> Vec<String> {
        self.rules.read().await.clone()
    }

    pub async fn clear_rules(&self) {
        self.rules.write().await.clear();
    }

    /// Every occurrence of every rule in `text`
    pub async fn scan(&self, text: &str) -> Vec<Match> {
        if text.is_empty() {
            return Vec::new();
        }

        let rules = self.rules.read().await;
        let mut matches = Vec::new();
        for rule in rules.iter() {
            for (start, end) in find_all(text, rule) {
                matches.push(Match {
                    detector_id: USER_RULE_DETECTOR_ID.to_string(),
                    source: DetectionSource::User,
                    entity_type: EntityType::UserDefinedPii,
                    value: rule.clone(),
                    start,
                    end,
                    priority: USER_RULE_PRIORITY,
                    reason: Some("Matched user-defined rule.".to_string()),
                });
            }
        }
        matches
    }
}

#[async_trait]
impl Detector for UserRuleDetector {
    fn id(&self) -> &str {
        USER_RULE_DETECTOR_ID
    }

    fn label(&self) -> &str {
        "User-Defined Rule Detector"
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::User
    }

    async fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Match>, DetectionError> {
        Ok(self.scan(input.text).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_are_deduplicated() {
        let detector = UserRuleDetector::new();
        assert!(detector.add_rule("1234").await);
        assert!(!detector.add_rule("1234").await);
        assert!(!detector.add_rule("").await);
        assert!(detector.add_rule("abcd").await);
        assert_eq!(detector.list_rules().await, vec!["1234", "abcd"]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let detector = UserRuleDetector::new();
        detector.add_rule("one").await;
        detector.add_rule("two").await;
        assert!(detector.remove_rule("one").await);
        assert!(!detector.remove_rule("one").await);
        assert_eq!(detector.list_rules().await, vec!["two"]);
        detector.clear_rules().await;
        assert!(detector.list_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_finds_every_occurrence() {
        let detector = UserRuleDetector::new();
        detector.add_rule("1234").await;
        let matches = detector.scan("1234 and 1234").await;
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].start, matches[0].end), (0, 4));
        assert_eq!((matches[1].start, matches[1].end), (9, 13));
        assert!(matches
            .iter()
            .all(|m| m.entity_type == EntityType::UserDefinedPii && m.priority == USER_RULE_PRIORITY));
    }

    #[tokio::test]
    async fn test_case_sensitive() {
        let detector = UserRuleDetector::new();
        detector.add_rule("Secret").await;
        assert!(detector.scan("a secret").await.is_empty());
    }
}
