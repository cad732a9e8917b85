//! Per-surface detection engine.
//!
//! One engine is owned by each watched surface. It runs the detectors,
//! remembers literals found by manual semantic runs, honors the user's ignore
//! list and resolves overlapping spans into one ordered, disjoint set.

use crate::detection::pattern::{PatternDetector, PATTERN_DETECTOR_ID};
use crate::detection::{
    find_all, normalize_text, DetectionContext, DetectionInput, DetectionSource, Detector,
    EntityType, Match, NormalizedText, SemanticDetector, SemanticTransport, Trigger,
    UserRuleDetector,
};
use crate::masking::{self, MaskOutcome, MaskedText};
use crate::projection::{FragmentMapping, StructuredSource};
use crate::GuardConfig;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Metadata remembered for a literal value
#[derive(Debug, Clone, PartialEq, Eq)]
struct LiteralEntry {
    detector_id: String,
    source: DetectionSource,
    entity_type: EntityType,
    priority: i32,
    reason: Option<String>,
}

impl From<&Match> for LiteralEntry {
    fn from(m: &Match) -> Self {
        Self {
            detector_id: m.detector_id.clone(),
            source: m.source,
            entity_type: m.entity_type,
            priority: m.priority,
            reason: m.reason.clone(),
        }
    }
}

/// Insertion-ordered literal dictionary; a higher priority replaces an entry
/// in place, ties keep the first one
#[derive(Debug, Default, Clone)]
struct LiteralTable {
    entries: IndexMap<String, LiteralEntry>,
}

impl LiteralTable {
    fn merge(&mut self, value: &str, entry: LiteralEntry) {
        match self.entries.get_mut(value) {
            Some(existing) => {
                if entry.priority > existing.priority {
                    *existing = entry;
                }
            }
            None => {
                self.entries.insert(value.to_string(), entry);
            }
        }
    }
}

/// Literals from manual semantic runs, re-applied to later automatic runs.
///
/// Bounded; the oldest literal is evicted first.
#[derive(Debug, Default)]
struct SemanticCache {
    literals: LiteralTable,
    limit: usize,
}

impl SemanticCache {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    fn insert(&mut self, value: &str, entry: LiteralEntry) {
        self.literals.merge(value, entry);
        self.enforce_limit();
    }

    fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        if self.limit == 0 {
            return;
        }
        while self.literals.entries.len() > self.limit {
            self.literals.entries.shift_remove_index(0);
        }
    }

    fn snapshot(&self) -> LiteralTable {
        self.literals.clone()
    }

    fn len(&self) -> usize {
        self.literals.entries.len()
    }

    fn clear(&mut self) {
        self.literals.entries.clear();
    }
}

/// Clears the running flag when a run ends, including on cancellation
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Greedy overlap resolution.
///
/// Higher priority claims territory first, ties in discovery order. The
/// result is disjoint and sorted by start offset.
pub fn resolve_overlaps(mut matches: Vec<Match>) -> Vec<Match> {
    matches.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut accepted: Vec<Match> = Vec::with_capacity(matches.len());
    for candidate in matches {
        if !accepted.iter().any(|a| a.overlaps(&candidate)) {
            accepted.push(candidate);
        }
    }

    accepted.sort_by_key(|m| m.start);
    accepted
}

/// Move spans from the normalized text back onto the caller's text.
///
/// Widening inside a rewritten character can make neighbours touch; a span
/// that would then overlap the previous one is dropped.
fn restore_offsets(normalized: &NormalizedText, matches: Vec<Match>) -> Vec<Match> {
    if normalized.is_unchanged() {
        return matches;
    }

    let mut restored: Vec<Match> = Vec::with_capacity(matches.len());
    for mut m in matches {
        let (start, end) = normalized.to_original(m.start, m.end);
        m.start = start;
        m.end = end;
        if m.is_empty() || restored.last().is_some_and(|prev| prev.overlaps(&m)) {
            continue;
        }
        restored.push(m);
    }
    restored
}

/// Detection engine for a single editable surface
pub struct DetectionEngine {
    config: RwLock<GuardConfig>,
    detectors: RwLock<Vec<Arc<dyn Detector>>>,
    user_rules: Arc<UserRuleDetector>,
    ignored: RwLock<BTreeSet<String>>,
    semantic_cache: RwLock<SemanticCache>,
    is_running: AtomicBool,
}

impl DetectionEngine {
    /// Create an engine with the pattern and user rule detectors
    pub fn new(config: GuardConfig) -> Self {
        Self::build(config, None)
    }

    /// Create an engine that also consults a semantic analysis service on
    /// manual runs
    pub fn with_semantic(config: GuardConfig, transport: Arc<dyn SemanticTransport>) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: GuardConfig, transport: Option<Arc<dyn SemanticTransport>>) -> Self {
        let user_rules = Arc::new(UserRuleDetector::new());
        let mut detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(PatternDetector::new(config.pattern.clone())) as Arc<dyn Detector>,
            Arc::clone(&user_rules) as Arc<dyn Detector>,
        ];
        if let Some(transport) = transport {
            detectors.push(Arc::new(SemanticDetector::new(transport)));
        }

        Self {
            semantic_cache: RwLock::new(SemanticCache::new(config.semantic_cache_limit)),
            config: RwLock::new(config),
            detectors: RwLock::new(detectors),
            user_rules,
            ignored: RwLock::new(BTreeSet::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Append a detector; it runs after the built-in ones
    pub async fn add_detector(&self, detector: Arc<dyn Detector>) {
        self.detectors.write().await.push(detector);
    }

    pub async fn detector_ids(&self) -> Vec<String> {
        self.detectors
            .read()
            .await
            .iter()
            .map(|d| d.id().to_string())
            .collect()
    }

    /// Reconfigure the engine with new settings
    ///
    /// Rebuilds the pattern detector and applies the new semantic cache bound.
    /// Rules, ignored values and cached literals are kept.
    pub async fn reconfigure(&self, config: GuardConfig) {
        info!("Reconfiguring detection engine");

        {
            let mut detectors = self.detectors.write().await;
            let pattern: Arc<dyn Detector> = Arc::new(PatternDetector::new(config.pattern.clone()));
            match detectors.iter().position(|d| d.id() == PATTERN_DETECTOR_ID) {
                Some(i) => detectors[i] = pattern,
                None => detectors.insert(0, pattern),
            }
        }

        self.semantic_cache
            .write()
            .await
            .set_limit(config.semantic_cache_limit);

        *self.config.write().await = config;
        debug!("Detection engine reconfigured");
    }

    pub async fn config(&self) -> GuardConfig {
        self.config.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Scan `text` and return the final, disjoint, start-ordered span set.
    ///
    /// Detectors see [`normalize_text`]`(text)`; returned offsets refer to
    /// `text` itself, while `value` stays the normalized literal. A call made
    /// while another run is in flight returns an empty result immediately.
    pub async fn run(&self, text: &str, context: &DetectionContext, trigger: Trigger) -> Vec<Match> {
        let Some(_guard) = RunGuard::acquire(&self.is_running) else {
            debug!(surface = %context.surface_id, "Detection already running, skipping");
            return Vec::new();
        };

        let normalized = NormalizedText::new(text);
        let text = normalized.text.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let context = match (&context.locale, &self.config.read().await.locale) {
            (None, Some(default)) => context.clone().with_locale(default.clone()),
            _ => context.clone(),
        };

        let mut literals = self.semantic_cache.read().await.snapshot();
        let detectors = self.detectors.read().await.clone();
        let input = DetectionInput {
            text,
            context: &context,
            trigger,
        };

        for detector in &detectors {
            let found = match detector.detect(&input).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        detector = detector.id(),
                        surface = %context.surface_id,
                        error = %e,
                        "Detector failed"
                    );
                    continue;
                }
            };

            debug!(
                detector = detector.id(),
                surface = %context.surface_id,
                count = found.len(),
                "Detector finished"
            );

            if detector.source() == DetectionSource::Semantic && !found.is_empty() {
                let mut cache = self.semantic_cache.write().await;
                for m in &found {
                    cache.insert(&m.value, LiteralEntry::from(m));
                }
            }

            for m in &found {
                literals.merge(&m.value, LiteralEntry::from(m));
            }
        }

        let ignored = self.ignored.read().await;
        let mut materialized = Vec::new();
        for (value, entry) in &literals.entries {
            if ignored.contains(value) {
                continue;
            }
            for (start, end) in find_all(text, value) {
                materialized.push(Match {
                    detector_id: entry.detector_id.clone(),
                    source: entry.source,
                    entity_type: entry.entity_type,
                    value: value.clone(),
                    start,
                    end,
                    priority: entry.priority,
                    reason: entry.reason.clone(),
                });
            }
        }
        drop(ignored);

        let resolved = restore_offsets(&normalized, resolve_overlaps(materialized));
        debug!(
            surface = %context.surface_id,
            field = context.field_index,
            ?trigger,
            count = resolved.len(),
            "Detection run complete"
        );
        resolved
    }

    /// Stop flagging `value` in every later run.
    ///
    /// Values are compared in normalized form, so a literal copied out of the
    /// caller's text matches the `value` the engine reported for it.
    pub async fn ignore(&self, value: impl Into<String>) -> bool {
        let value = normalize_text(&value.into());
        if value.is_empty() {
            return false;
        }
        self.ignored.write().await.insert(value)
    }

    pub async fn unignore(&self, value: &str) -> bool {
        self.ignored.write().await.remove(&normalize_text(value))
    }

    pub async fn list_ignored(&self) -> Vec<String> {
        self.ignored.read().await.iter().cloned().collect()
    }

    pub async fn clear_ignored(&self) {
        self.ignored.write().await.clear();
    }

    /// Add a user rule; stored normalized since rules run on normalized text
    pub async fn add_rule(&self, rule: impl Into<String>) -> bool {
        self.user_rules.add_rule(normalize_text(&rule.into())).await
    }

    pub async fn remove_rule(&self, rule: &str) -> bool {
        self.user_rules.remove_rule(&normalize_text(rule)).await
    }

    pub async fn list_rules(&self) -> Vec<String> {
        self.user_rules.list_rules().await
    }

    pub async fn clear_rules(&self) {
        self.user_rules.clear_rules().await
    }

    pub async fn clear_semantic_cache(&self) {
        self.semantic_cache.write().await.clear();
    }

    pub async fn semantic_cache_len(&self) -> usize {
        self.semantic_cache.read().await.len()
    }

    /// Mask flat text with the configured mask character
    pub async fn mask_text(&self, text: &str, matches: &[Match]) -> MaskedText {
        let mask_char = self.config.read().await.mask_char;
        masking::mask_text(text, matches, mask_char)
    }

    /// Mask a structured source in place with the configured mask character
    pub async fn mask_structured<S: StructuredSource + ?Sized>(
        &self,
        source: &mut S,
        matches: &[Match],
        mappings: &[FragmentMapping],
    ) -> MaskOutcome {
        let mask_char = self.config.read().await.mask_char;
        masking::mask_structured(source, matches, mappings, mask_char)
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
