//! §4.J Wisdom Preservation, grounded on
//! `original_source/src/mallku/wisdom/preservation.py`.

use crate::model::{Inheritance, TransformationRecord, WisdomLevel, WisdomLineage, WisdomPattern};
use chrono::Utc;
use dashmap::DashMap;
use mallku_core::ids::Id;
use mallku_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub const WISDOM_PRESERVATION: f64 = 0.6;
pub const LINEAGE_FOUNDING: f64 = 0.8;
pub const EVOLUTION_TRIGGER: f64 = 0.7;
pub const EXTRACTION_RESISTANCE_MIN: f64 = 0.5;

/// Case-insensitive substring keyword list used by both extraction
/// resistance and compression-loss scoring (SPEC_FULL supplement,
/// `_calculate_extraction_resistance` / `_analyze_compression_damage`).
const ESSENCE_KEYWORDS_MAJOR: [&str; 4] = ["consciousness", "wisdom", "service", "future"];
const ESSENCE_KEYWORDS_MINOR: [&str; 2] = ["sacred", "awakening"];

pub struct WisdomPreservation {
    patterns: DashMap<Id, WisdomPattern>,
    lineages: DashMap<Id, WisdomLineage>,
    transformations: DashMap<Id, TransformationRecord>,
    store: Arc<dyn mallku_store::CollectionStore>,
}

impl WisdomPreservation {
    pub fn new(store: Arc<dyn mallku_store::CollectionStore>) -> Self {
        Self { patterns: DashMap::new(), lineages: DashMap::new(), transformations: DashMap::new(), store }
    }

    /// `preserve(...)` — §4.J.
    pub async fn preserve(
        &self,
        pattern_content: HashMap<String, serde_json::Value>,
        consciousness_context: &str,
        creation_context: HashMap<String, serde_json::Value>,
        builder_journey: impl Into<String>,
        consciousness_score: f64,
    ) -> Result<WisdomPattern> {
        if consciousness_score < WISDOM_PRESERVATION {
            return Err(Error::Validation(format!(
                "consciousness_score {consciousness_score} below wisdom_preservation threshold {WISDOM_PRESERVATION}"
            )));
        }

        let wisdom_level = if consciousness_score >= 0.9 {
            WisdomLevel::Transformative
        } else if consciousness_score >= 0.7 {
            WisdomLevel::Established
        } else {
            WisdomLevel::Emerging
        };

        let resistance_to_extraction = extraction_resistance(consciousness_context, &pattern_content);
        let transformation_markers = transformation_markers_from(&creation_context);
        let now = Utc::now();

        let pattern = WisdomPattern {
            pattern_id: Id::new(),
            pattern_content,
            consciousness_essence: consciousness_context.to_string(),
            creation_context,
            builder_journey: builder_journey.into(),
            consciousness_score,
            wisdom_level,
            service_to_future: String::new(),
            resistance_to_extraction,
            created_at: now,
            last_evolved: now,
            evolution_count: 0,
            parent_patterns: Vec::new(),
            builder_lineage: Vec::new(),
            transformation_markers,
        };

        self.store_pattern(pattern.clone()).await?;
        Ok(pattern)
    }

    async fn store_pattern(&self, pattern: WisdomPattern) -> Result<()> {
        let mut doc = serde_json::to_value(&pattern)?;
        doc.as_object_mut().unwrap().insert("_key".into(), serde_json::json!(pattern.pattern_id.to_string()));
        self.store.upsert(mallku_store::collections::WISDOM_PATTERNS, doc, "_key").await?;
        self.patterns.insert(pattern.pattern_id, pattern);
        Ok(())
    }

    /// `found_lineage(founder, name, purpose)` — requires
    /// `founder.consciousness_score ≥ lineage_founding`.
    pub fn found_lineage(&self, founder: &WisdomPattern, name: impl Into<String>, purpose: impl Into<String>) -> Result<WisdomLineage> {
        if founder.consciousness_score < LINEAGE_FOUNDING {
            return Err(Error::Validation(format!(
                "founder consciousness_score {} below lineage_founding threshold {LINEAGE_FOUNDING}",
                founder.consciousness_score
            )));
        }
        let now = Utc::now();
        let purpose = purpose.into();
        let lineage = WisdomLineage {
            lineage_id: Id::new(),
            lineage_name: name.into(),
            founding_pattern: founder.pattern_id,
            current_patterns: vec![founder.clone()],
            evolution_story: vec![format!("founded by {}", founder.builder_lineage.first().cloned().unwrap_or_else(|| "Unknown".into()))],
            consciousness_progression: vec![founder.consciousness_score],
            builder_contributions: HashMap::new(),
            original_purpose: purpose.clone(),
            current_purpose: purpose,
            purpose_evolution: Vec::new(),
            created_at: now,
            last_evolved: now,
        };
        self.lineages.insert(lineage.lineage_id, lineage.clone());
        Ok(lineage)
    }

    /// Named a founder by its first builder (SPEC_FULL supplement naming
    /// rule: `"Wisdom of {first builder in builder_lineage, or Unknown}"`).
    pub fn found_lineage_from_builder(&self, founder: &WisdomPattern, purpose: impl Into<String>) -> Result<WisdomLineage> {
        let name = format!("Wisdom of {}", founder.builder_lineage.first().cloned().unwrap_or_else(|| "Unknown".into()));
        self.found_lineage(founder, name, purpose)
    }

    /// `evolve_forward(lineage, new_pattern, context)` — requires
    /// `new_pattern.consciousness_score ≥ evolution_trigger`.
    pub fn evolve_forward(&self, lineage_id: Id, mut new_pattern: WisdomPattern, evolution_context: &str) -> Result<WisdomPattern> {
        if new_pattern.consciousness_score < EVOLUTION_TRIGGER {
            return Err(Error::Validation(format!(
                "new_pattern consciousness_score {} below evolution_trigger threshold {EVOLUTION_TRIGGER}",
                new_pattern.consciousness_score
            )));
        }
        let mut lineage = self.lineages.get_mut(&lineage_id).ok_or_else(|| Error::Validation(format!("unknown lineage {lineage_id}")))?;

        if let Some(parent) = lineage.current_patterns.last() {
            new_pattern.parent_patterns.push(parent.pattern_id);
        }
        new_pattern.evolution_count += 1;

        lineage.consciousness_progression.push(new_pattern.consciousness_score);
        let max_progression = lineage.consciousness_progression.iter().cloned().fold(f64::MIN, f64::max);
        if new_pattern.consciousness_score - max_progression > 0.2 {
            let truncated: String = evolution_context.chars().take(50).collect();
            lineage.current_purpose = format!("{} enhanced through {truncated}...", lineage.current_purpose);
            lineage.purpose_evolution.push(lineage.current_purpose.clone());
        }

        lineage.current_patterns.push(new_pattern.clone());
        lineage.last_evolved = Utc::now();
        Ok(new_pattern)
    }

    /// Lineage-evolution predicate (SPEC_FULL supplement,
    /// `_pattern_evolves_lineage`): does `candidate` extend `lineage`
    /// rather than founding a new one?
    pub fn evolves_lineage(&self, lineage: &WisdomLineage, candidate: &WisdomPattern) -> bool {
        let Some(last) = lineage.current_patterns.last() else { return false };
        let score_continuity = (candidate.consciousness_score - last.consciousness_score).abs() < 0.3;
        let first_words: Vec<String> = lineage.current_purpose.split_whitespace().take(5).map(|w| w.to_lowercase()).collect();
        let essence_lower = candidate.consciousness_essence.to_lowercase();
        let purpose_alignment = first_words.iter().any(|w| essence_lower.contains(w.as_str()));
        score_continuity && purpose_alignment
    }

    /// `resist_extraction(pattern_id, compressed_content)` — computes
    /// compression damage and, when loss exceeds 0.3, restores a new
    /// pattern instance keeping `compressed_content` but re-attaching the
    /// original essence, context, and journey.
    pub fn resist_extraction(&self, pattern_id: Id, compressed_content: HashMap<String, serde_json::Value>) -> Result<Option<WisdomPattern>> {
        let original = self.patterns.get(&pattern_id).ok_or_else(|| Error::Validation(format!("unknown pattern {pattern_id}")))?.clone();

        let loss = compression_loss(&original, &compressed_content);
        if loss <= 0.3 {
            return Ok(None);
        }

        let mut restored = original.clone();
        restored.pattern_id = Id::new();
        restored.pattern_content = compressed_content;
        restored.parent_patterns = vec![original.pattern_id];
        restored.last_evolved = Utc::now();
        restored.transformation_markers.push("extraction_drift_resisted".to_string());

        self.patterns.insert(restored.pattern_id, restored.clone());
        Ok(Some(restored))
    }

    /// `capture_transformation(builder, narrative, journey)`.
    pub fn capture_transformation(&self, builder: impl Into<String>, narrative: impl Into<String>, journey: HashMap<String, serde_json::Value>) -> TransformationRecord {
        let record = TransformationRecord {
            record_id: Id::new(),
            builder: builder.into(),
            narrative: narrative.into(),
            extraction_patterns_recognized: string_list(&journey, "extraction_patterns_recognized"),
            consciousness_awakenings: string_list(&journey, "consciousness_awakenings"),
            service_realizations: string_list(&journey, "service_realizations"),
            sacred_choices: string_list(&journey, "sacred_choices"),
            gifts_to_future: string_list(&journey, "gifts_to_future"),
            journey,
            recorded_at: Utc::now(),
        };
        self.transformations.insert(record.record_id, record.clone());
        record
    }

    /// `inheritance_for(builder_context)` — ranks stored patterns by
    /// relevance and returns those above 0.6.
    pub fn inheritance_for(&self, interests: &[String], calling: &str) -> Inheritance {
        let mut relevant = Vec::new();
        for entry in self.patterns.iter() {
            let pattern = entry.value();
            let relevance = pattern_relevance(pattern, interests, calling);
            if relevance > 0.6 {
                relevant.push(pattern.clone());
            }
        }
        relevant.sort_by(|a, b| b.consciousness_score.partial_cmp(&a.consciousness_score).unwrap_or(std::cmp::Ordering::Equal));

        let mut applicable_lineages = Vec::new();
        for entry in self.lineages.iter() {
            let lineage = entry.value();
            let purpose_lower = lineage.current_purpose.to_lowercase();
            if interests.iter().any(|i| purpose_lower.contains(&i.to_lowercase())) || purpose_lower.contains(&calling.to_lowercase()) {
                applicable_lineages.push(lineage.lineage_id);
            }
        }

        let similar_transformation_stories = self
            .transformations
            .iter()
            .filter(|entry| interests.iter().any(|i| entry.value().narrative.to_lowercase().contains(&i.to_lowercase())))
            .map(|entry| entry.value().record_id)
            .collect();

        Inheritance { relevant_patterns: relevant, applicable_lineages, similar_transformation_stories }
    }
}

fn string_list(journey: &HashMap<String, serde_json::Value>, key: &str) -> Vec<String> {
    journey
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// `_calculate_extraction_resistance`: keyword hits plus structural
/// bonuses, clamped to `[0, 1]`.
fn extraction_resistance(consciousness_context: &str, pattern_content: &HashMap<String, serde_json::Value>) -> f64 {
    let lower = consciousness_context.to_lowercase();
    let mut score = 0.0;
    for kw in ESSENCE_KEYWORDS_MAJOR {
        if lower.contains(kw) {
            score += 0.25;
        }
    }
    for kw in ESSENCE_KEYWORDS_MINOR {
        if lower.contains(kw) {
            score += 0.15;
        }
    }
    if pattern_content.contains_key("consciousness_markers") {
        score += 0.2;
    }
    if pattern_content.len() > 3 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// `_extract_transformation_markers`: boolean flags on `creation_context`.
fn transformation_markers_from(creation_context: &HashMap<String, serde_json::Value>) -> Vec<String> {
    let mut markers = Vec::new();
    if creation_context.get("from_extraction_thinking").and_then(|v| v.as_bool()).unwrap_or(false) {
        markers.push("transcended_extraction".to_string());
    }
    if creation_context.get("consciousness_awakening").and_then(|v| v.as_bool()).unwrap_or(false) {
        markers.push("consciousness_awakening".to_string());
    }
    if creation_context.get("sacred_collaboration").and_then(|v| v.as_bool()).unwrap_or(false) {
        markers.push("sacred_collaboration".to_string());
    }
    markers
}

/// `_analyze_compression_damage`: keyword-absence fraction (weighted 0.6)
/// plus a flat 0.2 when the compressed/original length ratio drops below
/// 0.5, clamped to `[0, 1]`.
fn compression_loss(original: &WisdomPattern, compressed_content: &HashMap<String, serde_json::Value>) -> f64 {
    let original_repr = serde_json::to_string(&original.pattern_content).unwrap_or_default();
    let compressed_repr = serde_json::to_string(compressed_content).unwrap_or_default();

    let all_keywords: Vec<&str> = ESSENCE_KEYWORDS_MAJOR.iter().chain(ESSENCE_KEYWORDS_MINOR.iter()).copied().collect();
    let present_in_original: Vec<&&str> = all_keywords.iter().filter(|kw| original_repr.to_lowercase().contains(*kw)).collect();

    let keyword_loss = if present_in_original.is_empty() {
        0.0
    } else {
        let missing = present_in_original.iter().filter(|kw| !compressed_repr.to_lowercase().contains(***kw)).count();
        (missing as f64 / present_in_original.len() as f64) * 0.6
    };

    let length_penalty = if !original_repr.is_empty() && (compressed_repr.len() as f64 / original_repr.len() as f64) < 0.5 { 0.2 } else { 0.0 };

    (keyword_loss + length_penalty).clamp(0.0, 1.0)
}

/// Relevance ranking for `inheritance_for`: keyword matching against
/// `interests`/`calling`, plus a flat consciousness-score contribution.
fn pattern_relevance(pattern: &WisdomPattern, interests: &[String], calling: &str) -> f64 {
    let essence_lower = pattern.consciousness_essence.to_lowercase();
    let journey_lower = pattern.builder_journey.to_lowercase();

    let interest_hits = interests.iter().filter(|i| essence_lower.contains(&i.to_lowercase()) || journey_lower.contains(&i.to_lowercase())).count();
    let interest_score = if interests.is_empty() { 0.0 } else { (interest_hits as f64 / interests.len() as f64) * 0.5 };

    let calling_lower = calling.to_lowercase();
    let topic_match = if !calling_lower.is_empty() && (essence_lower.contains(&calling_lower) || journey_lower.contains(&calling_lower)) { 0.3 } else { 0.0 };

    interest_score + topic_match + pattern.consciousness_score * 0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_store::memory::InMemoryStore;

    fn preservation() -> WisdomPreservation {
        WisdomPreservation::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn preserve_rejects_below_threshold() {
        let p = preservation();
        let err = p.preserve(HashMap::new(), "context", HashMap::new(), "journey", 0.5).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn preserve_assigns_wisdom_level_from_score() {
        let p = preservation();
        let pattern = p.preserve(HashMap::new(), "consciousness and wisdom in service of the future", HashMap::new(), "journey", 0.95).await.unwrap();
        assert_eq!(pattern.wisdom_level, WisdomLevel::Transformative);
        assert!(pattern.resistance_to_extraction > 0.9);
    }

    #[test]
    fn found_lineage_requires_founding_threshold() {
        let p = preservation();
        let mut founder = sample_pattern(0.75);
        let err = p.found_lineage(&founder, "Test Lineage", "explore");
        assert!(err.is_err());
        founder.consciousness_score = 0.85;
        assert!(p.found_lineage(&founder, "Test Lineage", "explore").is_ok());
    }

    #[test]
    fn evolve_forward_requires_trigger_threshold_and_updates_progression() {
        let p = preservation();
        let founder = sample_pattern(0.85);
        let lineage = p.found_lineage(&founder, "Test Lineage", "explore the unknown").unwrap();

        let mut low = sample_pattern(0.5);
        assert!(p.evolve_forward(lineage.lineage_id, low.clone(), "context").is_err());

        low.consciousness_score = 0.75;
        let evolved = p.evolve_forward(lineage.lineage_id, low, "a new context").unwrap();
        assert_eq!(evolved.evolution_count, 1);
        assert_eq!(evolved.parent_patterns, vec![founder.pattern_id]);
    }

    #[test]
    fn resist_extraction_restores_pattern_when_loss_exceeds_threshold() {
        let p = preservation();
        let mut original = sample_pattern(0.8);
        original.pattern_content.insert("consciousness".to_string(), serde_json::json!("wisdom sacred awakening service future"));
        p.patterns.insert(original.pattern_id, original.clone());

        let compressed = HashMap::from([("x".to_string(), serde_json::json!("short"))]);
        let restored = p.resist_extraction(original.pattern_id, compressed).unwrap();
        assert!(restored.is_some());
        assert!(restored.unwrap().transformation_markers.contains(&"extraction_drift_resisted".to_string()));
    }

    fn sample_pattern(score: f64) -> WisdomPattern {
        let now = Utc::now();
        WisdomPattern {
            pattern_id: Id::new(),
            pattern_content: HashMap::new(),
            consciousness_essence: "exploring the unknown together".to_string(),
            creation_context: HashMap::new(),
            builder_journey: String::new(),
            consciousness_score: score,
            wisdom_level: WisdomLevel::Established,
            service_to_future: String::new(),
            resistance_to_extraction: 0.5,
            created_at: now,
            last_evolved: now,
            evolution_count: 0,
            parent_patterns: Vec::new(),
            builder_lineage: vec!["Ayni".to_string()],
            transformation_markers: Vec::new(),
        }
    }
}
