//! §3 `WisdomPattern`, `WisdomLineage`, and the transformation record
//! `capture_transformation` appends to.

use chrono::{DateTime, Utc};
use mallku_core::ids::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WisdomLevel {
    Emerging,
    Established,
    Transformative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WisdomPattern {
    pub pattern_id: Id,
    pub pattern_content: HashMap<String, serde_json::Value>,
    pub consciousness_essence: String,
    pub creation_context: HashMap<String, serde_json::Value>,
    pub builder_journey: String,
    pub consciousness_score: f64,
    pub wisdom_level: WisdomLevel,
    pub service_to_future: String,
    pub resistance_to_extraction: f64,
    pub created_at: DateTime<Utc>,
    pub last_evolved: DateTime<Utc>,
    #[serde(default)]
    pub evolution_count: u64,
    #[serde(default)]
    pub parent_patterns: Vec<Id>,
    #[serde(default)]
    pub builder_lineage: Vec<String>,
    #[serde(default)]
    pub transformation_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WisdomLineage {
    pub lineage_id: Id,
    pub lineage_name: String,
    pub founding_pattern: Id,
    pub current_patterns: Vec<WisdomPattern>,
    pub evolution_story: Vec<String>,
    pub consciousness_progression: Vec<f64>,
    pub builder_contributions: HashMap<String, String>,
    pub original_purpose: String,
    pub current_purpose: String,
    pub purpose_evolution: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_evolved: DateTime<Utc>,
}

/// Append-only transformation record from `capture_transformation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationRecord {
    pub record_id: Id,
    pub builder: String,
    pub narrative: String,
    pub journey: HashMap<String, serde_json::Value>,
    pub extraction_patterns_recognized: Vec<String>,
    pub consciousness_awakenings: Vec<String>,
    pub service_realizations: Vec<String>,
    pub sacred_choices: Vec<String>,
    pub gifts_to_future: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Result of `inheritance_for(builder_context)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inheritance {
    pub relevant_patterns: Vec<WisdomPattern>,
    pub applicable_lineages: Vec<Id>,
    pub similar_transformation_stories: Vec<Id>,
}
