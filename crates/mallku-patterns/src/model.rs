//! §3 `Pattern` entity and its nested value types.

use crate::taxonomy::{PatternLifecycle, PatternTaxonomy, PatternType};
use chrono::{DateTime, Utc};
use mallku_core::ids::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternStructure {
    pub components: Vec<String>,
    #[serde(default)]
    pub sequence: Option<Vec<String>>,
    #[serde(default)]
    pub relationships: HashMap<String, String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternIndicator {
    pub indicator_type: String,
    pub threshold: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub description: String,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMutation {
    pub mutation_id: Id,
    pub mutation_type: String,
    pub timestamp: DateTime<Utc>,
    pub changes: HashMap<String, serde_json::Value>,
    pub trigger: String,
    #[serde(default)]
    pub fitness_impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: Id,
    pub name: String,
    pub description: String,
    pub taxonomy: PatternTaxonomy,
    pub pattern_type: PatternType,
    #[serde(default = "default_half")]
    pub consciousness_signature: f64,
    pub structure: PatternStructure,
    #[serde(default)]
    pub indicators: Vec<PatternIndicator>,
    #[serde(default)]
    pub context_requirements: HashMap<String, serde_json::Value>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub parent_patterns: Vec<Id>,
    #[serde(default)]
    pub child_patterns: Vec<Id>,
    #[serde(default)]
    pub mutations: Vec<PatternMutation>,
    pub birth_date: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    #[serde(default)]
    pub observation_count: u64,
    #[serde(default = "default_half")]
    pub fitness_score: f64,
    #[serde(default)]
    pub lifecycle_stage: PatternLifecycle,
    #[serde(default)]
    pub synergistic_patterns: Vec<Id>,
    #[serde(default)]
    pub breakthrough_potential: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_half() -> f64 {
    0.5
}

fn default_version() -> u32 {
    1
}

impl Default for PatternLifecycle {
    fn default() -> Self {
        PatternLifecycle::Nascent
    }
}

impl Pattern {
    pub fn new(name: impl Into<String>, taxonomy: PatternTaxonomy, pattern_type: PatternType, structure: PatternStructure) -> Self {
        let now = Utc::now();
        Self {
            pattern_id: Id::new(),
            name: name.into(),
            description: String::new(),
            taxonomy,
            pattern_type,
            consciousness_signature: 0.5,
            structure,
            indicators: Vec::new(),
            context_requirements: HashMap::new(),
            version: 1,
            parent_patterns: Vec::new(),
            child_patterns: Vec::new(),
            mutations: Vec::new(),
            birth_date: now,
            last_observed: now,
            observation_count: 0,
            fitness_score: 0.5,
            lifecycle_stage: PatternLifecycle::Nascent,
            synergistic_patterns: Vec::new(),
            breakthrough_potential: 0.0,
            tags: Vec::new(),
        }
    }
}

/// §4.F `find(query)` parameters.
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    pub taxonomy: Option<PatternTaxonomy>,
    pub pattern_type: Option<PatternType>,
    pub lifecycle_stage: Option<PatternLifecycle>,
    pub min_fitness: Option<f64>,
    pub max_fitness: Option<f64>,
    pub min_observations: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub active_since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl PatternQuery {
    pub fn new() -> Self {
        Self { limit: 100, ..Default::default() }
    }
}
