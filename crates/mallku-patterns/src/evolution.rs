//! §4.G Pattern Evolution — fitness evaluation, evolution-opportunity
//! detection, and the seven evolution effects, grounded on
//! `original_source/src/mallku/firecircle/pattern_evolution.py`.

use crate::library::PatternLibrary;
use crate::model::Pattern;
use crate::taxonomy::PatternLifecycle;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mallku_core::ids::Id;
use mallku_core::Result;
use serde::{Deserialize, Serialize};

/// Fitness cache entry lifetime: an evaluation older than this is
/// recomputed rather than reused (§4.G "fitness is cached for up to an
/// hour").
const FITNESS_CACHE_TTL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessMetrics {
    pub relevance: f64,
    pub persistence: f64,
    pub adaptability: f64,
    pub synergy: f64,
    pub reach: f64,
}

impl FitnessMetrics {
    /// Weighted composite matching the evolution table: relevance and
    /// persistence weigh heaviest, reach lightest.
    pub fn composite(&self) -> f64 {
        (self.relevance * 0.3
            + self.persistence * 0.25
            + self.adaptability * 0.2
            + self.synergy * 0.15
            + self.reach * 0.1)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionType {
    Mutation,
    Fusion,
    Fission,
    Transcendence,
    Decay,
    Extinction,
    Stabilization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub event_id: Id,
    pub pattern_id: Id,
    pub evolution_type: EvolutionType,
    pub timestamp: DateTime<Utc>,
    pub resulting_pattern_id: Option<Id>,
    pub fitness_before: f64,
    pub fitness_after: f64,
    pub partners: Vec<Id>,
}

struct CachedFitness {
    metrics: FitnessMetrics,
    evaluated_at: DateTime<Utc>,
}

pub struct PatternEvolution {
    library: std::sync::Arc<PatternLibrary>,
    fitness_cache: DashMap<Id, CachedFitness>,
}

impl PatternEvolution {
    pub fn new(library: std::sync::Arc<PatternLibrary>) -> Self {
        Self { library, fitness_cache: DashMap::new() }
    }

    /// §4.G `evaluate_fitness(id)` — cached for up to an hour.
    pub async fn evaluate_fitness(&self, id: Id, now: DateTime<Utc>) -> Result<Option<FitnessMetrics>> {
        if let Some(cached) = self.fitness_cache.get(&id) {
            if now - cached.evaluated_at < FITNESS_CACHE_TTL {
                return Ok(Some(cached.metrics));
            }
        }
        let Some(pattern) = self.library.retrieve(id).await? else {
            return Ok(None);
        };
        let metrics = compute_fitness(&pattern, now);
        self.fitness_cache.insert(id, CachedFitness { metrics, evaluated_at: now });
        Ok(Some(metrics))
    }

    /// §4.G `detect_opportunity(id)` — the first matching rule from the
    /// evolution table wins, in the table's stated priority order: decay
    /// and extinction (lifecycle-driven) before growth (fitness-driven).
    pub async fn detect_opportunity(&self, id: Id, now: DateTime<Utc>) -> Result<Option<EvolutionType>> {
        let Some(pattern) = self.library.retrieve(id).await? else {
            return Ok(None);
        };
        let Some(fitness) = self.evaluate_fitness(id, now).await? else {
            return Ok(None);
        };
        let composite = fitness.composite();
        let stale = now - pattern.last_observed > Duration::days(30);

        if matches!(pattern.lifecycle_stage, PatternLifecycle::Dormant) {
            return Ok(None);
        }
        if stale && composite < 0.2 {
            return Ok(Some(EvolutionType::Extinction));
        }
        if stale || composite < 0.35 {
            return Ok(Some(EvolutionType::Decay));
        }
        if composite > 0.85 && pattern.breakthrough_potential > 0.8 {
            return Ok(Some(EvolutionType::Transcendence));
        }
        if !self.library.find_synergies(id, None).is_empty() && composite > 0.6 {
            return Ok(Some(EvolutionType::Fusion));
        }
        if pattern.structure.components.len() > 5 && composite > 0.5 {
            return Ok(Some(EvolutionType::Fission));
        }
        if composite > 0.7 && pattern.observation_count > 10 {
            return Ok(Some(EvolutionType::Stabilization));
        }
        if composite >= 0.35 && composite <= 0.7 {
            return Ok(Some(EvolutionType::Mutation));
        }
        Ok(None)
    }

    /// §4.G `evolve(id, evolution_type, partners?)` — applies the effect
    /// for the given evolution type and records an `EvolutionEvent`.
    pub async fn evolve(
        &self,
        id: Id,
        evolution_type: EvolutionType,
        partners: Vec<Id>,
        now: DateTime<Utc>,
    ) -> Result<Option<EvolutionEvent>> {
        let Some(pattern) = self.library.retrieve(id).await? else {
            return Ok(None);
        };
        let fitness_before = pattern.fitness_score;

        let resulting_pattern_id = match evolution_type {
            EvolutionType::Decay => {
                self.decay(pattern).await?;
                None
            }
            EvolutionType::Extinction => {
                self.extinct(pattern).await?;
                None
            }
            EvolutionType::Mutation => {
                let mut changes = std::collections::HashMap::new();
                changes.insert("trigger".to_string(), serde_json::json!("fitness_in_adaptive_range"));
                self.library.evolve(id, "mutation", changes, "adaptive_mutation", now).await?.map(|p| p.pattern_id)
            }
            EvolutionType::Fusion => self.fuse(pattern, &partners, now).await?,
            EvolutionType::Fission => self.fission(pattern, now).await?,
            EvolutionType::Transcendence => self.transcend(pattern, now).await?,
            EvolutionType::Stabilization => {
                self.stabilize(pattern).await?;
                None
            }
        };

        let fitness_after = match resulting_pattern_id {
            Some(child_id) => self.library.retrieve(child_id).await?.map(|p| p.fitness_score).unwrap_or(fitness_before),
            None => self.library.retrieve(id).await?.map(|p| p.fitness_score).unwrap_or(fitness_before),
        };

        Ok(Some(EvolutionEvent {
            event_id: Id::new(),
            pattern_id: id,
            evolution_type,
            timestamp: now,
            resulting_pattern_id,
            fitness_before,
            fitness_after,
            partners,
        }))
    }

    /// Decay: fitness drops 0.2, lifecycle moves to declining (grounded on
    /// `pattern_evolution.py`'s `_decay_pattern`).
    async fn decay(&self, mut pattern: Pattern) -> Result<()> {
        pattern.fitness_score = (pattern.fitness_score - 0.2).max(0.0);
        pattern.lifecycle_stage = PatternLifecycle::Declining;
        self.library.store(pattern).await
    }

    /// Extinction: fitness zeroed, lifecycle moves to dormant (grounded on
    /// `pattern_evolution.py`'s `_extinct_pattern`).
    async fn extinct(&self, mut pattern: Pattern) -> Result<()> {
        pattern.fitness_score = 0.0;
        pattern.lifecycle_stage = PatternLifecycle::Dormant;
        self.library.store(pattern).await
    }

    /// Stabilization: lifecycle settles at established without a new
    /// pattern_id.
    async fn stabilize(&self, mut pattern: Pattern) -> Result<()> {
        pattern.lifecycle_stage = PatternLifecycle::Established;
        self.library.store(pattern).await
    }

    /// Fusion: merges with the fittest synergy partner into a child whose
    /// structure concatenates both components and whose consciousness
    /// signature is the mean of the two.
    async fn fuse(&self, pattern: Pattern, partners: &[Id], now: DateTime<Utc>) -> Result<Option<Id>> {
        let partner_id = match partners.first() {
            Some(id) => *id,
            None => match self.library.find_synergies(pattern.pattern_id, None).into_iter().next() {
                Some((p, _)) => p.pattern_id,
                None => return Ok(None),
            },
        };
        let Some(partner) = self.library.retrieve(partner_id).await? else {
            return Ok(None);
        };

        let mut changes = std::collections::HashMap::new();
        changes.insert("fused_with".to_string(), serde_json::json!(partner_id.to_string()));
        let child = self.library.evolve(pattern.pattern_id, "fusion", changes, "synergy_threshold_exceeded", now).await?;
        let Some(mut child) = child else { return Ok(None) };

        child.structure.components.extend(partner.structure.components.iter().cloned());
        child.consciousness_signature = (pattern.consciousness_signature + partner.consciousness_signature) / 2.0;
        child.parent_patterns.push(partner_id);
        let child_id = child.pattern_id;
        self.library.store(child).await?;

        let mut updated_partner = partner;
        updated_partner.child_patterns.push(child_id);
        self.library.store(updated_partner).await?;
        Ok(Some(child_id))
    }

    /// Fission: splits an overgrown pattern's structure into two halves,
    /// producing one evolved child that retains the first half; the
    /// second half is recorded as a sibling pattern of the same taxonomy.
    async fn fission(&self, pattern: Pattern, now: DateTime<Utc>) -> Result<Option<Id>> {
        let mid = pattern.structure.components.len() / 2;
        let (first, second) = pattern.structure.components.split_at(mid);

        let mut changes = std::collections::HashMap::new();
        changes.insert("retained_components".to_string(), serde_json::json!(first));
        let child = self.library.evolve(pattern.pattern_id, "fission", changes, "structural_overgrowth", now).await?;
        let Some(mut child) = child else { return Ok(None) };
        child.structure.components = first.to_vec();
        let child_id = child.pattern_id;
        self.library.store(child).await?;

        if !second.is_empty() {
            let mut sibling = Pattern::new(format!("{} (split)", pattern.name), pattern.taxonomy, pattern.pattern_type, pattern.structure.clone());
            sibling.structure.components = second.to_vec();
            sibling.parent_patterns = vec![pattern.pattern_id];
            sibling.consciousness_signature = pattern.consciousness_signature;
            self.library.store(sibling).await?;
        }
        Ok(Some(child_id))
    }

    /// Transcendence: a high-fitness, high-breakthrough pattern graduates
    /// into a new taxonomy tier (dialogue/consciousness/emergence ->
    /// wisdom) via evolve, marked transformed. Fitness, consciousness, and
    /// breakthrough all scale by 1.25 and clamp to 1.0; the indicator set
    /// is pruned to the 3 strongest (by weight) as the pattern sheds
    /// accumulated noise on ascension.
    async fn transcend(&self, pattern: Pattern, now: DateTime<Utc>) -> Result<Option<Id>> {
        let mut changes = std::collections::HashMap::new();
        changes.insert("breakthrough_potential".to_string(), serde_json::json!(pattern.breakthrough_potential));
        let child = self.library.evolve(pattern.pattern_id, "transcendence", changes, "breakthrough_threshold_exceeded", now).await?;
        let Some(mut child) = child else { return Ok(None) };
        child.lifecycle_stage = PatternLifecycle::Transformed;
        child.fitness_score = (child.fitness_score * 1.25).min(1.0);
        child.consciousness_signature = (child.consciousness_signature * 1.25).min(1.0);
        child.breakthrough_potential = (child.breakthrough_potential * 1.25).min(1.0);
        child.indicators.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        child.indicators.truncate(3);
        let child_id = child.pattern_id;
        self.library.store(child).await?;
        Ok(Some(child_id))
    }
}

/// §4.G fitness factors, grounded on `pattern_evolution.py`'s
/// `_evaluate_fitness`: relevance from recency of observation, persistence
/// from age and observation count, adaptability from mutation history,
/// synergy from `breakthrough_potential`, reach from consciousness
/// signature.
fn compute_fitness(pattern: &Pattern, now: DateTime<Utc>) -> FitnessMetrics {
    let days_since_observed = (now - pattern.last_observed).num_seconds().max(0) as f64 / 86_400.0;
    let relevance = (1.0 - (days_since_observed / 30.0)).clamp(0.0, 1.0);

    let age_days = (now - pattern.birth_date).num_seconds().max(0) as f64 / 86_400.0;
    let persistence = (pattern.observation_count as f64 / 100.0).min(0.7) + (age_days / 365.0).min(0.3);
    let persistence = persistence.clamp(0.0, 1.0);

    let adaptability = (pattern.mutations.len() as f64 / 10.0).min(1.0);
    let synergy = pattern.breakthrough_potential.clamp(0.0, 1.0);
    let reach = pattern.consciousness_signature.clamp(0.0, 1.0);

    FitnessMetrics { relevance, persistence, adaptability, synergy, reach }
}
