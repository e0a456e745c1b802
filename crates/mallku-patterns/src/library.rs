//! §4.F Pattern Library — typed store with lifecycle, query, lineage graph,
//! and an in-memory cache layered over a `mallku-store` `CollectionStore`.

use crate::model::{Pattern, PatternMutation, PatternQuery};
use crate::taxonomy::{PatternLifecycle, PatternTaxonomy};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use mallku_core::ids::Id;
use mallku_core::Result;
use mallku_store::CollectionStore;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;

const DIALOGUE_PATTERNS: &str = mallku_store::collections::DIALOGUE_PATTERNS;

/// Adjacency entry for the lineage graph arena (§9 "Cyclic references
/// between Pattern Library and Evolution" redesign note): parents/children
/// tracked by id rather than by owning reciprocal Rust references.
#[derive(Default, Clone)]
struct Lineage {
    parents: HashSet<Id>,
    children: HashSet<Id>,
}

pub struct PatternLibrary {
    store: Arc<dyn CollectionStore>,
    cache: DashMap<Id, Pattern>,
    taxonomy_index: DashMap<PatternTaxonomy, DashSet<Id>>,
    lineage: DashMap<Id, Lineage>,
}

impl PatternLibrary {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store, cache: DashMap::new(), taxonomy_index: DashMap::new(), lineage: DashMap::new() }
    }

    fn index(&self, pattern: &Pattern) {
        self.taxonomy_index.entry(pattern.taxonomy).or_default().insert(pattern.pattern_id);
        let mut entry = self.lineage.entry(pattern.pattern_id).or_default();
        entry.parents.extend(pattern.parent_patterns.iter().copied());
        entry.children.extend(pattern.child_patterns.iter().copied());
        drop(entry);
        for parent in &pattern.parent_patterns {
            self.lineage.entry(*parent).or_default().children.insert(pattern.pattern_id);
        }
        for child in &pattern.child_patterns {
            self.lineage.entry(*child).or_default().parents.insert(pattern.pattern_id);
        }
    }

    /// §4.F `store(pattern)` — upsert by `pattern_id`, update indices,
    /// update lineage for each parent (add child).
    pub async fn store(&self, pattern: Pattern) -> Result<()> {
        let doc = serde_json::to_value(&pattern)?;
        let doc = {
            let mut v = doc;
            v.as_object_mut().unwrap().insert("_key".to_string(), serde_json::json!(pattern.pattern_id.to_string()));
            v
        };
        self.store.upsert(DIALOGUE_PATTERNS, doc, "_key").await?;
        self.index(&pattern);
        self.cache.insert(pattern.pattern_id, pattern);
        Ok(())
    }

    /// Synchronous cache-only lookup, for callers (the Emergence Detector)
    /// that consult pattern metadata during a tick without awaiting the
    /// store; a cache miss simply means the pattern hasn't been loaded yet.
    pub fn cached(&self, id: Id) -> Option<Pattern> {
        self.cache.get(&id).map(|e| e.value().clone())
    }

    /// §4.F `retrieve(id)` — cache first, then store.
    pub async fn retrieve(&self, id: Id) -> Result<Option<Pattern>> {
        if let Some(p) = self.cache.get(&id) {
            return Ok(Some(p.clone()));
        }
        let doc = self.store.get(DIALOGUE_PATTERNS, &id.to_string()).await?;
        match doc {
            Some(v) => {
                let pattern: Pattern = serde_json::from_value(v)?;
                self.index(&pattern);
                self.cache.insert(id, pattern.clone());
                Ok(Some(pattern))
            }
            None => Ok(None),
        }
    }

    /// §4.F `find(query)` — filters, ordered by `fitness_score desc,
    /// observation_count desc` (stable), limited to `≤1000`.
    pub fn find(&self, query: &PatternQuery) -> Vec<Pattern> {
        let mut out: Vec<Pattern> = self
            .cache
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| query.taxonomy.map_or(true, |t| p.taxonomy as u8 == t as u8))
            .filter(|p| query.pattern_type.map_or(true, |t| p.pattern_type as u8 == t as u8))
            .filter(|p| query.lifecycle_stage.map_or(true, |s| p.lifecycle_stage as u8 == s as u8))
            .filter(|p| query.min_fitness.map_or(true, |m| p.fitness_score >= m))
            .filter(|p| query.max_fitness.map_or(true, |m| p.fitness_score <= m))
            .filter(|p| query.min_observations.map_or(true, |m| p.observation_count >= m))
            .filter(|p| query.active_since.map_or(true, |since| p.last_observed >= since))
            .filter(|p| match &query.tags {
                None => true,
                Some(tags) => tags.iter().all(|t| p.tags.contains(t)),
            })
            .collect();

        out.sort_by(|a, b| {
            b.fitness_score
                .partial_cmp(&a.fitness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.observation_count.cmp(&a.observation_count))
                .then(a.pattern_id.as_uuid().cmp(&b.pattern_id.as_uuid()))
        });
        out.truncate(query.limit.min(1000));
        out
    }

    /// §4.F `find_emerging(window, min_breakthrough)`.
    pub fn find_emerging(&self, window: chrono::Duration, min_breakthrough: f64, now: DateTime<Utc>) -> Vec<Pattern> {
        self.cache
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| matches!(p.lifecycle_stage, PatternLifecycle::Emerging))
            .filter(|p| p.last_observed >= now - window)
            .filter(|p| p.breakthrough_potential >= min_breakthrough)
            .collect()
    }

    /// §4.F `trace_lineage(id)` — BFS both directions via adjacency,
    /// cycle-safe.
    pub fn trace_lineage(&self, id: Id) -> Vec<Id> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id);
        visited.insert(id);
        let mut order = Vec::new();

        while let Some(current) = queue.pop_front() {
            order.push(current);
            if let Some(entry) = self.lineage.get(&current) {
                for next in entry.parents.iter().chain(entry.children.iter()) {
                    if visited.insert(*next) {
                        queue.push_back(*next);
                    }
                }
            }
        }
        order
    }

    /// §4.F `find_synergies(id, context?)` — union of explicit
    /// `synergistic_patterns` (score 0.9) and compatible-taxonomy patterns
    /// scored by consciousness similarity, lifecycle complementarity,
    /// fitness product, and context requirement match (grounded on
    /// `pattern_library.py`'s `_calculate_synergy_score`).
    pub fn find_synergies(&self, id: Id, context: Option<&serde_json::Value>) -> Vec<(Pattern, f64)> {
        let Some(base) = self.cache.get(&id).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        for syn_id in &base.synergistic_patterns {
            if let Some(p) = self.cache.get(syn_id) {
                seen.insert(*syn_id);
                out.push((p.value().clone(), 0.9));
            }
        }

        for taxonomy in base.taxonomy.compatible() {
            if let Some(ids) = self.taxonomy_index.get(taxonomy) {
                for candidate_id in ids.iter() {
                    if *candidate_id == id || seen.contains(&*candidate_id) {
                        continue;
                    }
                    if let Some(candidate) = self.cache.get(&*candidate_id) {
                        let score = synergy_score(&base, candidate.value(), context);
                        if score > 0.5 {
                            seen.insert(*candidate_id);
                            out.push((candidate.value().clone(), score));
                        }
                    }
                }
            }
        }

        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// §4.F `update_observation(id, Δfitness, context?)`.
    pub async fn update_observation(&self, id: Id, delta_fitness: f64, now: DateTime<Utc>) -> Result<()> {
        let Some(mut pattern) = self.retrieve(id).await? else {
            warn!(pattern_id = %id, "update_observation on unknown pattern");
            return Ok(());
        };
        pattern.observation_count += 1;
        pattern.last_observed = now;
        pattern.fitness_score = (pattern.fitness_score + delta_fitness).clamp(0.0, 1.0);

        if pattern.observation_count > 100 && pattern.fitness_score > 0.7 {
            pattern.lifecycle_stage = PatternLifecycle::Established;
        } else if pattern.observation_count > 20 {
            pattern.lifecycle_stage = PatternLifecycle::Emerging;
        }
        self.store(pattern).await
    }

    /// §4.F `evolve(id, mutation_type, changes, trigger)` — create a child
    /// pattern with `version = parent.version + 1`, append a
    /// `PatternMutation` record, wire parent/child.
    pub async fn evolve(
        &self,
        id: Id,
        mutation_type: impl Into<String>,
        changes: std::collections::HashMap<String, serde_json::Value>,
        trigger: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Pattern>> {
        let Some(parent) = self.retrieve(id).await? else {
            return Ok(None);
        };
        let mut child = parent.clone();
        child.pattern_id = Id::new();
        child.version = parent.version + 1;
        child.lifecycle_stage = PatternLifecycle::Evolving;
        child.parent_patterns = vec![parent.pattern_id];
        child.child_patterns = Vec::new();
        child.birth_date = now;
        child.last_observed = now;
        child.mutations.push(PatternMutation {
            mutation_id: Id::new(),
            mutation_type: mutation_type.into(),
            timestamp: now,
            changes,
            trigger: trigger.into(),
            fitness_impact: 0.0,
        });

        let mut updated_parent = parent;
        updated_parent.child_patterns.push(child.pattern_id);

        self.store(updated_parent).await?;
        self.store(child.clone()).await?;
        Ok(Some(child))
    }
}

/// Summary counts for `mallku export-state`: total cached patterns and a
/// breakdown by lifecycle stage.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PatternLibrarySummary {
    pub total_patterns: usize,
    pub by_lifecycle: std::collections::HashMap<String, usize>,
    pub by_taxonomy: std::collections::HashMap<String, usize>,
}

impl PatternLibrary {
    pub fn summary(&self) -> PatternLibrarySummary {
        let mut by_lifecycle = std::collections::HashMap::new();
        let mut by_taxonomy = std::collections::HashMap::new();
        for entry in self.cache.iter() {
            let p = entry.value();
            *by_lifecycle.entry(format!("{:?}", p.lifecycle_stage)).or_insert(0) += 1;
            *by_taxonomy.entry(format!("{:?}", p.taxonomy)).or_insert(0) += 1;
        }
        PatternLibrarySummary { total_patterns: self.cache.len(), by_lifecycle, by_taxonomy }
    }
}

fn synergy_score(a: &Pattern, b: &Pattern, context: Option<&serde_json::Value>) -> f64 {
    let mut score = 0.0;
    let consciousness_diff = (a.consciousness_signature - b.consciousness_signature).abs();
    score += (1.0 - consciousness_diff) * 0.3;

    if matches!(a.lifecycle_stage, PatternLifecycle::Established) && matches!(b.lifecycle_stage, PatternLifecycle::Emerging) {
        score += 0.2;
    }

    score += a.fitness_score * b.fitness_score * 0.3;

    if let Some(ctx) = context.and_then(|c| c.as_object()) {
        if !b.context_requirements.is_empty() {
            let matches = b
                .context_requirements
                .iter()
                .filter(|(k, v)| ctx.get(k.as_str()).map(|cv| cv == *v).unwrap_or(false))
                .count();
            score += (matches as f64 / b.context_requirements.len() as f64) * 0.2;
        }
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatternStructure;
    use crate::taxonomy::PatternType;
    use mallku_store::memory::InMemoryStore;

    fn pattern(taxonomy: PatternTaxonomy) -> Pattern {
        Pattern::new("test", taxonomy, PatternType::Convergence, PatternStructure::default())
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));
        let p = pattern(PatternTaxonomy::Dialogue);
        let id = p.pattern_id;
        lib.store(p.clone()).await.unwrap();
        let back = lib.retrieve(id).await.unwrap().unwrap();
        assert_eq!(back.pattern_id, p.pattern_id);
    }

    #[tokio::test]
    async fn find_orders_by_fitness_then_observations() {
        let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));
        let mut a = pattern(PatternTaxonomy::Dialogue);
        a.fitness_score = 0.9;
        a.observation_count = 1;
        let mut b = pattern(PatternTaxonomy::Dialogue);
        b.fitness_score = 0.9;
        b.observation_count = 5;
        lib.store(a.clone()).await.unwrap();
        lib.store(b.clone()).await.unwrap();
        let found = lib.find(&PatternQuery::new());
        assert_eq!(found[0].pattern_id, b.pattern_id);
    }

    #[tokio::test]
    async fn evolve_creates_linked_child_with_incremented_version() {
        let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));
        let p = pattern(PatternTaxonomy::Dialogue);
        let id = p.pattern_id;
        lib.store(p).await.unwrap();
        let child = lib.evolve(id, "mutation", Default::default(), "test", Utc::now()).await.unwrap().unwrap();
        assert_eq!(child.version, 2);
        assert_eq!(child.parent_patterns, vec![id]);
        let parent = lib.retrieve(id).await.unwrap().unwrap();
        assert!(parent.child_patterns.contains(&child.pattern_id));
    }

    #[tokio::test]
    async fn lineage_trace_is_cycle_safe() {
        let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));
        let p = pattern(PatternTaxonomy::Dialogue);
        let id = p.pattern_id;
        lib.store(p).await.unwrap();
        let child = lib.evolve(id, "mutation", Default::default(), "test", Utc::now()).await.unwrap().unwrap();
        let trace = lib.trace_lineage(id);
        assert!(trace.contains(&id));
        assert!(trace.contains(&child.pattern_id));
    }

    #[tokio::test]
    async fn update_observation_promotes_lifecycle() {
        let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));
        let mut p = pattern(PatternTaxonomy::Dialogue);
        p.observation_count = 21;
        p.fitness_score = 0.5;
        let id = p.pattern_id;
        lib.store(p).await.unwrap();
        lib.update_observation(id, 0.0, Utc::now()).await.unwrap();
        let updated = lib.retrieve(id).await.unwrap().unwrap();
        assert_eq!(updated.lifecycle_stage, PatternLifecycle::Emerging);
    }
}
