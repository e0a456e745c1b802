//! End-to-end pattern-library + evolution scenarios spanning multiple
//! evolution cycles.

use chrono::Utc;
use mallku_patterns::{
    evolution::{EvolutionType, PatternEvolution},
    library::PatternLibrary,
    model::PatternStructure,
    taxonomy::{PatternLifecycle, PatternTaxonomy, PatternType},
    Pattern,
};
use mallku_store::memory::InMemoryStore;
use std::sync::Arc;

#[tokio::test]
async fn established_pattern_survives_stabilization_without_new_id() {
    let lib = Arc::new(PatternLibrary::new(Arc::new(InMemoryStore::new())));
    let evolution = PatternEvolution::new(lib.clone());

    let mut p = Pattern::new("steady", PatternTaxonomy::Dialogue, PatternType::Consensus, PatternStructure::default());
    p.fitness_score = 0.75;
    p.observation_count = 15;
    let id = p.pattern_id;
    lib.store(p).await.unwrap();

    let opportunity = evolution.detect_opportunity(id, Utc::now()).await.unwrap();
    assert_eq!(opportunity, Some(EvolutionType::Stabilization));

    let event = evolution.evolve(id, EvolutionType::Stabilization, vec![], Utc::now()).await.unwrap().unwrap();
    assert!(event.resulting_pattern_id.is_none());

    let after = lib.retrieve(id).await.unwrap().unwrap();
    assert_eq!(after.lifecycle_stage, PatternLifecycle::Established);
}

#[tokio::test]
async fn synergy_discovery_respects_compatible_taxonomy() {
    let lib = PatternLibrary::new(Arc::new(InMemoryStore::new()));

    let mut flow = Pattern::new("flow", PatternTaxonomy::DialogueFlow, PatternType::FlowState, PatternStructure::default());
    flow.fitness_score = 0.9;
    let mut coherence = Pattern::new("coherence", PatternTaxonomy::ConsciousnessCoherence, PatternType::CoherenceSpike, PatternStructure::default());
    coherence.consciousness_signature = flow.consciousness_signature;
    coherence.fitness_score = 0.8;
    let unrelated = Pattern::new("unrelated", PatternTaxonomy::Wisdom, PatternType::Synthesis, PatternStructure::default());

    let flow_id = flow.pattern_id;
    lib.store(flow).await.unwrap();
    lib.store(coherence.clone()).await.unwrap();
    lib.store(unrelated).await.unwrap();

    let synergies = lib.find_synergies(flow_id, None);
    assert!(synergies.iter().any(|(p, _)| p.pattern_id == coherence.pattern_id));
    assert!(synergies.iter().all(|(p, _)| p.taxonomy != PatternTaxonomy::Wisdom));
}

#[tokio::test]
async fn lineage_survives_multiple_evolution_generations() {
    let lib = Arc::new(PatternLibrary::new(Arc::new(InMemoryStore::new())));
    let evolution = PatternEvolution::new(lib.clone());

    let mut root = Pattern::new("root", PatternTaxonomy::Dialogue, PatternType::Convergence, PatternStructure::default());
    root.fitness_score = 0.5;
    let root_id = root.pattern_id;
    lib.store(root).await.unwrap();

    let gen1 = evolution.evolve(root_id, EvolutionType::Mutation, vec![], Utc::now()).await.unwrap().unwrap();
    let gen1_id = gen1.resulting_pattern_id.unwrap();
    let gen2 = evolution.evolve(gen1_id, EvolutionType::Mutation, vec![], Utc::now()).await.unwrap().unwrap();
    let gen2_id = gen2.resulting_pattern_id.unwrap();

    let trace = lib.trace_lineage(gen2_id);
    assert!(trace.contains(&root_id));
    assert!(trace.contains(&gen1_id));
    assert!(trace.contains(&gen2_id));

    let gen2_pattern = lib.retrieve(gen2_id).await.unwrap().unwrap();
    assert_eq!(gen2_pattern.version, 3);
}
