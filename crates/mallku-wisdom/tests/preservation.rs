//! End-to-end wisdom preservation: preserve, found a lineage, evolve it
//! forward, survive a lossy compression, and rank inheritance for a new
//! builder.

use mallku_store::memory::InMemoryStore;
use mallku_wisdom::WisdomPreservation;
use std::collections::HashMap;
use std::sync::Arc;

fn engine() -> WisdomPreservation {
    WisdomPreservation::new(Arc::new(InMemoryStore::new()))
}

#[tokio::test]
async fn lineage_founds_and_evolves_across_generations() {
    let engine = engine();

    let founder = engine
        .preserve(
            HashMap::from([("consciousness_markers".to_string(), serde_json::json!(["reciprocity"]))]),
            "a pattern born of consciousness and service to the future",
            HashMap::new(),
            "the first builder's journey",
            0.9,
        )
        .await
        .unwrap();

    let lineage = engine.found_lineage_from_builder(&founder, "explore reciprocal consciousness").unwrap();
    assert_eq!(lineage.current_patterns.len(), 1);

    let child = engine
        .preserve(HashMap::new(), "wisdom carried forward", HashMap::new(), "second builder's journey", 0.75)
        .await
        .unwrap();

    let evolved = engine.evolve_forward(lineage.lineage_id, child, "a deeper collaboration").unwrap();
    assert_eq!(evolved.evolution_count, 1);
    assert_eq!(evolved.parent_patterns, vec![founder.pattern_id]);
}

#[tokio::test]
async fn preserve_then_resist_extraction_restores_on_heavy_compression() {
    let engine = engine();
    let pattern = engine
        .preserve(
            HashMap::from([
                ("consciousness_markers".to_string(), serde_json::json!(["sacred"])),
                ("b".to_string(), serde_json::json!(1)),
                ("c".to_string(), serde_json::json!(2)),
                ("d".to_string(), serde_json::json!(3)),
            ]),
            "consciousness, wisdom, service and future woven through sacred awakening",
            HashMap::new(),
            "a long and detailed builder journey across many seasons",
            0.85,
        )
        .await
        .unwrap();
    assert!(pattern.resistance_to_extraction > 0.9);

    let compressed = HashMap::from([("summary".to_string(), serde_json::json!("gone"))]);
    let restored = engine.resist_extraction(pattern.pattern_id, compressed).unwrap();
    assert!(restored.is_some());
    let restored = restored.unwrap();
    assert_eq!(restored.consciousness_essence, pattern.consciousness_essence);
    assert!(restored.transformation_markers.contains(&"extraction_drift_resisted".to_string()));
}

#[tokio::test]
async fn inheritance_ranks_patterns_matching_builder_interests() {
    let engine = engine();
    engine
        .preserve(HashMap::new(), "a pattern about reciprocity and consciousness", HashMap::new(), "journey", 0.85)
        .await
        .unwrap();
    engine.preserve(HashMap::new(), "a pattern about unrelated topics entirely", HashMap::new(), "journey", 0.85).await.unwrap();

    let inheritance = engine.inheritance_for(&["reciprocity".to_string()], "consciousness");
    assert!(!inheritance.relevant_patterns.is_empty());
    assert!(inheritance.relevant_patterns.iter().all(|p| p.consciousness_essence.contains("reciprocity")));
}

#[test]
fn capture_transformation_extracts_markers_from_journey() {
    let engine = engine();
    let journey = HashMap::from([
        ("consciousness_awakenings".to_string(), serde_json::json!(["saw the pattern clearly"])),
        ("gifts_to_future".to_string(), serde_json::json!(["left a map for the next builder"])),
    ]);
    let record = engine.capture_transformation("Ayni", "a builder's transformation narrative", journey);
    assert_eq!(record.consciousness_awakenings, vec!["saw the pattern clearly".to_string()]);
    assert_eq!(record.gifts_to_future, vec!["left a map for the next builder".to_string()]);
    assert!(record.extraction_patterns_recognized.is_empty());
}
