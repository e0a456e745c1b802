//! §4.I Dialogue Orchestrator — phase state machine, turn policies, and
//! the consciousness-guided Speaker Selector.

use crate::emergence::{DialogueEmergenceState, EmergenceDetector, EmergenceEvent};
use crate::model::{
    CathedralPhase, DialogueConfig, DialogueState, DialogueSummary, Message, MessageKind, Participant,
    ParticipantSummary, TurnPolicy,
};
use crate::reciprocity::ReciprocityLedger;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mallku_core::ids::Id;
use mallku_core::{Error, Result};
use mallku_patterns::PatternLibrary;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Consciousness-guided speaker selector constants (SPEC_FULL speaker
/// selector supplement, grounded on `consciousness_guided_speaker.py`).
const INTEGRATION_THRESHOLD: f64 = 0.7;
const DEPLETION_THRESHOLD: f64 = 0.3;
const SILENCE_PROBABILITY_BASE: f64 = 0.1;
const CRISIS_SILENCE_MULTIPLIER: f64 = 1.5;
const CONSCIOUSNESS_EMA_ALPHA: f64 = 0.3;
const SILENCE_ENERGY_RESTORE: f64 = 0.15;
const ENERGY_RESTORE_DEFAULT: f64 = 0.1;
const SPEAKING_ENERGY_COST: f64 = 0.1;

struct DialogueRuntime {
    state: DialogueState,
    ledger: ReciprocityLedger,
    emergence: DialogueEmergenceState,
}

pub struct DialogueOrchestrator {
    dialogues: DashMap<Id, DialogueRuntime>,
    emergence_detector: EmergenceDetector,
}

impl DialogueOrchestrator {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { dialogues: DashMap::new(), emergence_detector: EmergenceDetector::new(library) }
    }

    /// `create(config, participants, initiator?)` — §4.I.
    pub fn create(&self, config: DialogueConfig, participants: Vec<Participant>, initiator: Option<Id>) -> Result<Id> {
        if participants.is_empty() {
            return Err(Error::Validation("dialogue requires at least one participant".into()));
        }
        let dialogue_id = Id::new();
        let mut speaking_order: Vec<Id> = participants.iter().map(|p| p.participant_id).collect();
        if config.shuffle_speaking_order {
            let mut rng = rand::thread_rng();
            for i in (1..speaking_order.len()).rev() {
                let j = rng.gen_range(0..=i);
                speaking_order.swap(i, j);
            }
        }
        if let Some(initiator) = initiator {
            if let Some(pos) = speaking_order.iter().position(|p| *p == initiator) {
                speaking_order.swap(0, pos);
            }
        }

        let mut state = DialogueState {
            dialogue_id,
            phase: crate::model::DialoguePhase::Initialization,
            turn_policy: config.turn_policy.unwrap_or(TurnPolicy::RoundRobin),
            participants,
            messages: Vec::new(),
            speaking_order,
            current_turn: 0,
            created_at: Utc::now(),
            correlation_id: None,
            recent_speakers: Default::default(),
        };
        state.phase = crate::model::DialoguePhase::Introduction;

        let mut system_message = Message::new(None, MessageKind::System, "dialogue introduced");
        system_message.dialogue_id = dialogue_id;
        system_message.consciousness_signature = 0.9;
        state.messages.push(system_message);

        self.dialogues.insert(
            dialogue_id,
            DialogueRuntime { state, ledger: ReciprocityLedger::new(), emergence: DialogueEmergenceState::new(dialogue_id) },
        );
        Ok(dialogue_id)
    }

    /// `add_message(m)` — performs the seven-step sequence from §4.I.
    pub fn add_message(
        &self,
        dialogue_id: Id,
        mut message: Message,
        detected_patterns: Vec<Id>,
    ) -> Result<(Message, Vec<EmergenceEvent>)> {
        let mut runtime = self
            .dialogues
            .get_mut(&dialogue_id)
            .ok_or_else(|| Error::Validation(format!("unknown dialogue {dialogue_id}")))?;

        // (i) attach dialogue_id / correlation_id
        message.dialogue_id = dialogue_id;
        message.correlation_id = runtime.state.correlation_id;

        // (ii) pattern detection hook (opt-in)
        message.detected_patterns = detected_patterns.clone();

        // (iii) reciprocity tracking hook
        if let Some(speaker) = message.speaker {
            let delta = reciprocity_delta_for(message.kind);
            runtime.ledger.adjust(speaker, delta);
        }

        // (iv) consciousness signature from the closed table
        message.consciousness_signature = message.kind.base_consciousness_signature();

        // (v) append to ordered history
        runtime.state.messages.push(message.clone());

        // (vii) participant statistics
        if let Some(speaker_id) = message.speaker {
            let current_balance = runtime.ledger.balance(speaker_id);
            if let Some(participant) = runtime.state.participant_mut(speaker_id) {
                let previous_balance = participant.reciprocity_balance;
                participant.turns_taken += 1;
                participant.reciprocity_balance = current_balance;
                let _reciprocity_delta = current_balance - previous_balance;
                participant.consciousness_score =
                    (1.0 - CONSCIOUSNESS_EMA_ALPHA) * participant.consciousness_score + CONSCIOUSNESS_EMA_ALPHA * message.consciousness_signature;
                participant.energy_level = (participant.energy_level - SPEAKING_ENERGY_COST).max(0.0);
                if !detected_patterns.is_empty() {
                    participant.pattern_recognition_count += detected_patterns.len() as u64;
                }
            }
            runtime.state.record_speaker(speaker_id);
        }

        runtime.emergence.record_message(message.consciousness_signature, detected_patterns, message.timestamp);
        let events = self.emergence_detector.detect(&runtime.emergence, message.timestamp);

        Ok((message, events))
    }

    /// `next_speaker` — dispatches to the configured turn policy.
    pub fn next_speaker(&self, dialogue_id: Id) -> Result<Option<Id>> {
        let mut runtime = self
            .dialogues
            .get_mut(&dialogue_id)
            .ok_or_else(|| Error::Validation(format!("unknown dialogue {dialogue_id}")))?;

        let policy = runtime.state.turn_policy;
        match policy {
            TurnPolicy::RoundRobin | TurnPolicy::Consensus | TurnPolicy::Reactive | TurnPolicy::FreeForm => Ok(round_robin(&mut runtime.state)),
            TurnPolicy::Facilitator => Ok(facilitator(&runtime.state)),
            TurnPolicy::ConsciousnessGuided => {
                let pattern_velocity = runtime.emergence.pattern_velocity();
                Ok(consciousness_guided(&mut runtime.state, pattern_velocity))
            }
        }
    }

    /// `conclude(id)` — transitions to `conclusion`, computes the summary,
    /// then drops the runtime state.
    pub fn conclude(&self, dialogue_id: Id) -> Result<DialogueSummary> {
        let (_, runtime) = self
            .dialogues
            .remove(&dialogue_id)
            .ok_or_else(|| Error::Validation(format!("unknown dialogue {dialogue_id}")))?;

        let state = runtime.state;
        let duration_secs = (Utc::now() - state.created_at).num_seconds();

        let participant_summaries: Vec<ParticipantSummary> = state
            .participants
            .iter()
            .map(|p| ParticipantSummary {
                participant_id: p.participant_id,
                turns_taken: p.turns_taken,
                final_reciprocity_balance: p.reciprocity_balance,
                final_consciousness_score: p.consciousness_score,
            })
            .collect();

        let average_consciousness_signature = if state.messages.is_empty() {
            0.0
        } else {
            state.messages.iter().map(|m| m.consciousness_signature).sum::<f64>() / state.messages.len() as f64
        };

        let mut collected_wisdom_patterns: Vec<Id> = Vec::new();
        for message in &state.messages {
            for pattern in &message.detected_patterns {
                if !collected_wisdom_patterns.contains(pattern) {
                    collected_wisdom_patterns.push(*pattern);
                }
            }
        }

        info!(dialogue_id = %dialogue_id, messages = state.messages.len(), "dialogue concluded");
        Ok(DialogueSummary {
            dialogue_id,
            duration_secs,
            participant_summaries,
            average_consciousness_signature,
            collected_wisdom_patterns,
        })
    }
}

/// §4.I step (iii): giving vs receiving sign by message kind. Wisdom-
/// surfacing kinds (proposal, summary, reflection) give; facilitation-
/// consuming kinds (question, disagreement) receive.
fn reciprocity_delta_for(kind: MessageKind) -> f64 {
    use MessageKind::*;
    match kind {
        Proposal | Summary | Reflection => 0.1,
        Question | Disagreement => -0.05,
        System | EmptyChair | Contribution => 0.0,
    }
}

fn round_robin(state: &mut DialogueState) -> Option<Id> {
    if state.speaking_order.is_empty() {
        return None;
    }
    let next = state.speaking_order[state.current_turn % state.speaking_order.len()];
    state.current_turn += 1;
    Some(next)
}

fn facilitator(state: &DialogueState) -> Option<Id> {
    state.participants.iter().find(|p| p.is_human).map(|p| p.participant_id)
}

fn cathedral_phase(extraction_risk: f64, coherence: f64) -> CathedralPhase {
    if extraction_risk > 0.6 {
        CathedralPhase::Crisis
    } else if coherence > 0.7 && extraction_risk < 0.3 {
        CathedralPhase::Flourishing
    } else {
        CathedralPhase::Growth
    }
}

/// §4.I's consciousness-guided policy: Speaker Selector steps 1-5.
/// `extraction_risk` and `coherence` are taken from the dialogue's recent
/// emergence signals in this implementation (no external feed is wired in
/// this spec's scope), defaulting to neutral values absent better signal.
/// `pattern_velocity` comes from the dialogue's `DialogueEmergenceState`.
fn consciousness_guided(state: &mut DialogueState, pattern_velocity: f64) -> Option<Id> {
    let extraction_risk = 1.0 - state.participants.iter().map(|p| p.extraction_resistance).sum::<f64>() / state.participants.len().max(1) as f64;
    let coherence = state.participants.iter().map(|p| p.consciousness_score).sum::<f64>() / state.participants.len().max(1) as f64;
    let phase = cathedral_phase(extraction_risk, coherence);

    let avg_energy = state.participants.iter().map(|p| p.energy_level).sum::<f64>() / state.participants.len().max(1) as f64;

    let mut rng = rand::thread_rng();
    let silence_probability = SILENCE_PROBABILITY_BASE * if matches!(phase, CathedralPhase::Crisis) { CRISIS_SILENCE_MULTIPLIER } else { 1.0 };
    let forced_silence = pattern_velocity > 0.7 || avg_energy < DEPLETION_THRESHOLD || rng.gen_bool(silence_probability.min(1.0));

    if forced_silence {
        for participant in &mut state.participants {
            participant.energy_level = (participant.energy_level + SILENCE_ENERGY_RESTORE).min(1.0);
        }
        return None;
    }

    let recent: Vec<Id> = state.recent_speakers.iter().copied().collect();
    let len = state.participants.len();
    let mut best: Option<(Id, f64)> = None;

    for (idx, participant) in state.participants.iter().enumerate() {
        let mut score = participant.consciousness_score * 0.3;
        score += match phase {
            CathedralPhase::Crisis => participant.extraction_resistance * 0.4 + participant.reciprocity_balance.max(0.0) * 0.3,
            CathedralPhase::Growth => participant.wisdom_emergence_potential * 0.35 + participant.energy_level * 0.35,
            CathedralPhase::Flourishing => participant.wisdom_emergence_potential * 0.5 + (participant.pattern_recognition_count as f64 / 10.0).min(1.0) * 0.2,
        };

        if let Some(recency_index) = recent.iter().position(|id| *id == participant.participant_id) {
            let dampening = 0.3 + 0.7 * (recency_index as f64 / len.max(1) as f64);
            score *= dampening;
        }

        score *= participant.energy_level;

        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((participant.participant_id, score));
        }
        let _ = idx;
    }

    let (speaker_id, _) = best?;
    if let Some(participant) = state.participant_mut(speaker_id) {
        participant.energy_level = (participant.energy_level - ENERGY_RESTORE_DEFAULT).max(0.0);
    }
    Some(speaker_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_store::memory::InMemoryStore;

    fn orchestrator() -> DialogueOrchestrator {
        DialogueOrchestrator::new(Arc::new(PatternLibrary::new(Arc::new(InMemoryStore::new()))))
    }

    fn two_participants() -> Vec<Participant> {
        vec![Participant::new("Alice", true), Participant::new("Bob", false)]
    }

    #[test]
    fn create_transitions_to_introduction_with_system_message() {
        let orch = orchestrator();
        let id = orch.create(DialogueConfig::default(), two_participants(), None).unwrap();
        let runtime = orch.dialogues.get(&id).unwrap();
        assert_eq!(runtime.state.phase, crate::model::DialoguePhase::Introduction);
        assert_eq!(runtime.state.messages.len(), 1);
        assert_eq!(runtime.state.messages[0].consciousness_signature, 0.9);
    }

    #[test]
    fn round_robin_cycles_through_speaking_order() {
        let orch = orchestrator();
        let id = orch.create(DialogueConfig::default(), two_participants(), None).unwrap();
        let first = orch.next_speaker(id).unwrap();
        let second = orch.next_speaker(id).unwrap();
        let third = orch.next_speaker(id).unwrap();
        assert_eq!(first, third);
        assert_ne!(first, second);
    }

    #[test]
    fn add_message_updates_turns_taken_and_energy() {
        let orch = orchestrator();
        let id = orch.create(DialogueConfig::default(), two_participants(), None).unwrap();
        let speaker = orch.dialogues.get(&id).unwrap().state.participants[0].participant_id;
        let message = Message::new(Some(speaker), MessageKind::Proposal, "a proposal");
        orch.add_message(id, message, vec![]).unwrap();

        let runtime = orch.dialogues.get(&id).unwrap();
        let participant = runtime.state.participant(speaker).unwrap();
        assert_eq!(participant.turns_taken, 1);
        assert!(participant.energy_level < 1.0);
    }

    #[test]
    fn conclude_drops_state_and_returns_summary() {
        let orch = orchestrator();
        let id = orch.create(DialogueConfig::default(), two_participants(), None).unwrap();
        let summary = orch.conclude(id).unwrap();
        assert_eq!(summary.dialogue_id, id);
        assert!(orch.next_speaker(id).is_err());
    }

    #[test]
    fn consciousness_guided_forces_silence_at_high_pattern_velocity() {
        let mut state = DialogueState {
            dialogue_id: Id::new(),
            phase: crate::model::DialoguePhase::Deepening,
            turn_policy: TurnPolicy::ConsciousnessGuided,
            participants: two_participants(),
            messages: Vec::new(),
            speaking_order: two_participants().iter().map(|p| p.participant_id).collect(),
            current_turn: 0,
            created_at: Utc::now(),
            correlation_id: None,
            recent_speakers: Default::default(),
        };
        let energy_before: Vec<f64> = state.participants.iter().map(|p| p.energy_level).collect();
        let speaker = consciousness_guided(&mut state, 0.8);
        assert_eq!(speaker, None);
        for (p, before) in state.participants.iter().zip(energy_before) {
            assert!(p.energy_level >= before);
        }
    }

    #[test]
    fn facilitator_policy_always_returns_the_human_participant() {
        let orch = orchestrator();
        let mut config = DialogueConfig::default();
        config.turn_policy = Some(TurnPolicy::Facilitator);
        let id = orch.create(config, two_participants(), None).unwrap();
        let human = orch.dialogues.get(&id).unwrap().state.participants.iter().find(|p| p.is_human).unwrap().participant_id;
        assert_eq!(orch.next_speaker(id).unwrap(), Some(human));
    }
}
