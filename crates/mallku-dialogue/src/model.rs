//! §3/§4.I `DialogueState`, `Message`, `Participant` and the closed phase
//! and policy enums the orchestrator state machine runs over.

use chrono::{DateTime, Utc};
use mallku_core::ids::Id;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    Initialization,
    Introduction,
    Exploration,
    Deepening,
    Synthesis,
    Conclusion,
    Reflection,
}

impl DialoguePhase {
    /// Linear progression the orchestrator drives through; `reflection` is
    /// terminal and read-only (§4.I).
    pub fn next(self) -> Option<DialoguePhase> {
        use DialoguePhase::*;
        match self {
            Initialization => Some(Introduction),
            Introduction => Some(Exploration),
            Exploration => Some(Deepening),
            Deepening => Some(Synthesis),
            Synthesis => Some(Conclusion),
            Conclusion => Some(Reflection),
            Reflection => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DialoguePhase::Reflection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolicy {
    RoundRobin,
    Facilitator,
    Consensus,
    Reactive,
    FreeForm,
    ConsciousnessGuided,
}

/// Cathedral phase driving the consciousness-guided speaker weights
/// (§4.I step 2), named after the source's building metaphor for
/// collective maturity under stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CathedralPhase {
    Crisis,
    Growth,
    Flourishing,
}

/// Closed table of message kinds driving the consciousness_signature
/// assignment in `add_message` step (iv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    EmptyChair,
    Reflection,
    Proposal,
    Summary,
    Question,
    Disagreement,
    Contribution,
}

impl MessageKind {
    pub fn base_consciousness_signature(self) -> f64 {
        use MessageKind::*;
        match self {
            System | EmptyChair => 0.9,
            Reflection => 0.85,
            Proposal | Summary => 0.8,
            Question | Disagreement => 0.7,
            Contribution => 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Id,
    pub dialogue_id: Id,
    pub correlation_id: Option<Id>,
    pub speaker: Option<Id>,
    pub kind: MessageKind,
    pub content: String,
    pub consciousness_signature: f64,
    #[serde(default)]
    pub detected_patterns: Vec<Id>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(speaker: Option<Id>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            message_id: Id::new(),
            dialogue_id: Id::new(),
            correlation_id: None,
            speaker,
            kind,
            content: content.into(),
            consciousness_signature: kind.base_consciousness_signature(),
            detected_patterns: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: Id,
    pub name: String,
    pub is_human: bool,
    /// EMA over contribution consciousness signatures, α = 0.3.
    pub consciousness_score: f64,
    /// Signed giving − receiving running balance.
    pub reciprocity_balance: f64,
    /// Multiplicative decay of 0.9 per detected extraction event.
    pub extraction_resistance: f64,
    pub pattern_recognition_count: u64,
    pub energy_level: f64,
    pub wisdom_emergence_potential: f64,
    pub turns_taken: u64,
}

impl Participant {
    pub fn new(name: impl Into<String>, is_human: bool) -> Self {
        Self {
            participant_id: Id::new(),
            name: name.into(),
            is_human,
            consciousness_score: 0.5,
            reciprocity_balance: 0.0,
            extraction_resistance: 1.0,
            pattern_recognition_count: 0,
            energy_level: 1.0,
            wisdom_emergence_potential: 0.5,
            turns_taken: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueConfig {
    pub turn_policy: Option<TurnPolicy>,
    #[serde(default)]
    pub pattern_detection_enabled: bool,
    #[serde(default)]
    pub persist_anchors: bool,
    #[serde(default)]
    pub shuffle_speaking_order: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueState {
    pub dialogue_id: Id,
    pub phase: DialoguePhase,
    pub turn_policy: TurnPolicy,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    pub speaking_order: Vec<Id>,
    pub current_turn: usize,
    pub created_at: DateTime<Utc>,
    pub correlation_id: Option<Id>,
    /// Bounded ring of the last 5 speakers, for the speaker selector's
    /// recency dampening (§4.I step 3).
    #[serde(skip, default)]
    pub recent_speakers: VecDeque<Id>,
}

impl DialogueState {
    pub const RECENT_SPEAKER_CAPACITY: usize = 5;

    pub fn participant(&self, id: Id) -> Option<&Participant> {
        self.participants.iter().find(|p| p.participant_id == id)
    }

    pub fn participant_mut(&mut self, id: Id) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.participant_id == id)
    }

    pub fn record_speaker(&mut self, id: Id) {
        if self.recent_speakers.len() == Self::RECENT_SPEAKER_CAPACITY {
            self.recent_speakers.pop_front();
        }
        self.recent_speakers.push_back(id);
    }
}

/// Per-participant summary returned from `conclude` (§4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub participant_id: Id,
    pub turns_taken: u64,
    pub final_reciprocity_balance: f64,
    pub final_consciousness_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueSummary {
    pub dialogue_id: Id,
    pub duration_secs: i64,
    pub participant_summaries: Vec<ParticipantSummary>,
    pub average_consciousness_signature: f64,
    pub collected_wisdom_patterns: Vec<Id>,
}
