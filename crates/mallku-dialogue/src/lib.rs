//! §3/§4.H/§4.I: the `DialogueState` data model, the per-dialogue
//! Emergence Detector, and the Dialogue Orchestrator's phase state machine
//! and turn policies.

pub mod emergence;
pub mod model;
pub mod orchestrator;
mod reciprocity;

pub use emergence::{DialogueEmergenceState, EmergenceDetector, EmergenceEvent, EmergencePhase, EmergenceType};
pub use model::{
    CathedralPhase, DialogueConfig, DialoguePhase, DialogueState, DialogueSummary, Message, MessageKind, Participant,
    ParticipantSummary, TurnPolicy,
};
pub use orchestrator::DialogueOrchestrator;
