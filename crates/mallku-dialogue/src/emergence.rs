//! §4.H Emergence Detector — per-dialogue consciousness-emergence
//! recognition over a bounded window of recent messages.

use chrono::{DateTime, Utc};
use mallku_core::ids::Id;
use mallku_patterns::{Pattern, PatternLibrary, PatternType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

const RING_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergenceType {
    Synergistic,
    Breakthrough,
    Cascade,
    PhaseTransition,
    QuantumLeap,
}

impl EmergenceType {
    fn threshold(self) -> f64 {
        use EmergenceType::*;
        match self {
            Synergistic => 0.7,
            Breakthrough => 0.85,
            Cascade => 0.6,
            PhaseTransition => 0.8,
            QuantumLeap => 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencePhase {
    Incubation,
    Threshold,
    Breakthrough,
    Integration,
    Crystallization,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmergenceEvent {
    pub event_id: Id,
    pub dialogue_id: Id,
    pub kind: EmergenceType,
    pub phase: EmergencePhase,
    pub confidence: f64,
    pub participating_patterns: Vec<Id>,
    pub catalyst_patterns: Vec<Id>,
    pub resulting_patterns: Vec<Id>,
    pub consciousness_delta: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RecentMessage {
    consciousness_signature: f64,
    pattern_ids: Vec<Id>,
    timestamp: DateTime<Utc>,
}

/// Per-dialogue emergence state. Cross-dialogue emergence is out of scope
/// (§9 open question #2): this type holds one dialogue's state only.
pub struct DialogueEmergenceState {
    dialogue_id: Id,
    recent: VecDeque<RecentMessage>,
    current_patterns: HashSet<Id>,
    coherence_level: f64,
    tension_level: f64,
    participant_alignment: f64,
    phase_history: Vec<EmergencePhase>,
    interaction_weights: HashMap<(Id, Id), f64>,
}

impl DialogueEmergenceState {
    pub fn new(dialogue_id: Id) -> Self {
        Self {
            dialogue_id,
            recent: VecDeque::new(),
            current_patterns: HashSet::new(),
            coherence_level: 0.5,
            tension_level: 0.0,
            participant_alignment: 0.5,
            phase_history: Vec::new(),
            interaction_weights: HashMap::new(),
        }
    }

    pub fn pattern_velocity(&self) -> f64 {
        self.current_patterns.len() as f64 / self.recent.len().max(1) as f64
    }

    pub fn record_message(&mut self, consciousness_signature: f64, pattern_ids: Vec<Id>, timestamp: DateTime<Utc>) {
        for window in pattern_ids.windows(2) {
            let key = order_pair(window[0], window[1]);
            *self.interaction_weights.entry(key).or_insert(0.0) += 0.2;
        }
        for id in &pattern_ids {
            self.current_patterns.insert(*id);
        }
        if self.recent.len() == RING_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(RecentMessage { consciousness_signature, pattern_ids, timestamp });
    }

    pub fn update_coherence(&mut self, coherence_level: f64, tension_level: f64, participant_alignment: f64) {
        self.coherence_level = coherence_level;
        self.tension_level = tension_level;
        self.participant_alignment = participant_alignment;
    }

    fn interaction_weight(&self, a: Id, b: Id) -> f64 {
        *self.interaction_weights.get(&order_pair(a, b)).unwrap_or(&0.0)
    }
}

fn order_pair(a: Id, b: Id) -> (Id, Id) {
    if a.as_uuid() <= b.as_uuid() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Closed table of pattern types considered complementary for synergy
/// scoring (§4.H "complementary types table").
fn complementary(a: PatternType, b: PatternType) -> bool {
    use PatternType::*;
    matches!(
        (a, b),
        (Convergence, Divergence)
            | (Divergence, Convergence)
            | (CreativeTension, Synthesis)
            | (Synthesis, CreativeTension)
            | (Oscillation, Spiral)
            | (Spiral, Oscillation)
            | (Consensus, NovelCombination)
            | (NovelCombination, Consensus)
    )
}

pub struct EmergenceDetector {
    library: Arc<PatternLibrary>,
    sensitivity: f64,
}

impl EmergenceDetector {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library, sensitivity: 1.0 }
    }

    pub fn with_sensitivity(library: Arc<PatternLibrary>, sensitivity: f64) -> Self {
        Self { library, sensitivity }
    }

    fn pattern_meta(&self, id: Id) -> Option<Pattern> {
        self.library.cached(id)
    }

    /// Runs all five emergence kinds once; each returns at most one event.
    pub fn detect(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Vec<EmergenceEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.detect_synergistic(state, now) {
            events.push(e);
        }
        if let Some(e) = self.detect_breakthrough(state, now) {
            events.push(e);
        }
        if let Some(e) = self.detect_cascade(state, now) {
            events.push(e);
        }
        if let Some(e) = self.detect_phase_transition(state, now) {
            events.push(e);
        }
        if let Some(e) = self.detect_quantum_leap(state, now) {
            events.push(e);
        }
        events
    }

    fn detect_synergistic(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Option<EmergenceEvent> {
        let patterns: Vec<Id> = state.current_patterns.iter().copied().collect();
        let mut best: Option<(Id, Id, f64)> = None;

        for i in 0..patterns.len() {
            for j in (i + 1)..patterns.len() {
                let (p1, p2) = (patterns[i], patterns[j]);
                let meta1 = self.pattern_meta(p1);
                let meta2 = self.pattern_meta(p2);

                let mut score = 0.0;
                let declared_synergy = meta1
                    .as_ref()
                    .map(|m| m.synergistic_patterns.contains(&p2))
                    .unwrap_or(false)
                    || meta2.as_ref().map(|m| m.synergistic_patterns.contains(&p1)).unwrap_or(false);
                if declared_synergy {
                    score += 0.4;
                }

                let c1 = meta1.as_ref().map(|m| m.consciousness_signature).unwrap_or(0.5);
                let c2 = meta2.as_ref().map(|m| m.consciousness_signature).unwrap_or(0.5);
                score += (1.0 - (c1 - c2).abs()) * 0.2;

                if let (Some(m1), Some(m2)) = (&meta1, &meta2) {
                    if complementary(m1.pattern_type, m2.pattern_type) {
                        score += 0.3;
                    }
                }

                if state.coherence_level > 0.7 {
                    score *= 1.2;
                }

                let interaction = state.interaction_weight(p1, p2);
                score += (interaction / (interaction + 1.0)).min(1.0) * 0.1;

                let score = score.min(1.0);
                if best.map(|(_, _, s)| score > s).unwrap_or(true) {
                    best = Some((p1, p2, score));
                }
            }
        }

        let (p1, p2, score) = best?;
        if score < EmergenceType::Synergistic.threshold() * self.sensitivity {
            return None;
        }
        Some(EmergenceEvent {
            event_id: Id::new(),
            dialogue_id: state.dialogue_id,
            kind: EmergenceType::Synergistic,
            phase: EmergencePhase::Threshold,
            confidence: score,
            participating_patterns: vec![p1, p2],
            catalyst_patterns: vec![p1],
            resulting_patterns: Vec::new(),
            consciousness_delta: 0.0,
            timestamp: now,
        })
    }

    fn detect_breakthrough(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Option<EmergenceEvent> {
        let samples: Vec<f64> = state.recent.iter().map(|m| m.consciousness_signature).collect();
        if samples.len() < 3 {
            return None;
        }
        let max_delta = samples.windows(2).map(|w| (w[1] - w[0]).abs()).fold(0.0_f64, f64::max);
        let baseline = samples[..samples.len() - 1].iter().sum::<f64>() / (samples.len() - 1) as f64;
        let last = *samples.last().unwrap();

        let mut score = 0.0;
        if max_delta > 0.3 {
            score += 0.4;
        }
        if state.pattern_velocity() > 0.5 {
            score += 0.3;
        }
        if last > baseline * 1.5 {
            score += 0.3;
        }
        let score = score.min(1.0);
        if score < EmergenceType::Breakthrough.threshold() * self.sensitivity {
            return None;
        }

        let patterns: Vec<Id> = state.current_patterns.iter().copied().collect();
        Some(EmergenceEvent {
            event_id: Id::new(),
            dialogue_id: state.dialogue_id,
            kind: EmergenceType::Breakthrough,
            phase: EmergencePhase::Breakthrough,
            confidence: score,
            participating_patterns: patterns.clone(),
            catalyst_patterns: patterns,
            resulting_patterns: Vec::new(),
            consciousness_delta: last - baseline,
            timestamp: now,
        })
    }

    fn detect_cascade(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Option<EmergenceEvent> {
        let sequence: Vec<Id> = state.recent.iter().flat_map(|m| m.pattern_ids.iter().copied()).collect();
        if sequence.len() < 2 {
            return None;
        }
        let mut best_chain = 1usize;
        let mut current_chain = 1usize;
        for window in sequence.windows(2) {
            if state.interaction_weight(window[0], window[1]) > 0.3 {
                current_chain += 1;
                best_chain = best_chain.max(current_chain);
            } else {
                current_chain = 1;
            }
        }
        let score = (best_chain as f64 / sequence.len() as f64).min(1.0);
        if score < EmergenceType::Cascade.threshold() * self.sensitivity {
            return None;
        }
        Some(EmergenceEvent {
            event_id: Id::new(),
            dialogue_id: state.dialogue_id,
            kind: EmergenceType::Cascade,
            phase: EmergencePhase::Integration,
            confidence: score,
            participating_patterns: sequence.clone(),
            catalyst_patterns: sequence.into_iter().take(1).collect(),
            resulting_patterns: Vec::new(),
            consciousness_delta: 0.0,
            timestamp: now,
        })
    }

    fn detect_phase_transition(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Option<EmergenceEvent> {
        if state.recent.len() < 10 {
            return None;
        }
        let first_five: Vec<&RecentMessage> = state.recent.iter().take(5).collect();
        let last_five: Vec<&RecentMessage> = state.recent.iter().rev().take(5).collect();

        let coherence_first = first_five.iter().map(|m| m.consciousness_signature).sum::<f64>() / 5.0;
        let coherence_last = last_five.iter().map(|m| m.consciousness_signature).sum::<f64>() / 5.0;

        let mut score = 0.0;
        if (coherence_last - coherence_first).abs() > 0.3 {
            score += 0.4;
        }

        let first_types: HashSet<Id> = first_five.iter().flat_map(|m| m.pattern_ids.iter().copied()).collect();
        let last_types: HashSet<Id> = last_five.iter().flat_map(|m| m.pattern_ids.iter().copied()).collect();
        if !first_types.symmetric_difference(&last_types).collect::<HashSet<_>>().is_empty() {
            score += 0.3;
        }

        let candidate_phase = if coherence_last > coherence_first { EmergencePhase::Integration } else { EmergencePhase::Threshold };
        if !state.phase_history.contains(&candidate_phase) {
            score += 0.3;
        }

        let score = score.min(1.0);
        if score < EmergenceType::PhaseTransition.threshold() * self.sensitivity {
            return None;
        }
        Some(EmergenceEvent {
            event_id: Id::new(),
            dialogue_id: state.dialogue_id,
            kind: EmergenceType::PhaseTransition,
            phase: candidate_phase,
            confidence: score,
            participating_patterns: last_types.into_iter().collect(),
            catalyst_patterns: Vec::new(),
            resulting_patterns: Vec::new(),
            consciousness_delta: coherence_last - coherence_first,
            timestamp: now,
        })
    }

    fn detect_quantum_leap(&self, state: &DialogueEmergenceState, now: DateTime<Utc>) -> Option<EmergenceEvent> {
        let samples: Vec<f64> = state.recent.iter().map(|m| m.consciousness_signature).collect();
        if samples.len() < 3 {
            return None;
        }
        let jump_idx = samples.windows(2).enumerate().max_by(|(_, a), (_, b)| {
            (a[1] - a[0]).abs().partial_cmp(&(b[1] - b[0]).abs()).unwrap_or(std::cmp::Ordering::Equal)
        });
        let Some((idx, window)) = jump_idx else { return None };
        let jump = (window[1] - window[0]).abs();

        let mut score = 0.0;
        if jump > 0.4 {
            score += 0.5;
        }

        let pre: Vec<f64> = samples[..=idx].to_vec();
        let post: Vec<f64> = samples[idx + 1..].to_vec();
        if !pre.is_empty() && !post.is_empty() {
            let pre_avg = pre.iter().sum::<f64>() / pre.len() as f64;
            let post_avg = post.iter().sum::<f64>() / post.len() as f64;
            if post_avg > pre_avg * 1.5 {
                score += 0.3;
            }
        }

        let unique: HashSet<Id> = state.recent.iter().flat_map(|m| m.pattern_ids.iter().copied()).collect();
        let total: usize = state.recent.iter().map(|m| m.pattern_ids.len()).sum();
        if total > 0 && (unique.len() as f64 / total as f64) > 0.7 {
            score += 0.2;
        }

        let score = score.min(1.0);
        if score < EmergenceType::QuantumLeap.threshold() * self.sensitivity {
            return None;
        }
        let patterns: Vec<Id> = state.current_patterns.iter().copied().collect();
        Some(EmergenceEvent {
            event_id: Id::new(),
            dialogue_id: state.dialogue_id,
            kind: EmergenceType::QuantumLeap,
            phase: EmergencePhase::Crystallization,
            confidence: score,
            participating_patterns: patterns.clone(),
            catalyst_patterns: patterns,
            resulting_patterns: Vec::new(),
            consciousness_delta: jump,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_store::memory::InMemoryStore;

    fn detector() -> EmergenceDetector {
        EmergenceDetector::new(Arc::new(PatternLibrary::new(Arc::new(InMemoryStore::new()))))
    }

    #[test]
    fn fewer_than_three_samples_yields_no_breakthrough_or_quantum_leap() {
        let d = detector();
        let mut state = DialogueEmergenceState::new(Id::new());
        state.record_message(0.5, vec![], Utc::now());
        state.record_message(0.9, vec![], Utc::now());
        assert!(d.detect_breakthrough(&state, Utc::now()).is_none());
        assert!(d.detect_quantum_leap(&state, Utc::now()).is_none());
    }

    #[test]
    fn large_consciousness_jump_triggers_quantum_leap() {
        let d = detector();
        let mut state = DialogueEmergenceState::new(Id::new());
        state.record_message(0.2, vec![], Utc::now());
        state.record_message(0.2, vec![], Utc::now());
        state.record_message(0.9, vec![], Utc::now());
        state.record_message(0.9, vec![], Utc::now());
        let event = d.detect_quantum_leap(&state, Utc::now());
        assert!(event.is_some());
    }

    #[test]
    fn pattern_velocity_is_fraction_of_recent_with_active_patterns() {
        let mut state = DialogueEmergenceState::new(Id::new());
        let p1 = Id::new();
        state.record_message(0.5, vec![p1], Utc::now());
        state.record_message(0.5, vec![], Utc::now());
        assert!((state.pattern_velocity() - 0.5).abs() < 1e-9);
    }
}
