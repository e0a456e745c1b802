//! §3/§4.F closed-set taxonomies: `PatternType`, `PatternTaxonomy`,
//! `PatternLifecycle`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Convergence,
    Divergence,
    Oscillation,
    Spiral,
    Consensus,
    CreativeTension,
    Synthesis,
    Breakthrough,
    CoherenceSpike,
    ExtractionDrift,
    FlowState,
    Integration,
    NovelCombination,
    CascadeEffect,
    PhaseTransition,
    QuantumLeap,
}

/// Hierarchical classification: a primary category plus an optional
/// subcategory, closed over the taxonomy enumerated in `original_source`'s
/// `pattern_library.py` (§3 "hierarchical tag from a closed set").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTaxonomy {
    Dialogue,
    DialogueFormation,
    DialogueFlow,
    DialogueResolution,
    Consciousness,
    ConsciousnessCoherence,
    ConsciousnessResistance,
    ConsciousnessEvolution,
    Emergence,
    EmergenceSynergy,
    EmergenceBreakthrough,
    EmergenceTransformation,
    Wisdom,
    WisdomCrystallization,
    WisdomTransmission,
    WisdomPreservation,
}

impl PatternTaxonomy {
    /// Compatible taxonomies for synergy discovery (§4.F `find_synergies`),
    /// grounded on `pattern_library.py`'s `_get_compatible_taxonomies` map.
    pub fn compatible(self) -> &'static [PatternTaxonomy] {
        use PatternTaxonomy::*;
        match self {
            DialogueFlow => &[ConsciousnessCoherence, EmergenceSynergy],
            ConsciousnessCoherence => &[WisdomCrystallization, EmergenceBreakthrough],
            EmergenceSynergy => &[DialogueFlow, WisdomTransmission],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternLifecycle {
    Nascent,
    Emerging,
    Established,
    Evolving,
    Declining,
    Dormant,
    Transformed,
}

impl PatternLifecycle {
    /// §8: `dormant` never transitions back to a non-dormant state except
    /// via explicit evolution producing a new `pattern_id`; this validates
    /// in-place lifecycle transitions (evolution always creates a new
    /// pattern, so it is exempt from this check by construction).
    pub fn can_transition_to(self, next: PatternLifecycle) -> bool {
        use PatternLifecycle::*;
        if self == Dormant {
            return next == Dormant;
        }
        matches!(
            (self, next),
            (Nascent, Emerging)
                | (Nascent, Nascent)
                | (Emerging, Established)
                | (Emerging, Emerging)
                | (Emerging, Evolving)
                | (Established, Evolving)
                | (Established, Declining)
                | (Established, Established)
                | (Evolving, Established)
                | (Evolving, Emerging)
                | (Evolving, Evolving)
                | (Declining, Dormant)
                | (Declining, Established)
                | (Declining, Declining)
                | (_, Transformed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dormant_cannot_transition_to_non_dormant() {
        assert!(!PatternLifecycle::Dormant.can_transition_to(PatternLifecycle::Emerging));
        assert!(PatternLifecycle::Dormant.can_transition_to(PatternLifecycle::Dormant));
    }

    #[test]
    fn compatible_taxonomies_are_closed() {
        assert_eq!(
            PatternTaxonomy::DialogueFlow.compatible(),
            &[PatternTaxonomy::ConsciousnessCoherence, PatternTaxonomy::EmergenceSynergy]
        );
        assert!(PatternTaxonomy::Dialogue.compatible().is_empty());
    }
}
