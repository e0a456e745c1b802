//! §4.D Adaptive Thresholds — precision/recall controller with durable
//! state, and the closed `CulturalGuidance` schema resolving Open
//! Question #3.

use crate::models::{CorrelationFeedback, PatternType};
use chrono::{DateTime, Utc};
use mallku_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MIN_FEEDBACK_BATCH: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveThresholdsState {
    pub confidence_threshold: f64,
    pub frequency_threshold: i64,
    pub temporal_windows: HashMap<String, f64>,
    pub learning_rate: f64,
    pub target_precision: f64,
    pub target_recall: f64,
    #[serde(default)]
    pub performance_history: Vec<PerformanceSample>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub timestamp: DateTime<Utc>,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub user_satisfaction: f64,
}

impl Default for AdaptiveThresholdsState {
    fn default() -> Self {
        let mut temporal_windows = HashMap::new();
        temporal_windows.insert("instant".to_string(), 10.0);
        temporal_windows.insert("minute".to_string(), 300.0);
        temporal_windows.insert("session".to_string(), 1_800.0);
        temporal_windows.insert("daily".to_string(), 14_400.0);
        temporal_windows.insert("cyclical".to_string(), 86_400.0);
        Self {
            confidence_threshold: 0.6,
            frequency_threshold: 3,
            temporal_windows,
            learning_rate: 0.1,
            target_precision: 0.8,
            target_recall: 0.7,
            performance_history: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

const MIN_CONFIDENCE_THRESHOLD: f64 = 0.2;
const MAX_CONFIDENCE_THRESHOLD: f64 = 0.9;
const MIN_FREQUENCY_THRESHOLD: i64 = 2;
const MAX_FREQUENCY_THRESHOLD: i64 = 10;

/// Closed schema for externally-settable cultural guidance (Open Question
/// #3): only floors may be raised, and only within existing bounds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CulturalGuidance {
    pub min_confidence_floor: Option<f64>,
    pub min_frequency_floor: Option<i64>,
    #[serde(default)]
    pub note: String,
}

pub struct AdaptiveThresholds {
    pub state: AdaptiveThresholdsState,
    path: Option<PathBuf>,
    feedback_history: Vec<CorrelationFeedback>,
}

impl AdaptiveThresholds {
    pub fn new(path: Option<&Path>) -> Self {
        let state = path
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { state, path: path.map(|p| p.to_path_buf()), feedback_history: Vec::new() }
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&self.state)?)?;
        }
        Ok(())
    }

    pub fn should_accept(&self, confidence: f64, frequency: i64, pattern_type: PatternType) -> bool {
        if frequency < self.state.frequency_threshold {
            return false;
        }
        let adjusted = self.state.confidence_threshold * pattern_type.threshold_multiplier();
        confidence >= adjusted
    }

    pub fn calculate_performance_metrics(&self, batch: &[CorrelationFeedback]) -> PerformanceSample {
        if batch.is_empty() {
            return PerformanceSample { timestamp: Utc::now(), precision: 0.0, recall: 0.0, f1_score: 0.0, user_satisfaction: 0.0 };
        }
        let positive: Vec<&CorrelationFeedback> = batch.iter().filter(|f| f.is_meaningful).collect();
        let precision = positive.len() as f64 / batch.len() as f64;
        let user_satisfaction = if positive.is_empty() {
            0.0
        } else {
            positive.iter().map(|f| f.confidence_rating).sum::<f64>() / positive.len() as f64
        };
        let recall = user_satisfaction;
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        PerformanceSample { timestamp: Utc::now(), precision, recall, f1_score, user_satisfaction }
    }

    pub fn update_from_feedback(&mut self, batch: &[CorrelationFeedback]) -> Result<PerformanceSample> {
        if batch.len() < MIN_FEEDBACK_BATCH {
            return Err(Error::stalled(format!(
                "need at least {MIN_FEEDBACK_BATCH} feedback items, got {}",
                batch.len()
            )));
        }

        self.feedback_history.extend(batch.iter().cloned());
        let metrics = self.calculate_performance_metrics(batch);
        self.state.performance_history.push(metrics.clone());

        self.adjust_thresholds(&metrics);
        self.optimize_temporal_windows(batch);
        self.state.last_updated = Utc::now();
        self.save()?;
        Ok(metrics)
    }

    fn adjust_thresholds(&mut self, metrics: &PerformanceSample) {
        if metrics.precision < self.state.target_precision {
            let adjustment = self.state.learning_rate * (self.state.target_precision - metrics.precision);
            self.state.confidence_threshold += adjustment;
        } else if metrics.recall < self.state.target_recall {
            let adjustment = self.state.learning_rate * (self.state.target_recall - metrics.recall);
            self.state.confidence_threshold -= adjustment;
        }
        self.state.confidence_threshold =
            self.state.confidence_threshold.clamp(MIN_CONFIDENCE_THRESHOLD, MAX_CONFIDENCE_THRESHOLD);

        let recent_negatives = self
            .feedback_history
            .iter()
            .rev()
            .take(50)
            .filter(|f| !f.is_meaningful)
            .count();
        if recent_negatives > 5 && metrics.precision < 0.6 {
            self.state.frequency_threshold = (self.state.frequency_threshold + 1).min(MAX_FREQUENCY_THRESHOLD);
        } else if metrics.precision > 0.9 && metrics.recall < 0.6 {
            self.state.frequency_threshold = (self.state.frequency_threshold - 1).max(MIN_FREQUENCY_THRESHOLD);
        }
    }

    fn optimize_temporal_windows(&mut self, batch: &[CorrelationFeedback]) {
        let positive = batch.iter().filter(|f| f.is_meaningful).count();
        if positive < 3 {
            return;
        }
        let satisfaction_rate = positive as f64 / batch.len() as f64;
        if satisfaction_rate > 0.8 {
            for v in self.state.temporal_windows.values_mut() {
                *v *= 1.1;
            }
        } else if satisfaction_rate < 0.5 {
            for v in self.state.temporal_windows.values_mut() {
                *v *= 0.9;
            }
        }
    }

    /// Resets to the documented defaults and re-persists (§6
    /// `reset-learning`).
    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.state = AdaptiveThresholdsState::default();
        self.feedback_history.clear();
        self.save()
    }

    /// Only ever raises floors; never lowers thresholds below their
    /// current learned value (Open Question #3 resolution).
    pub fn apply_cultural_guidance(&mut self, guidance: &CulturalGuidance) {
        if let Some(floor) = guidance.min_confidence_floor {
            self.state.confidence_threshold =
                self.state.confidence_threshold.max(floor).clamp(MIN_CONFIDENCE_THRESHOLD, MAX_CONFIDENCE_THRESHOLD);
        }
        if let Some(floor) = guidance.min_frequency_floor {
            self.state.frequency_threshold =
                self.state.frequency_threshold.max(floor).clamp(MIN_FREQUENCY_THRESHOLD, MAX_FREQUENCY_THRESHOLD);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_core::ids::Id;

    fn feedback(is_meaningful: bool, rating: f64) -> CorrelationFeedback {
        CorrelationFeedback {
            feedback_id: Id::new(),
            correlation_id: Id::new(),
            is_meaningful,
            confidence_rating: rating,
            explanation: String::new(),
            feedback_timestamp: Utc::now(),
            user_context: HashMap::new(),
            feedback_source: "test".to_string(),
            implicit_signal: false,
        }
    }

    #[test]
    fn threshold_adaptation_scenario_from_spec() {
        let mut thresholds = AdaptiveThresholds::new(None);
        let mut batch = Vec::new();
        for _ in 0..3 {
            batch.push(feedback(true, 0.9));
        }
        for _ in 0..7 {
            batch.push(feedback(false, 0.8));
        }
        let before = thresholds.state.confidence_threshold;
        thresholds.update_from_feedback(&batch).unwrap();
        let expected = (before + 0.1 * (0.8 - 0.3)).clamp(MIN_CONFIDENCE_THRESHOLD, MAX_CONFIDENCE_THRESHOLD);
        assert!((thresholds.state.confidence_threshold - expected).abs() < 1e-9);
    }

    #[test]
    fn bounds_are_always_respected() {
        let mut thresholds = AdaptiveThresholds::new(None);
        for _ in 0..20 {
            let batch: Vec<_> = (0..10).map(|_| feedback(false, 0.1)).collect();
            let _ = thresholds.update_from_feedback(&batch);
        }
        assert!(thresholds.state.confidence_threshold >= MIN_CONFIDENCE_THRESHOLD);
        assert!(thresholds.state.confidence_threshold <= MAX_CONFIDENCE_THRESHOLD);
        assert!(thresholds.state.frequency_threshold >= MIN_FREQUENCY_THRESHOLD);
        assert!(thresholds.state.frequency_threshold <= MAX_FREQUENCY_THRESHOLD);
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        {
            let mut thresholds = AdaptiveThresholds::new(Some(&path));
            thresholds.state.confidence_threshold = 0.42;
            thresholds.save().unwrap();
        }
        let reloaded = AdaptiveThresholds::new(Some(&path));
        assert!((reloaded.state.confidence_threshold - 0.42).abs() < 1e-9);
    }

    #[test]
    fn small_batch_stalls() {
        let mut thresholds = AdaptiveThresholds::new(None);
        assert!(thresholds.update_from_feedback(&[]).is_err());
    }

    #[test]
    fn cultural_guidance_only_raises_floors() {
        let mut thresholds = AdaptiveThresholds::new(None);
        thresholds.state.confidence_threshold = 0.5;
        thresholds.apply_cultural_guidance(&CulturalGuidance {
            min_confidence_floor: Some(0.3),
            min_frequency_floor: None,
            note: String::new(),
        });
        assert_eq!(thresholds.state.confidence_threshold, 0.5);
        thresholds.apply_cultural_guidance(&CulturalGuidance {
            min_confidence_floor: Some(0.7),
            min_frequency_floor: None,
            note: String::new(),
        });
        assert_eq!(thresholds.state.confidence_threshold, 0.7);
    }
}
