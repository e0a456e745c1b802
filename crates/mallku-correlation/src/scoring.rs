//! §4.C Confidence Scorer — five weighted factors, feedback-driven weight
//! adaptation (Open Question #1, resolved in SPEC_FULL.md: correlation-
//! weighted nudge with explicit renormalization).

use crate::models::{CorrelationFeedback, PatternType, TemporalCorrelation};
use mallku_core::{Error, Result};
use std::collections::HashMap;

pub const FACTOR_NAMES: [&str; 5] = [
    "temporal_consistency",
    "frequency_strength",
    "context_coherence",
    "causal_plausibility",
    "user_validation",
];

const MIN_FEEDBACK_BATCH: usize = 10;

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    pub weights: HashMap<String, f64>,
    pub learning_rate: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("temporal_consistency".to_string(), 0.30);
        weights.insert("frequency_strength".to_string(), 0.25);
        weights.insert("context_coherence".to_string(), 0.20);
        weights.insert("causal_plausibility".to_string(), 0.15);
        weights.insert("user_validation".to_string(), 0.10);
        Self { weights, learning_rate: 0.1 }
    }
}

impl ConfidenceScorer {
    pub fn score(&self, correlation: &TemporalCorrelation, feedback: &[CorrelationFeedback], now: chrono::DateTime<chrono::Utc>) -> (f64, HashMap<String, f64>) {
        let mut factors = HashMap::new();
        factors.insert("temporal_consistency".to_string(), self.temporal_consistency(correlation));
        factors.insert("frequency_strength".to_string(), self.frequency_strength(correlation));
        factors.insert("context_coherence".to_string(), self.context_coherence(correlation));
        factors.insert("causal_plausibility".to_string(), self.causal_plausibility(correlation));
        factors.insert("user_validation".to_string(), self.user_validation(correlation, feedback, now));

        let score: f64 = FACTOR_NAMES
            .iter()
            .map(|name| factors[*name] * self.weights.get(*name).copied().unwrap_or(0.0))
            .sum();
        (score.clamp(0.0, 1.0), factors)
    }

    fn temporal_consistency(&self, c: &TemporalCorrelation) -> f64 {
        let mean = c.temporal_gap.num_milliseconds() as f64 / 1000.0;
        if mean > 0.0 {
            let std = c.gap_variance.sqrt();
            let cv = std / mean;
            1.0 / (1.0 + cv)
        } else if c.pattern_stability > 0.0 {
            c.pattern_stability
        } else {
            0.5
        }
    }

    fn frequency_strength(&self, c: &TemporalCorrelation) -> f64 {
        (1.0 - (-(c.occurrence_frequency as f64) / 10.0).exp()).clamp(0.0, 1.0)
    }

    fn context_coherence(&self, c: &TemporalCorrelation) -> f64 {
        let mut all_events = vec![&c.primary_event];
        all_events.extend(c.correlated_events.iter());
        if all_events.len() < 2 {
            return 0.5;
        }

        let key_sets: Vec<std::collections::HashSet<String>> =
            all_events.iter().map(|e| e.context.keys().cloned().collect()).collect();
        let has_any_context = key_sets.iter().any(|s| !s.is_empty());
        if !has_any_context {
            return 0.3;
        }

        let jaccard = mean_pairwise_jaccard(&key_sets);

        let mut common_keys: Option<std::collections::HashSet<String>> = None;
        for s in &key_sets {
            common_keys = Some(match common_keys {
                None => s.clone(),
                Some(prev) => prev.intersection(s).cloned().collect(),
            });
        }
        let common_keys = common_keys.unwrap_or_default();
        let value_agreement = if common_keys.is_empty() {
            0.5
        } else {
            let mut scores = Vec::new();
            for key in &common_keys {
                let distinct: std::collections::HashSet<String> = all_events
                    .iter()
                    .filter_map(|e| e.context.get(key).map(|v| v.to_string()))
                    .collect();
                scores.push(1.0 / distinct.len().max(1) as f64);
            }
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let hours: Vec<f64> = all_events.iter().map(|e| e.timestamp.time().hour() as f64).collect();
        let weekdays: Vec<f64> = all_events
            .iter()
            .map(|e| e.timestamp.date_naive().weekday().num_days_from_monday() as f64)
            .collect();
        let (_, hour_var) = mean_and_variance(&hours);
        let (_, weekday_var) = mean_and_variance(&weekdays);
        let temporal_context_similarity =
            (1.0 - (hour_var.sqrt() / 12.0)).clamp(0.0, 1.0) * 0.5 + (1.0 - (weekday_var.sqrt() / 3.5)).clamp(0.0, 1.0) * 0.5;

        let distinct_types: std::collections::HashSet<String> =
            all_events.iter().map(|e| format!("{:?}", e.event_type)).collect();
        let distinct_streams: std::collections::HashSet<String> =
            all_events.iter().map(|e| e.stream_id.clone()).collect();
        let type_stream_consistency =
            (1.0 / distinct_types.len().max(1) as f64 + 1.0 / distinct_streams.len().max(1) as f64) / 2.0;

        (jaccard + value_agreement + temporal_context_similarity + type_stream_consistency) / 4.0
    }

    fn causal_plausibility(&self, c: &TemporalCorrelation) -> f64 {
        let ordering_plausibility = if matches!(c.pattern_type, PatternType::Sequential) { 0.7 } else { 0.5 };
        let gap_secs = c.temporal_gap.num_milliseconds() as f64 / 1000.0;
        let gap_score = reasonable_gap_score(gap_secs);
        let event_compatibility = event_compatibility_score(c);
        let logical_consistency = (0.4 + c.pattern_stability).min(0.8);
        (ordering_plausibility + gap_score + event_compatibility + logical_consistency) / 4.0
    }

    fn user_validation(&self, c: &TemporalCorrelation, feedback: &[CorrelationFeedback], now: chrono::DateTime<chrono::Utc>) -> f64 {
        let relevant: Vec<&CorrelationFeedback> =
            feedback.iter().filter(|f| f.correlation_id == c.correlation_id).collect();
        if relevant.is_empty() {
            return 0.5;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for f in relevant {
            let age_days = (now - f.feedback_timestamp).num_milliseconds() as f64 / 86_400_000.0;
            if age_days > 30.0 {
                continue;
            }
            let weight = (-age_days / 30.0).exp();
            let score = if f.is_meaningful { f.confidence_rating } else { 1.0 - f.confidence_rating };
            weighted_sum += weight * score;
            weight_total += weight;
        }
        if weight_total == 0.0 {
            0.5
        } else {
            weighted_sum / weight_total
        }
    }

    /// §4.C `update_from_feedback`: nudges each factor's weight by
    /// `learning_rate * correlation(factor_value, is_meaningful)`, floors
    /// at zero, renormalizes to sum to one.
    pub fn update_from_feedback(
        &mut self,
        batch: &[(TemporalCorrelation, CorrelationFeedback)],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<HashMap<String, f64>> {
        if batch.len() < MIN_FEEDBACK_BATCH {
            return Err(Error::stalled(format!(
                "need at least {MIN_FEEDBACK_BATCH} feedback items, got {}",
                batch.len()
            )));
        }

        let outcomes: Vec<f64> = batch.iter().map(|(_, f)| if f.is_meaningful { 1.0 } else { 0.0 }).collect();

        for name in FACTOR_NAMES {
            let values: Vec<f64> = batch
                .iter()
                .map(|(c, _)| {
                    let (_, factors) = self.score(c, &[], now);
                    factors[name]
                })
                .collect();
            let corr = point_biserial_correlation(&values, &outcomes);
            let weight = self.weights.entry(name.to_string()).or_insert(0.0);
            *weight = (*weight + self.learning_rate * corr).max(0.0);
        }

        let total: f64 = self.weights.values().sum();
        if total > 0.0 {
            for w in self.weights.values_mut() {
                *w /= total;
            }
        }

        Ok(self.weights.clone())
    }
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance)
}

fn point_biserial_correlation(values: &[f64], outcomes: &[f64]) -> f64 {
    let (mean_v, var_v) = mean_and_variance(values);
    let (mean_o, var_o) = mean_and_variance(outcomes);
    if var_v == 0.0 || var_o == 0.0 {
        return 0.0;
    }
    let n = values.len() as f64;
    let covariance = values
        .iter()
        .zip(outcomes.iter())
        .map(|(v, o)| (v - mean_v) * (o - mean_o))
        .sum::<f64>()
        / n;
    covariance / (var_v.sqrt() * var_o.sqrt())
}

fn mean_pairwise_jaccard(key_sets: &[std::collections::HashSet<String>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0;
    for i in 0..key_sets.len() {
        for j in (i + 1)..key_sets.len() {
            let union = key_sets[i].union(&key_sets[j]).count();
            let intersection = key_sets[i].intersection(&key_sets[j]).count();
            if union > 0 {
                total += intersection as f64 / union as f64;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn reasonable_gap_score(gap_secs: f64) -> f64 {
    if gap_secs < 60.0 {
        0.6
    } else if gap_secs < 14_400.0 {
        1.0
    } else if gap_secs < 86_400.0 {
        0.7
    } else {
        0.4
    }
}

fn event_compatibility_score(c: &TemporalCorrelation) -> f64 {
    use mallku_core::event::EventType;
    let a = c.primary_event.event_type;
    let b = c.correlated_events.first().map(|e| e.event_type);
    match (a, b) {
        (EventType::Activity, Some(EventType::Storage)) | (EventType::Storage, Some(EventType::Activity)) => 0.8,
        (EventType::Communication, Some(EventType::Activity)) | (EventType::Activity, Some(EventType::Communication)) => 0.7,
        (EventType::Environmental, Some(EventType::Activity)) | (EventType::Activity, Some(EventType::Environmental)) => 0.6,
        _ => 0.5,
    }
}

use chrono::{Datelike, Timelike};

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_core::event::{Event, EventType};
    use mallku_core::ids::Id;
    use crate::models::TemporalPrecision;

    fn sample_correlation() -> TemporalCorrelation {
        let primary = Event::new(EventType::Communication, "s1");
        let mut factors = HashMap::new();
        factors.insert("raw_confidence".to_string(), 0.7);
        TemporalCorrelation {
            correlation_id: Id::new(),
            primary_event: primary.clone(),
            correlated_events: vec![primary],
            temporal_gap: chrono::Duration::seconds(5),
            gap_variance: 1.0,
            temporal_precision: TemporalPrecision::Instant,
            occurrence_frequency: 3,
            pattern_stability: 0.9,
            pattern_type: PatternType::Sequential,
            confidence_score: 0.0,
            confidence_factors: factors,
            detection_timestamp: chrono::Utc::now(),
            last_occurrence: chrono::Utc::now(),
        }
    }

    #[test]
    fn empty_feedback_gives_neutral_user_validation() {
        let scorer = ConfidenceScorer::default();
        let c = sample_correlation();
        let (_, factors) = scorer.score(&c, &[], chrono::Utc::now());
        assert_eq!(factors["user_validation"], 0.5);
    }

    #[test]
    fn score_is_within_unit_interval() {
        let scorer = ConfidenceScorer::default();
        let c = sample_correlation();
        let (score, _) = scorer.score(&c, &[], chrono::Utc::now());
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn weights_sum_to_one_after_update() {
        let mut scorer = ConfidenceScorer::default();
        let now = chrono::Utc::now();
        let batch: Vec<_> = (0..12)
            .map(|i| {
                let mut c = sample_correlation();
                c.occurrence_frequency = i + 1;
                let feedback = CorrelationFeedback {
                    feedback_id: Id::new(),
                    correlation_id: c.correlation_id,
                    is_meaningful: i % 2 == 0,
                    confidence_rating: 0.8,
                    explanation: String::new(),
                    feedback_timestamp: now,
                    user_context: HashMap::new(),
                    feedback_source: "test".to_string(),
                    implicit_signal: false,
                };
                (c, feedback)
            })
            .collect();
        scorer.update_from_feedback(&batch, now).unwrap();
        let total: f64 = scorer.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(scorer.weights.values().all(|w| *w >= 0.0));
    }

    #[test]
    fn small_batch_stalls() {
        let mut scorer = ConfidenceScorer::default();
        let now = chrono::Utc::now();
        let batch = vec![];
        assert!(scorer.update_from_feedback(&batch, now).is_err());
    }
}
