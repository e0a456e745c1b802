//! §4.B Pattern Detectors — sequential, concurrent, cyclical, contextual.

use crate::models::{CorrelationWindow, PatternType, TemporalCorrelation, TemporalPrecision};
use chrono::Duration;
use mallku_core::event::Event;
use mallku_core::ids::Id;
use std::collections::{HashMap, HashSet};

const MAX_REPRESENTATIVES: usize = 5;

pub trait Detector {
    fn pattern_type(&self) -> PatternType;
    fn detect(&self, window: &CorrelationWindow, min_occurrences: usize, min_confidence: f64) -> Vec<TemporalCorrelation>;
}

/// Group events by `(event_type, stream_id)`, time-sorted within each
/// group (common pre-step shared by all four detectors).
fn group_events(window: &CorrelationWindow) -> Vec<((String, String), Vec<&Event>)> {
    let mut groups: HashMap<(String, String), Vec<&Event>> = HashMap::new();
    for e in &window.events {
        let key = (format!("{:?}", e.event_type), e.stream_id.clone());
        groups.entry(key).or_default().push(e);
    }
    let mut out: Vec<_> = groups.into_iter().collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn precision_from_gap_secs(gap_secs: f64) -> TemporalPrecision {
    if gap_secs < 60.0 {
        TemporalPrecision::Instant
    } else if gap_secs < 300.0 {
        TemporalPrecision::Minute
    } else if gap_secs < 1800.0 {
        TemporalPrecision::Session
    } else if gap_secs < 14_400.0 {
        TemporalPrecision::Daily
    } else {
        TemporalPrecision::Cyclical
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

fn stability_from_cv(mean: f64, variance: f64) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    let cv = variance.sqrt() / mean;
    1.0 / (1.0 + cv)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn context_keys(e: &Event) -> HashSet<String> {
    e.context.keys().cloned().collect()
}

fn build_correlation(
    primary: Event,
    correlated: Vec<Event>,
    temporal_gap: Duration,
    gap_variance: f64,
    precision: TemporalPrecision,
    frequency: usize,
    stability: f64,
    pattern_type: PatternType,
    raw_confidence: f64,
    now: chrono::DateTime<chrono::Utc>,
) -> TemporalCorrelation {
    let last_occurrence = correlated
        .iter()
        .map(|e| e.timestamp)
        .chain(std::iter::once(primary.timestamp))
        .max()
        .unwrap_or(primary.timestamp);
    let mut factors = HashMap::new();
    factors.insert("raw_confidence".to_string(), raw_confidence);
    TemporalCorrelation {
        correlation_id: Id::new(),
        primary_event: primary,
        correlated_events: correlated.into_iter().take(MAX_REPRESENTATIVES).collect(),
        temporal_gap,
        gap_variance,
        temporal_precision: precision,
        occurrence_frequency: frequency,
        pattern_stability: stability,
        pattern_type,
        confidence_score: raw_confidence.clamp(0.0, 1.0),
        confidence_factors: factors,
        detection_timestamp: now,
        last_occurrence,
    }
}

pub struct SequentialDetector;

impl Detector for SequentialDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Sequential
    }

    fn detect(&self, window: &CorrelationWindow, min_occurrences: usize, min_confidence: f64) -> Vec<TemporalCorrelation> {
        let groups = group_events(window);
        let mut out = Vec::new();
        let now = chrono::Utc::now();

        for i in 0..groups.len() {
            for j in 0..groups.len() {
                if i == j {
                    continue;
                }
                let (_, a_events) = &groups[i];
                let (_, b_events) = &groups[j];
                let mut gaps = Vec::new();
                let mut pairs: Vec<(&Event, &Event)> = Vec::new();
                for a in a_events {
                    for b in b_events {
                        if b.timestamp > a.timestamp && b.timestamp - a.timestamp <= Duration::hours(24) {
                            gaps.push((b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0);
                            pairs.push((a, b));
                        }
                    }
                }
                if gaps.len() < min_occurrences {
                    continue;
                }
                let (mean, variance) = mean_and_variance(&gaps);
                let stability = stability_from_cv(mean, variance);
                let frequency_score = (gaps.len() as f64 / 10.0).min(1.0);
                let raw_confidence = (frequency_score + stability) / 2.0;
                if raw_confidence < min_confidence {
                    continue;
                }
                let primary = pairs[0].0.clone();
                let correlated: Vec<Event> = pairs.iter().map(|(_, b)| (*b).clone()).collect();
                let precision = precision_from_gap_secs(mean);
                out.push(build_correlation(
                    primary,
                    correlated,
                    Duration::milliseconds((mean * 1000.0) as i64),
                    variance,
                    precision,
                    gaps.len(),
                    stability,
                    PatternType::Sequential,
                    raw_confidence,
                    now,
                ));
            }
        }
        out
    }
}

pub struct ConcurrentDetector;

const CONCURRENT_HORIZONS: [f64; 3] = [30.0, 120.0, 300.0];

impl Detector for ConcurrentDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Concurrent
    }

    fn detect(&self, window: &CorrelationWindow, min_occurrences: usize, min_confidence: f64) -> Vec<TemporalCorrelation> {
        let groups = group_events(window);
        let mut out = Vec::new();
        let now = chrono::Utc::now();

        for horizon in CONCURRENT_HORIZONS {
            for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    let (_, a_events) = &groups[i];
                    let (_, b_events) = &groups[j];
                    let mut gaps = Vec::new();
                    let mut pairs: Vec<(&Event, &Event)> = Vec::new();
                    let mut coherences = Vec::new();
                    for a in a_events {
                        for b in b_events {
                            let gap = (a.timestamp - b.timestamp).num_milliseconds().abs() as f64 / 1000.0;
                            if gap <= horizon {
                                gaps.push(gap);
                                pairs.push((a, b));
                                coherences.push(jaccard(&context_keys(a), &context_keys(b)));
                            }
                        }
                    }
                    if gaps.len() < min_occurrences {
                        continue;
                    }
                    let mean_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
                    let stability = (1.0 - mean_gap / horizon).clamp(0.0, 1.0);
                    let frequency_score = (gaps.len() as f64 / 10.0).min(1.0);
                    let context_coherence = if coherences.is_empty() {
                        0.0
                    } else {
                        coherences.iter().sum::<f64>() / coherences.len() as f64
                    };
                    let raw_confidence = (frequency_score + stability + context_coherence) / 3.0;
                    if raw_confidence < min_confidence {
                        continue;
                    }
                    let (mean, variance) = mean_and_variance(&gaps);
                    let precision = if horizon <= 30.0 {
                        TemporalPrecision::Instant
                    } else {
                        TemporalPrecision::Minute
                    };
                    let primary = pairs[0].0.clone();
                    let correlated: Vec<Event> = pairs.iter().map(|(_, b)| (*b).clone()).collect();
                    out.push(build_correlation(
                        primary,
                        correlated,
                        Duration::milliseconds((mean * 1000.0) as i64),
                        variance,
                        precision,
                        gaps.len(),
                        stability,
                        PatternType::Concurrent,
                        raw_confidence,
                        now,
                    ));
                }
            }
        }
        out
    }
}

const PERIODS: [(f64, &str); 4] = [
    (3600.0, "hourly"),
    (86_400.0, "daily"),
    (604_800.0, "weekly"),
    (2_629_746.0, "monthly"),
];

pub struct CyclicalDetector;

impl Detector for CyclicalDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Cyclical
    }

    fn detect(&self, window: &CorrelationWindow, _min_occurrences: usize, min_confidence: f64) -> Vec<TemporalCorrelation> {
        let groups = group_events(window);
        let mut out = Vec::new();
        let now = chrono::Utc::now();

        for (_, events) in groups {
            if events.len() < 3 {
                continue;
            }
            let intervals: Vec<f64> = events
                .windows(2)
                .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
                .collect();

            let mut best: Option<(f64, f64)> = None; // (period, strength)
            for (period, _name) in PERIODS {
                let deviations: Vec<f64> = intervals
                    .iter()
                    .map(|interval| {
                        let cycles = (interval / period).round();
                        (interval - cycles * period).abs() / period
                    })
                    .collect();
                let mean_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;
                let strength = (1.0 - mean_deviation).max(0.0);
                if strength >= 0.5 && best.map(|(_, s)| strength > s).unwrap_or(true) {
                    best = Some((period, strength));
                }
            }

            if let Some((period, strength)) = best {
                let frequency_score = (events.len() as f64 / 10.0).min(1.0);
                let raw_confidence = (frequency_score + strength) / 2.0;
                if raw_confidence < min_confidence {
                    continue;
                }
                let precision = if period < 7_200.0 {
                    TemporalPrecision::Session
                } else if period < 172_800.0 {
                    TemporalPrecision::Daily
                } else {
                    TemporalPrecision::Cyclical
                };
                let (mean, variance) = mean_and_variance(&intervals);
                let primary = events[0].clone();
                let correlated: Vec<Event> = events[1..].iter().map(|e| (*e).clone()).collect();
                out.push(build_correlation(
                    primary,
                    correlated,
                    Duration::milliseconds((mean * 1000.0) as i64),
                    variance,
                    precision,
                    events.len(),
                    strength,
                    PatternType::Cyclical,
                    raw_confidence,
                    now,
                ));
            }
        }
        out
    }
}

pub struct ContextualDetector;

/// Deterministic signature of an event's context map: sorted key:value
/// pairs, complex values replaced with the literal `"complex"`.
fn context_signature(e: &Event) -> String {
    let mut pairs: Vec<(String, String)> = e
        .context
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => "complex".to_string(),
            };
            (k.clone(), rendered)
        })
        .collect();
    pairs.sort();
    pairs.into_iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<_>>().join(",")
}

impl Detector for ContextualDetector {
    fn pattern_type(&self) -> PatternType {
        PatternType::Contextual
    }

    fn detect(&self, window: &CorrelationWindow, min_occurrences: usize, min_confidence: f64) -> Vec<TemporalCorrelation> {
        let mut clusters: HashMap<String, Vec<&Event>> = HashMap::new();
        for e in &window.events {
            clusters.entry(context_signature(e)).or_default().push(e);
        }

        let mut out = Vec::new();
        let now = chrono::Utc::now();

        for (_, members) in clusters {
            if members.len() < min_occurrences {
                continue;
            }
            let gaps: Vec<f64> = members
                .windows(2)
                .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds().abs() as f64 / 1000.0)
                .collect();
            let (mean, variance) = mean_and_variance(&gaps);
            let frequency_score = (members.len() as f64 / 10.0).min(1.0);

            let mut key_union: HashSet<String> = HashSet::new();
            let mut key_intersection: Option<HashSet<String>> = None;
            for m in &members {
                let keys = context_keys(m);
                key_union.extend(keys.clone());
                key_intersection = Some(match key_intersection {
                    None => keys,
                    Some(prev) => prev.intersection(&keys).cloned().collect(),
                });
            }
            let context_coherence = if key_union.is_empty() {
                0.0
            } else {
                key_intersection.map(|s| s.len()).unwrap_or(0) as f64 / key_union.len() as f64
            };
            let temporal = stability_from_cv(mean, variance);
            let raw_confidence = (frequency_score + context_coherence + temporal) / 3.0;
            if raw_confidence < min_confidence {
                continue;
            }
            let primary = members[0].clone();
            let correlated: Vec<Event> = members[1..].iter().map(|e| (*e).clone()).collect();
            out.push(build_correlation(
                primary,
                correlated,
                Duration::milliseconds((mean * 1000.0) as i64),
                variance,
                precision_from_gap_secs(mean),
                members.len(),
                temporal,
                PatternType::Contextual,
                raw_confidence,
                now,
            ));
        }
        out
    }
}

pub fn all_detectors() -> Vec<Box<dyn Detector + Send + Sync>> {
    vec![
        Box::new(SequentialDetector),
        Box::new(ConcurrentDetector),
        Box::new(CyclicalDetector),
        Box::new(ContextualDetector),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CorrelationWindow;
    use chrono::Utc;
    use mallku_core::event::EventType;

    fn window_with(events: Vec<Event>) -> CorrelationWindow {
        let start = events.iter().map(|e| e.timestamp).min().unwrap() - Duration::seconds(1);
        let end = events.iter().map(|e| e.timestamp).max().unwrap() + Duration::seconds(1);
        let mut w = CorrelationWindow::new(start, end, 0.3, 2);
        for e in events {
            w.insert(e);
        }
        w
    }

    fn at(event_type: EventType, stream: &str, t0: chrono::DateTime<Utc>, secs: f64) -> Event {
        let mut e = Event::new(event_type, stream);
        e.timestamp = t0 + Duration::milliseconds((secs * 1000.0) as i64);
        e
    }

    #[test]
    fn sequential_scenario_from_spec() {
        let t0 = Utc::now();
        let events = vec![
            at(EventType::Communication, "S1", t0, 0.0),
            at(EventType::Communication, "S1", t0, 60.0),
            at(EventType::Communication, "S1", t0, 120.0),
            at(EventType::Storage, "S2", t0, 5.0),
            at(EventType::Storage, "S2", t0, 65.0),
            at(EventType::Storage, "S2", t0, 125.0),
        ];
        let window = window_with(events);
        let correlations = SequentialDetector.detect(&window, 3, 0.6);
        let hit = correlations.iter().find(|c| c.occurrence_frequency == 3);
        let hit = hit.expect("expected one sequential correlation with frequency 3");
        assert_eq!(hit.temporal_precision, TemporalPrecision::Instant);
        assert!(hit.confidence_score >= 0.6);
    }

    #[test]
    fn cyclical_scenario_from_spec() {
        let t0 = Utc::now();
        let events = vec![
            at(EventType::Activity, "S1", t0, 0.0),
            at(EventType::Activity, "S1", t0, 86_400.0),
            at(EventType::Activity, "S1", t0, 172_800.0),
            at(EventType::Activity, "S1", t0, 259_200.0),
        ];
        let window = window_with(events);
        let correlations = CyclicalDetector.detect(&window, 3, 0.6);
        assert_eq!(correlations.len(), 1);
        assert!(correlations[0].pattern_stability >= 0.99);
        assert_eq!(correlations[0].temporal_precision, TemporalPrecision::Cyclical);
    }

    #[test]
    fn single_event_window_yields_no_correlations() {
        let t0 = Utc::now();
        let window = window_with(vec![at(EventType::Activity, "S1", t0, 0.0)]);
        for d in all_detectors() {
            assert!(d.detect(&window, 3, 0.6).is_empty());
        }
    }
}
