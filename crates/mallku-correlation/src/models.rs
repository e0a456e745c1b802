//! §3 data model entries owned by the Correlation Engine: windows,
//! detected correlations, and feedback.

use mallku_core::event::Event;
use mallku_core::ids::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalPrecision {
    Instant,
    Minute,
    Session,
    Daily,
    Cyclical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Sequential,
    Concurrent,
    Cyclical,
    Contextual,
}

impl PatternType {
    /// Acceptance multiplier applied by Adaptive Thresholds (§4.D).
    pub fn threshold_multiplier(self) -> f64 {
        match self {
            PatternType::Sequential => 1.00,
            PatternType::Concurrent => 1.10,
            PatternType::Cyclical => 0.90,
            PatternType::Contextual => 1.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationWindow {
    pub window_id: Id,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub precision: TemporalPrecision,
    pub overlap_factor: f64,
    pub minimum_events: usize,
    pub events: Vec<Event>,
    pub detected_correlations: Vec<TemporalCorrelation>,
}

impl CorrelationWindow {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        overlap_factor: f64,
        minimum_events: usize,
    ) -> Self {
        Self {
            window_id: Id::new(),
            start_time,
            end_time,
            precision: TemporalPrecision::Session,
            overlap_factor,
            minimum_events,
            events: Vec::new(),
            detected_correlations: Vec::new(),
        }
    }

    pub fn brackets(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start_time && timestamp <= self.end_time
    }

    /// Insert an event, keeping `events` sorted by timestamp and unique by
    /// `event_id` (§3 CorrelationWindow invariants).
    pub fn insert(&mut self, event: Event) {
        if self.events.iter().any(|e| e.event_id == event.event_id) {
            return;
        }
        let pos = self.events.partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(pos, event);
    }

    pub fn is_retired(&self, now: DateTime<Utc>, window_size: chrono::Duration) -> bool {
        now - self.start_time > window_size * 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalCorrelation {
    pub correlation_id: Id,
    pub primary_event: Event,
    pub correlated_events: Vec<Event>,
    pub temporal_gap: chrono::Duration,
    pub gap_variance: f64,
    pub temporal_precision: TemporalPrecision,
    pub occurrence_frequency: usize,
    pub pattern_stability: f64,
    pub pattern_type: PatternType,
    pub confidence_score: f64,
    pub confidence_factors: HashMap<String, f64>,
    pub detection_timestamp: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationFeedback {
    pub feedback_id: Id,
    pub correlation_id: Id,
    pub is_meaningful: bool,
    pub confidence_rating: f64,
    pub explanation: String,
    pub feedback_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_context: HashMap<String, serde_json::Value>,
    pub feedback_source: String,
    pub implicit_signal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_core::event::EventType;

    #[test]
    fn window_brackets_inclusive_bounds() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(2);
        let w = CorrelationWindow::new(start, end, 0.3, 2);
        assert!(w.brackets(start));
        assert!(w.brackets(end));
        assert!(!w.brackets(end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn insert_keeps_events_time_sorted_and_unique() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(2);
        let mut w = CorrelationWindow::new(start, end, 0.3, 2);
        let mut e1 = Event::new(EventType::Activity, "s1");
        e1.timestamp = start + chrono::Duration::seconds(10);
        let mut e2 = Event::new(EventType::Activity, "s1");
        e2.timestamp = start + chrono::Duration::seconds(5);
        w.insert(e1.clone());
        w.insert(e2.clone());
        w.insert(e1.clone());
        assert_eq!(w.events.len(), 2);
        assert_eq!(w.events[0].event_id, e2.event_id);
    }
}
