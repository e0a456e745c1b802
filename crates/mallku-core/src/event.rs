//! §3/§4.A — atomic observations and the closed `EventType` taxonomy.

use crate::ids::Id;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Activity,
    Storage,
    Environmental,
    Communication,
    Location,
}

/// Arbitrary string-keyed value bag. `content`/`context` maps are never
/// null at rest — callers always get an (possibly empty) map back.
pub type ValueMap = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Id,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub stream_id: String,
    #[serde(default)]
    pub content: ValueMap,
    #[serde(default)]
    pub context: ValueMap,
    #[serde(default)]
    pub correlation_tags: Vec<String>,
}

impl Event {
    pub fn new(event_type: EventType, stream_id: impl Into<String>) -> Self {
        Self {
            event_id: Id::new(),
            timestamp: Utc::now(),
            event_type,
            stream_id: stream_id.into(),
            content: HashMap::new(),
            context: HashMap::new(),
            correlation_tags: Vec::new(),
        }
    }

    /// Validation per §3: `stream_id` non-empty, timestamp not too far in
    /// the future. Violations are `Error::Validation`, dropped by callers.
    pub fn validate(&self, now: DateTime<Utc>) -> crate::Result<()> {
        if self.stream_id.is_empty() {
            return Err(crate::Error::Validation("stream_id must be non-empty".into()));
        }
        if self.timestamp > now + Duration::seconds(5) {
            return Err(crate::Error::Validation(
                "event timestamp is more than 5s in the future".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_stream_id() {
        let mut e = Event::new(EventType::Activity, "s1");
        e.stream_id.clear();
        assert!(e.validate(Utc::now()).is_err());
    }

    #[test]
    fn rejects_far_future_timestamp() {
        let mut e = Event::new(EventType::Activity, "s1");
        e.timestamp = Utc::now() + Duration::seconds(60);
        assert!(e.validate(Utc::now()).is_err());
    }

    #[test]
    fn accepts_within_tolerance() {
        let mut e = Event::new(EventType::Activity, "s1");
        e.timestamp = Utc::now() + Duration::seconds(3);
        assert!(e.validate(Utc::now()).is_ok());
    }
}
