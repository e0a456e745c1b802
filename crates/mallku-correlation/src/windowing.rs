//! §4.A Event Model & Windowing — bounded ring buffer + overlapping windows.

use crate::models::CorrelationWindow;
use chrono::{DateTime, Duration, Utc};
use mallku_core::event::Event;
use std::collections::VecDeque;

pub struct EventBuffer {
    capacity: usize,
    events: VecDeque<Event>,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, events: VecDeque::with_capacity(capacity.min(1024)) }
    }

    /// FIFO eviction once capacity is exceeded (§3 Event lifecycle, §4.A).
    pub fn push(&mut self, event: Event) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct WindowManager {
    pub window_size: Duration,
    pub overlap_factor: f64,
    pub minimum_events: usize,
    pub windows: Vec<CorrelationWindow>,
}

impl WindowManager {
    pub fn new(window_size: Duration, overlap_factor: f64, minimum_events: usize) -> Self {
        Self { window_size, overlap_factor, minimum_events, windows: Vec::new() }
    }

    /// Distribute a newly-buffered event to every active window that
    /// brackets its timestamp.
    pub fn distribute(&mut self, event: &Event) {
        for window in self.windows.iter_mut() {
            if window.brackets(event.timestamp) {
                window.insert(event.clone());
            }
        }
    }

    /// Creates zero or more new overlapping windows such that the latest
    /// window's `end_time >= now`, and retires windows past `2 x
    /// window_size` age (§4.A).
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.windows.retain(|w| !w.is_retired(now, self.window_size));

        loop {
            let needs_new = match self.windows.last() {
                None => true,
                Some(latest) => latest.end_time < now,
            };
            if !needs_new {
                break;
            }
            let new_start = match self.windows.last() {
                None => now - self.window_size,
                Some(latest) => latest.start_time + self.step(),
            };
            let new_end = new_start + self.window_size;
            self.windows.push(CorrelationWindow::new(
                new_start,
                new_end,
                self.overlap_factor,
                self.minimum_events,
            ));
            if new_end >= now {
                break;
            }
        }
    }

    fn step(&self) -> Duration {
        let overlap_secs = (self.window_size.num_seconds() as f64) * self.overlap_factor;
        self.window_size - Duration::seconds(overlap_secs as i64)
    }

    pub fn active_windows(&self) -> impl Iterator<Item = &CorrelationWindow> {
        self.windows.iter().filter(|w| w.events.len() >= w.minimum_events)
    }

    pub fn windows_mut(&mut self) -> &mut Vec<CorrelationWindow> {
        &mut self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_core::event::EventType;

    #[test]
    fn ring_buffer_evicts_fifo() {
        let mut buf = EventBuffer::new(2);
        let e1 = Event::new(EventType::Activity, "s1");
        let e2 = Event::new(EventType::Activity, "s1");
        let e3 = Event::new(EventType::Activity, "s1");
        buf.push(e1.clone());
        buf.push(e2.clone());
        buf.push(e3.clone());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn advance_creates_overlapping_windows() {
        let mut mgr = WindowManager::new(Duration::hours(2), 0.3, 2);
        let t0 = Utc::now();
        mgr.advance(t0);
        assert_eq!(mgr.windows.len(), 1);
        let t1 = t0 + Duration::hours(3);
        mgr.advance(t1);
        assert!(mgr.windows.len() >= 2);
        let overlap = mgr.windows[0].end_time - mgr.windows[1].start_time;
        assert!(overlap > Duration::zero());
    }

    #[test]
    fn advance_retires_old_windows() {
        let mut mgr = WindowManager::new(Duration::hours(2), 0.3, 2);
        let t0 = Utc::now();
        mgr.advance(t0);
        let much_later = t0 + Duration::hours(10);
        mgr.advance(much_later);
        assert!(mgr.windows.iter().all(|w| !w.is_retired(much_later, mgr.window_size)));
    }
}
