use std::collections::VecDeque;

use foundation::SourceLocation;
use serde::Serialize;

use crate::pass::Pass;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ControlReady,
    LoadIssued,
    Loaded,
    LoadFailed,
    /// A load finished after its location was deselected.
    StaleLoad,
    UnloadIssued,
    UnloadFailed,
}

/// Diagnostic record of something the reconciler did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub pass: u64,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Append-only event log, read by diagnostics and tests.
#[derive(Debug, Default)]
pub struct EventBus {
    events: VecDeque<Event>,
    capacity: Option<usize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the most recent `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn emit(
        &mut self,
        pass: Pass,
        kind: EventKind,
        location: Option<&SourceLocation>,
        message: impl Into<String>,
    ) {
        if let Some(cap) = self.capacity {
            if cap == 0 {
                return;
            }
            if self.events.len() >= cap {
                self.events.pop_front();
            }
        }
        self.events.push_back(Event {
            pass: pass.index,
            kind,
            location: location.cloned(),
            message: message.into(),
        });
    }

    /// Oldest first.
    pub fn events(&self) -> impl ExactSizeIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, EventKind};
    use crate::pass::Pass;
    use foundation::SourceLocation;

    #[test]
    fn records_events_with_pass_index() {
        let mut bus = EventBus::new();
        let loc = SourceLocation::from("a.laz");
        bus.emit(Pass::new(2), EventKind::LoadIssued, Some(&loc), "");
        assert_eq!(bus.len(), 1);
        let event = bus.events().next().unwrap();
        assert_eq!(event.pass, 2);
        assert_eq!(event.kind, EventKind::LoadIssued);
        assert_eq!(event.location.as_ref(), Some(&loc));
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut bus = EventBus::with_capacity(2);
        bus.emit(Pass::new(0), EventKind::ControlReady, None, "first");
        bus.emit(Pass::new(1), EventKind::LoadIssued, None, "second");
        bus.emit(Pass::new(2), EventKind::Loaded, None, "third");
        let kinds: Vec<_> = bus.events().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::LoadIssued, EventKind::Loaded]);
    }

    #[test]
    fn long_runs_stay_bounded() {
        let mut bus = EventBus::with_capacity(3);
        for i in 0..1_000 {
            bus.emit(Pass::new(i), EventKind::LoadIssued, None, i.to_string());
        }
        let passes: Vec<_> = bus.events().map(|e| e.pass).collect();
        assert_eq!(passes, vec![997, 998, 999]);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut bus = EventBus::with_capacity(0);
        bus.emit(Pass::new(0), EventKind::ControlReady, None, "");
        assert!(bus.is_empty());
    }
}
