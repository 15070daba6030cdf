//! ---
//! hm_section: "11-simulation"
//! hm_subsection: "05-summary"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Per-kind roll-up of captured events for reports."
//! hm_version: "v0.1.0"
//! hm_owner: "tbd"
//! ---
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use hostmetrics_common::time::duration_to_micros;
use hostmetrics_core::{Event, EventKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub count: u64,
    pub failures: u64,
    #[serde(rename = "total_us", serialize_with = "serialize_micros")]
    pub total: Duration,
    #[serde(rename = "max_us", serialize_with = "serialize_micros")]
    pub max: Duration,
}

/// Counts and timings per event kind, in order of first appearance.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EventSummary {
    kinds: IndexMap<EventKind, KindSummary>,
}

impl EventSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.add(event);
        }
        summary
    }

    pub fn add(&mut self, event: &Event) {
        let entry = self.kinds.entry(event.kind).or_default();
        entry.count += 1;
        if event.failure.is_some() {
            entry.failures += 1;
        }
        if let Some(duration) = event.duration {
            entry.total = entry.total.saturating_add(duration);
            entry.max = entry.max.max(duration);
        }
    }

    pub fn get(&self, kind: EventKind) -> Option<&KindSummary> {
        self.kinds.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventKind, &KindSummary)> {
        self.kinds.iter()
    }

    pub fn total_failures(&self) -> u64 {
        self.kinds.values().map(|kind| kind.failures).sum()
    }
}

fn serialize_micros<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration_to_micros(*duration))
}

#[cfg(test)]
mod tests {
    use hostmetrics_core::{Failure, RuntimeContext};

    use super::*;

    #[test]
    fn counts_failures_and_keeps_first_seen_order() {
        let context = RuntimeContext::new("/shop");
        let events = vec![
            Event::new(EventKind::HandlerEnter, &context),
            Event::new(EventKind::HandlerExit, &context).with_duration(Duration::from_micros(40)),
            Event::new(EventKind::HandlerEnter, &context),
            Event::new(EventKind::HandlerExit, &context)
                .with_duration(Duration::from_micros(10))
                .with_failure(Some(&Failure::msg("boom"))),
        ];
        let summary = EventSummary::from_events(&events);
        let order: Vec<EventKind> = summary.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(order, [EventKind::HandlerEnter, EventKind::HandlerExit]);
        let exits = summary.get(EventKind::HandlerExit).unwrap();
        assert_eq!(exits.count, 2);
        assert_eq!(exits.failures, 1);
        assert_eq!(exits.total, Duration::from_micros(50));
        assert_eq!(exits.max, Duration::from_micros(40));
        assert_eq!(summary.total_failures(), 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["handler-exit"]["total_us"], 50);
    }
}
