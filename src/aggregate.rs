//! Client-side aggregation of trace events.
//!
//! The aggregator folds the envelope stream into per-route statistics and
//! a bounded activity timeline. Start events park in a pending map until
//! their terminal arrives; the pending map is also the deduplication
//! gate, so a replayed terminal for an already-settled invocation is
//! dropped instead of double-counted.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use crate::trace::events::{Envelope, InvocationKey, TraceEvent};

/// Completed invocations retained per route.
pub const ROUTE_HISTORY_CAP: usize = 20;

/// Timeline entries retained, newest first.
pub const TIMELINE_CAP: usize = 30;

/// Fixed-capacity history; pushing past capacity evicts the oldest entry.
/// Serializes as a plain sequence, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    #[serde(skip)]
    cap: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        RingBuffer { items: VecDeque::with_capacity(cap), cap }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Rolling statistics for one route, derived from the sample buffer and
/// recomputed on every finalized event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Most recent finalized invocations, oldest first.
    pub recent_samples: RingBuffer<TraceEvent>,
    /// All-time finalized counts; the buffer forgets, these do not.
    pub completed: u64,
    pub aborted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lowest_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_ms: Option<u64>,
    /// Mean execution time over the buffer, rounded to two decimal places.
    pub average_ms: f64,
    /// Invocation counts keyed by handler kind.
    pub trigger_count_by_kind: BTreeMap<String, u64>,
}

impl RouteStats {
    fn new() -> Self {
        RouteStats {
            recent_samples: RingBuffer::new(ROUTE_HISTORY_CAP),
            completed: 0,
            aborted: 0,
            lowest_ms: None,
            highest_ms: None,
            average_ms: 0.0,
            trigger_count_by_kind: BTreeMap::new(),
        }
    }

    fn record(&mut self, event: TraceEvent) {
        *self
            .trigger_count_by_kind
            .entry(event.kind.as_str().to_string())
            .or_insert(0) += 1;
        if event.aborted == Some(true) {
            self.aborted += 1;
        } else {
            self.completed += 1;
        }
        self.recent_samples.push(event);
        self.recompute();
    }

    fn recompute(&mut self) {
        let times: Vec<u64> = self
            .recent_samples
            .iter()
            .filter_map(|e| e.execution_time())
            .collect();
        if times.is_empty() {
            self.lowest_ms = None;
            self.highest_ms = None;
            self.average_ms = 0.0;
            return;
        }
        self.lowest_ms = times.iter().min().copied();
        self.highest_ms = times.iter().max().copied();
        let total: u64 = times.iter().sum();
        self.average_ms = round2(total as f64 / times.len() as f64);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
pub struct Aggregator {
    routes: BTreeMap<String, RouteStats>,
    pending: HashMap<InvocationKey, TraceEvent>,
    /// Newest first.
    timeline: VecDeque<serde_json::Value>,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator::default()
    }

    /// Fold one envelope into the aggregate state.
    pub fn apply(&mut self, envelope: &Envelope) {
        if envelope.is_timeline() {
            self.push_timeline(envelope);
            return;
        }
        let Some(event) = envelope.as_trace() else {
            return;
        };
        if !event.is_terminal() {
            // Re-sent start for a live invocation keeps the original.
            self.pending.entry(event.key()).or_insert(event);
            return;
        }
        // Terminal without a matching start (or a duplicate terminal) is
        // dropped; the pending entry is the invocation's single ticket.
        if self.pending.remove(&event.key()).is_none() {
            return;
        }
        self.routes
            .entry(event.route_id.clone())
            .or_insert_with(RouteStats::new)
            .record(event);
    }

    fn push_timeline(&mut self, envelope: &Envelope) {
        let mut entry = serde_json::Map::new();
        entry.insert("type".to_string(), envelope.event_type.clone().into());
        entry.insert("payload".to_string(), envelope.payload.clone());
        self.timeline.push_front(serde_json::Value::Object(entry));
        self.timeline.truncate(TIMELINE_CAP);
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteStats> {
        self.routes.get(route_id)
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &RouteStats)> {
        self.routes.iter().map(|(id, stats)| (id.as_str(), stats))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Timeline entries, newest first.
    pub fn timeline(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.timeline.iter()
    }

    /// Serialized view of the aggregate state for late-joining clients.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "routes": self.routes,
            "timeline": self.timeline,
        })
    }

    pub fn reset(&mut self) {
        self.routes.clear();
        self.pending.clear();
        self.timeline.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::events::HandlerKind;
    use std::collections::BTreeMap as Headers;

    fn start(id: &str, start_time: u64) -> TraceEvent {
        TraceEvent {
            id: id.to_string(),
            route_id: "routes/index".to_string(),
            kind: HandlerKind::Loader,
            start_time,
            end_time: None,
            method: "GET".to_string(),
            url: "/".to_string(),
            headers: Headers::new(),
            data: None,
            aborted: None,
            middleware_name: None,
            middleware_index: None,
        }
    }

    fn complete(id: &str, start_time: u64, ms: u64) -> TraceEvent {
        let mut event = start(id, start_time);
        event.end_time = Some(start_time + ms);
        event
    }

    fn feed(agg: &mut Aggregator, event: &TraceEvent) {
        agg.apply(&Envelope::trace(event));
    }

    #[test]
    fn test_start_then_terminal_records_stats() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &start("a", 100));
        assert_eq!(agg.pending_len(), 1);
        feed(&mut agg, &complete("a", 100, 40));
        assert_eq!(agg.pending_len(), 0);

        let stats = agg.route("routes/index").unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.lowest_ms, Some(40));
        assert_eq!(stats.highest_ms, Some(40));
        assert_eq!(stats.average_ms, 40.0);
        assert_eq!(stats.trigger_count_by_kind["loader"], 1);
    }

    #[test]
    fn test_average_rounded_to_two_decimals() {
        let mut agg = Aggregator::new();
        for (id, ms) in [("a", 10), ("b", 11), ("c", 11)] {
            feed(&mut agg, &start(id, 1));
            feed(&mut agg, &complete(id, 1, ms));
        }
        // 32 / 3 = 10.666..., rounds to 10.67.
        assert_eq!(agg.route("routes/index").unwrap().average_ms, 10.67);
    }

    #[test]
    fn test_duplicate_terminal_ignored() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &start("a", 100));
        feed(&mut agg, &complete("a", 100, 40));
        feed(&mut agg, &complete("a", 100, 40));
        assert_eq!(agg.route("routes/index").unwrap().completed, 1);
    }

    #[test]
    fn test_terminal_without_start_dropped() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &complete("orphan", 100, 40));
        assert!(agg.route("routes/index").is_none());
    }

    #[test]
    fn test_same_id_different_start_time_are_distinct() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &start("a", 100));
        feed(&mut agg, &start("a", 101));
        feed(&mut agg, &complete("a", 100, 5));
        feed(&mut agg, &complete("a", 101, 7));
        assert_eq!(agg.route("routes/index").unwrap().completed, 2);
    }

    #[test]
    fn test_buffer_keeps_most_recent_twenty_and_stats_follow() {
        let mut agg = Aggregator::new();
        for i in 0..25u64 {
            let id = format!("inv-{i}");
            feed(&mut agg, &start(&id, i));
            feed(&mut agg, &complete(&id, i, i));
        }
        let stats = agg.route("routes/index").unwrap();
        assert_eq!(stats.recent_samples.len(), ROUTE_HISTORY_CAP);
        let ids: Vec<_> = stats.recent_samples.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"inv-5"));
        assert_eq!(ids.last(), Some(&"inv-24"));
        // Statistics are derived from the buffer, so evicted samples no
        // longer count; all-time counters still see every completion.
        assert_eq!(stats.lowest_ms, Some(5));
        assert_eq!(stats.highest_ms, Some(24));
        assert_eq!(stats.average_ms, 14.5);
        assert_eq!(stats.completed, 25);
    }

    #[test]
    fn test_abort_finalizes_into_buffer() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &start("a", 100));
        let mut aborted = start("a", 100);
        aborted.end_time = Some(130);
        aborted.aborted = Some(true);
        feed(&mut agg, &aborted);

        let stats = agg.route("routes/index").unwrap();
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.recent_samples.len(), 1);
        assert_eq!(stats.lowest_ms, Some(30));
        assert_eq!(stats.trigger_count_by_kind["loader"], 1);
    }

    #[test]
    fn test_timeline_bounded_newest_first() {
        let mut agg = Aggregator::new();
        for i in 0..35 {
            agg.apply(&Envelope {
                event_type: "navigation".to_string(),
                payload: serde_json::json!({ "seq": i }),
            });
        }
        let entries: Vec<_> = agg.timeline().collect();
        assert_eq!(entries.len(), TIMELINE_CAP);
        assert_eq!(entries[0]["payload"]["seq"], 34);
        assert_eq!(entries[29]["payload"]["seq"], 5);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut agg = Aggregator::new();
        feed(&mut agg, &start("a", 100));
        feed(&mut agg, &complete("a", 100, 4));
        agg.apply(&Envelope {
            event_type: "submission".to_string(),
            payload: serde_json::json!({}),
        });
        agg.reset();
        assert!(agg.route("routes/index").is_none());
        assert_eq!(agg.pending_len(), 0);
        assert_eq!(agg.timeline().count(), 0);
        assert_eq!(agg.snapshot()["routes"], serde_json::json!({}));
    }
}
