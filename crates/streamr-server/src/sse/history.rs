//! Bounded event history used for replay on reconnect.

use std::collections::VecDeque;

use super::event::Event;

/// Ordered, bounded record of the most recent events of a session.
///
/// Events are appended in id order. Once the history holds `capacity`
/// events, each append evicts the oldest, so `len() <= capacity` always.
#[derive(Clone, Debug)]
pub struct EventHistory {
    capacity: usize,
    events: VecDeque<Event>,
}

impl EventHistory {
    /// Empty history retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Re-bound an existing history, evicting the oldest events that no
    /// longer fit.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self.evict();
        self
    }

    /// Append an event, evicting from the front until the bound holds.
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
        self.evict();
    }

    fn evict(&mut self) {
        while self.events.len() > self.capacity {
            let _ = self.events.pop_front();
        }
    }

    /// Events with an id greater than or equal to `resume_id`, oldest first.
    pub fn replay_from(&self, resume_id: u64) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.id >= resume_id)
    }

    /// Whether the oldest retained event is newer than `resume_id`, meaning
    /// some events a resuming client asked for were evicted.
    pub fn has_gap(&self, resume_id: u64) -> bool {
        self.events.front().is_some_and(|e| e.id > resume_id)
    }

    /// Id of the newest retained event.
    pub fn last_id(&self) -> Option<u64> {
        self.events.back().map(|e| e.id)
    }

    /// Id the next event should carry to continue this history.
    pub fn next_id(&self) -> u64 {
        self.last_id().map_or(0, |id| id + 1)
    }

    /// Retention bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(capacity: usize, count: u64) -> EventHistory {
        let mut history = EventHistory::new(capacity);
        for id in 0..count {
            history.push(Event::new(id, format!("m{id}"), None));
        }
        history
    }

    #[test]
    fn retains_up_to_capacity() {
        let history = filled(10, 10);
        assert_eq!(history.len(), 10);
        assert_eq!(history.iter().next().map(|e| e.id), Some(0));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let history = filled(10, 11);
        assert_eq!(history.len(), 10);
        assert_eq!(history.iter().next().map(|e| e.id), Some(1));
        assert_eq!(history.last_id(), Some(10));
    }

    #[test]
    fn replay_includes_resume_id() {
        let history = filled(10, 5);
        let ids: Vec<u64> = history.replay_from(3).map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn replay_from_middle_yields_tail_in_order() {
        let history = filled(10, 5);
        let ids: Vec<u64> = history.replay_from(2).map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn replay_past_end_is_empty() {
        let history = filled(10, 5);
        assert_eq!(history.replay_from(5).count(), 0);
    }

    #[test]
    fn replay_after_eviction_starts_at_oldest() {
        let history = filled(10, 20);
        assert!(history.has_gap(3));
        let ids: Vec<u64> = history.replay_from(3).map(|e| e.id).collect();
        assert_eq!(ids, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn no_gap_when_resume_is_retained() {
        let history = filled(10, 20);
        assert!(!history.has_gap(10));
        assert!(!history.has_gap(15));
    }

    #[test]
    fn next_id_continues_sequence() {
        assert_eq!(EventHistory::new(10).next_id(), 0);
        assert_eq!(filled(10, 4).next_id(), 4);
    }

    #[test]
    fn shrinking_capacity_evicts_oldest() {
        let history = filled(50, 30).with_capacity(10);
        assert_eq!(history.len(), 10);
        assert_eq!(history.capacity(), 10);
        assert_eq!(history.iter().next().map(|e| e.id), Some(20));
    }

    #[test]
    fn replay_preserves_event_names() {
        let mut history = EventHistory::new(10);
        history.push(Event::new(0, "a", Some("tick")));
        history.push(Event::new(1, "b", None));
        let names: Vec<Option<&str>> = history
            .replay_from(0)
            .map(|e| e.event_name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("tick"), None]);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(capacity in 10usize..=500, count in 0u64..1500) {
            let history = filled(capacity, count);
            prop_assert!(history.len() <= capacity);
            prop_assert_eq!(history.len() as u64, count.min(capacity as u64));
        }

        #[test]
        fn replay_is_ordered_and_bounded(count in 1u64..300, resume in 0u64..400) {
            let history = filled(100, count);
            let ids: Vec<u64> = history.replay_from(resume).map(|e| e.id).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(ids.iter().all(|id| *id >= resume));
        }
    }
}
