use std::collections::HashSet;

use uuid::Uuid;

use super::collector::Collector;
use super::links::LinkCache;
use super::metrics::HarvestMetrics;

/// All mutable state of one harvest run. Owned by the single consumer of the
/// response queue and threaded through every pipeline call.
#[derive(Debug)]
pub struct HarvestSession {
    pub run_id: Uuid,
    seen: HashSet<String>,
    pub collector: Collector,
    pub link_cache: LinkCache,
    pub metrics: HarvestMetrics,
    cursor: Option<String>,
    cursor_observed: bool,
}

impl Default for HarvestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            seen: HashSet::new(),
            collector: Collector::default(),
            link_cache: LinkCache::default(),
            metrics: HarvestMetrics::default(),
            cursor: None,
            cursor_observed: false,
        }
    }

    /// Returns false when the id was already seen this run.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn observe_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
        self.cursor_observed = true;
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Whether a cursor arrived since the previous call.
    pub fn take_cursor_observed(&mut self) -> bool {
        std::mem::take(&mut self.cursor_observed)
    }

    pub fn collected(&self) -> usize {
        self.collector.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_grows_monotonically() {
        let mut session = HarvestSession::new();
        assert!(session.mark_seen("1"));
        assert!(!session.mark_seen("1"));
        assert!(session.mark_seen("2"));
        assert_eq!(session.seen_count(), 2);
        assert!(session.has_seen("1"));
    }

    #[test]
    fn cursor_observation_resets_on_take() {
        let mut session = HarvestSession::new();
        assert!(!session.take_cursor_observed());
        session.observe_cursor("A".into());
        session.observe_cursor("B".into());
        assert!(session.take_cursor_observed());
        assert!(!session.take_cursor_observed());
        assert_eq!(session.cursor(), Some("B"));
    }

    #[test]
    fn sessions_are_independent() {
        let a = HarvestSession::new();
        let b = HarvestSession::new();
        assert_ne!(a.run_id, b.run_id);
    }
}
