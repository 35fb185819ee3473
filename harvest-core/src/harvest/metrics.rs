use serde::{Deserialize, Serialize};

/// Counters for one harvest run. Every recovered failure lands here as well
/// as in the logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestMetrics {
    pub responses_seen: u64,
    pub responses_ignored: u64,
    pub responses_malformed: u64,
    pub responses_schema_missing: u64,
    pub entries_seen: u64,
    pub duplicates_skipped: u64,
    pub missing_ids: u64,
    pub filtered_out: u64,
    pub skipped_at_cap: u64,
    pub hydration_attempts: u64,
    pub hydration_failures: u64,
    pub link_resolutions: u64,
    pub link_failures: u64,
    pub scroll_failures: u64,
    pub posts_collected: u64,
}

impl HarvestMetrics {
    pub fn record_response(&mut self) {
        self.responses_seen = self.responses_seen.saturating_add(1);
    }

    pub fn record_ignored_response(&mut self) {
        self.responses_ignored = self.responses_ignored.saturating_add(1);
    }

    pub fn record_malformed_response(&mut self) {
        self.responses_malformed = self.responses_malformed.saturating_add(1);
    }

    pub fn record_schema_miss(&mut self) {
        self.responses_schema_missing = self.responses_schema_missing.saturating_add(1);
    }

    pub fn record_entries(&mut self, count: u64) {
        self.entries_seen = self.entries_seen.saturating_add(count);
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates_skipped = self.duplicates_skipped.saturating_add(1);
    }

    pub fn record_missing_id(&mut self) {
        self.missing_ids = self.missing_ids.saturating_add(1);
    }

    pub fn record_filtered(&mut self) {
        self.filtered_out = self.filtered_out.saturating_add(1);
    }

    pub fn record_skipped_at_cap(&mut self) {
        self.skipped_at_cap = self.skipped_at_cap.saturating_add(1);
    }

    pub fn record_hydration(&mut self, success: bool) {
        self.hydration_attempts = self.hydration_attempts.saturating_add(1);
        if !success {
            self.hydration_failures = self.hydration_failures.saturating_add(1);
        }
    }

    pub fn record_link_resolution(&mut self) {
        self.link_resolutions = self.link_resolutions.saturating_add(1);
    }

    pub fn record_link_failure(&mut self) {
        self.link_failures = self.link_failures.saturating_add(1);
    }

    pub fn record_scroll_failure(&mut self) {
        self.scroll_failures = self.scroll_failures.saturating_add(1);
    }

    pub fn record_collected(&mut self) {
        self.posts_collected = self.posts_collected.saturating_add(1);
    }

    pub fn hydration_success_rate(&self) -> f64 {
        if self.hydration_attempts == 0 {
            0.0
        } else {
            let succeeded = self.hydration_attempts - self.hydration_failures;
            (succeeded as f64 / self.hydration_attempts as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydration_rate_counts_failures() {
        let mut metrics = HarvestMetrics::default();
        assert_eq!(metrics.hydration_success_rate(), 0.0);
        metrics.record_hydration(true);
        metrics.record_hydration(false);
        metrics.record_hydration(true);
        metrics.record_hydration(true);
        assert_eq!(metrics.hydration_attempts, 4);
        assert_eq!(metrics.hydration_failures, 1);
        assert!((metrics.hydration_success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_all_counters() {
        let mut metrics = HarvestMetrics::default();
        metrics.record_entries(7);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["entries_seen"], 7);
        assert_eq!(json["posts_collected"], 0);
    }
}
