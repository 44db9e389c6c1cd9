use metrics::{Counter, Gauge};
use std::sync::Arc;

/// Run-scoped counters. Handles are noop until a recorder is installed, so
/// recording is always safe.
pub struct RunMetrics {
    pub actions_executed: Counter,
    pub actions_failed: Counter,
    pub checks_performed: Counter,
    pub downloads_completed: Counter,
    pub downloads_failed: Counter,
    pub scroll_attempts: Counter,
    pub scroll_failures: Counter,
    pub condition_retries: Counter,
    pub variables_set: Gauge,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            actions_executed: Counter::noop(),
            actions_failed: Counter::noop(),
            checks_performed: Counter::noop(),
            downloads_completed: Counter::noop(),
            downloads_failed: Counter::noop(),
            scroll_attempts: Counter::noop(),
            scroll_failures: Counter::noop(),
            condition_retries: Counter::noop(),
            variables_set: Gauge::noop(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn record_action(&self, success: bool) {
        self.actions_executed.increment(1);
        if !success {
            self.actions_failed.increment(1);
        }
    }

    pub fn record_check(&self) {
        self.checks_performed.increment(1);
    }

    pub fn record_download(&self, success: bool) {
        if success {
            self.downloads_completed.increment(1);
        } else {
            self.downloads_failed.increment(1);
        }
    }

    pub fn record_scroll(&self, success: bool) {
        self.scroll_attempts.increment(1);
        if !success {
            self.scroll_failures.increment(1);
        }
    }

    pub fn record_condition_retry(&self) {
        self.condition_retries.increment(1);
    }

    pub fn set_variable_count(&self, count: usize) {
        self.variables_set.set(count as f64);
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
