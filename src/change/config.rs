use std::time::Duration;

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "pwselfLastPwdUpdate";

/// Timing and feature switches for the change pipeline.
#[derive(Clone, Debug)]
pub struct ChangeConfig {
    initial_delay: Duration,
    cycle_delay: Duration,
    max_wait: Duration,
    min_wait: Duration,
    min_wait_step: Duration,
    operation_timeout: Option<Duration>,
    history_enabled: bool,
    marker_attribute: String,
}

impl ChangeConfig {
    /// Default config: 1s initial delay, 1s between replication checks, 30s
    /// replication bound, no minimum wait (checked in 500ms steps), no overall
    /// timeout, history recording enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            cycle_delay: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
            min_wait: Duration::ZERO,
            min_wait_step: Duration::from_millis(500),
            operation_timeout: None,
            history_enabled: true,
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
        }
    }

    #[must_use]
    pub fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay = Duration::from_millis(ms);
        self
    }

    #[must_use]
    pub fn with_cycle_delay_ms(mut self, ms: u64) -> Self {
        self.cycle_delay = Duration::from_millis(ms);
        self
    }

    /// Upper bound of the replication wait, 0 disables it.
    #[must_use]
    pub fn with_max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait = Duration::from_millis(ms);
        self
    }

    /// Minimum time between the start of the directory write and the post-change actions.
    #[must_use]
    pub fn with_min_wait_ms(mut self, ms: u64) -> Self {
        self.min_wait = Duration::from_millis(ms);
        self
    }

    #[must_use]
    pub fn with_min_wait_step_ms(mut self, ms: u64) -> Self {
        self.min_wait_step = Duration::from_millis(ms);
        self
    }

    /// Overall bound on the time spent sleeping in a single change.
    #[must_use]
    pub fn with_operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout = Some(Duration::from_millis(ms));
        self
    }

    #[must_use]
    pub fn with_history_enabled(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_marker_attribute(mut self, attribute: &str) -> Self {
        self.marker_attribute = attribute.to_string();
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let cycle_delay = if self.cycle_delay.is_zero() {
            Duration::from_millis(1)
        } else {
            self.cycle_delay
        };
        let min_wait_step = if self.min_wait_step.is_zero() {
            Duration::from_millis(500)
        } else {
            self.min_wait_step
        };
        let marker_attribute = if self.marker_attribute.trim().is_empty() {
            DEFAULT_MARKER_ATTRIBUTE.to_string()
        } else {
            self.marker_attribute
        };

        Self {
            cycle_delay,
            min_wait_step,
            marker_attribute,
            ..self
        }
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    #[must_use]
    pub fn cycle_delay(&self) -> Duration {
        self.cycle_delay
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    #[must_use]
    pub fn min_wait(&self) -> Duration {
        self.min_wait
    }

    #[must_use]
    pub fn min_wait_step(&self) -> Duration {
        self.min_wait_step
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    #[must_use]
    pub fn history_enabled(&self) -> bool {
        self.history_enabled
    }

    #[must_use]
    pub fn marker_attribute(&self) -> &str {
        &self.marker_attribute
    }

    /// Whether a change against `nodes` replicas waits for convergence.
    #[must_use]
    pub fn waits_for_replication(&self, nodes: usize) -> bool {
        nodes > 1 && !self.max_wait.is_zero()
    }
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_replaces_zero_steps() {
        let config = ChangeConfig::new()
            .with_cycle_delay_ms(0)
            .with_min_wait_step_ms(0)
            .with_marker_attribute(" ")
            .normalize();

        assert_eq!(config.cycle_delay(), Duration::from_millis(1));
        assert_eq!(config.min_wait_step(), Duration::from_millis(500));
        assert_eq!(config.marker_attribute(), DEFAULT_MARKER_ATTRIBUTE);
    }

    #[test]
    fn replication_wait_needs_several_nodes_and_a_bound() {
        let config = ChangeConfig::new();
        assert!(!config.waits_for_replication(0));
        assert!(!config.waits_for_replication(1));
        assert!(config.waits_for_replication(2));

        let disabled = ChangeConfig::new().with_max_wait_ms(0);
        assert!(!disabled.waits_for_replication(3));
    }
}
