use log::warn;

use super::EpochLogs;
use crate::configs::MonitorMode;

/// What a `Monitor` made of an epoch's logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// The metric isn't in the logs.
    Missing,
    /// The metric beat the best value so far, which was `previous`.
    Improved { previous: Option<f64>, current: f64 },
    /// The metric hasn't improved for `wait` epochs in a row.
    Stalled { wait: usize },
}

/// Tracks the best value of a metric across epochs.
#[derive(Debug, Clone)]
pub struct Monitor {
    metric: String,
    mode: MonitorMode,
    min_delta: f64,
    best: Option<f64>,
    wait: usize,
}

impl Monitor {
    /// Creates a new `Monitor`.
    ///
    /// # Arguments
    /// * `metric` - The name of the metric in the epoch logs.
    /// * `mode` - Whether lower or higher values are better.
    /// * `min_delta` - How much a value must beat the best one to count as an improvement.
    pub fn new(metric: impl Into<String>, mode: MonitorMode, min_delta: f64) -> Self {
        Self {
            metric: metric.into(),
            mode,
            min_delta: min_delta.abs(),
            best: None,
            wait: 0,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Feeds one epoch's logs, a metric that is NaN never improves.
    pub fn observe(&mut self, logs: &EpochLogs) -> Observation {
        let Some(&current) = logs.get(&self.metric) else {
            warn!(
                "monitored metric {} is not among the logged ones: {:?}",
                self.metric,
                logs.keys().collect::<Vec<_>>()
            );
            return Observation::Missing;
        };

        let improved = match (self.best, self.mode) {
            (None, _) => !current.is_nan(),
            (Some(best), MonitorMode::Min) => current < best - self.min_delta,
            (Some(best), MonitorMode::Max) => current > best + self.min_delta,
        };

        if improved {
            let previous = self.best.replace(current);
            self.wait = 0;
            Observation::Improved { previous, current }
        } else {
            self.wait += 1;
            Observation::Stalled { wait: self.wait }
        }
    }

    /// Restarts the count of epochs without improvement, keeping the best value.
    pub fn reset_wait(&mut self) {
        self.wait = 0;
    }
}
