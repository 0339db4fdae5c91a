//! Outcome of a push run.

use super::{FailureRecord, PushResult};
use crate::error::PushError;

/// Results and failures collected from every worker.
///
/// Arrival order is the order in which workers finished, not task order.
#[derive(Debug, Default)]
pub struct PushReport {
    pub results: Vec<PushResult>,
    pub failures: Vec<FailureRecord>,
}

impl PushReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if every task succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Targets that could not be reached.
    pub fn connect_failures(&self) -> Vec<&str> {
        self.targets_where(|e| matches!(e, PushError::Connect(_)))
    }

    /// Targets whose configuration was not applied.
    pub fn config_failures(&self) -> Vec<&str> {
        self.targets_where(|e| matches!(e, PushError::ApplyConfig(_)))
    }

    /// Targets whose command did not run.
    pub fn command_failures(&self) -> Vec<&str> {
        self.targets_where(|e| matches!(e, PushError::Command(_)))
    }

    /// Targets whose session panicked.
    pub fn panicked(&self) -> Vec<&str> {
        self.targets_where(|e| matches!(e, PushError::Panicked(_)))
    }

    /// Find the result for a target.
    pub fn result_for(&self, target: &str) -> Option<&PushResult> {
        self.results.iter().find(|r| r.target == target)
    }

    /// Find the failure for a target.
    pub fn failure_for(&self, target: &str) -> Option<&FailureRecord> {
        self.failures.iter().find(|f| f.target == target)
    }

    /// Order results and failures by target.
    pub fn sort(&mut self) {
        self.results.sort_by(|a, b| a.target.cmp(&b.target));
        self.failures.sort_by(|a, b| a.target.cmp(&b.target));
    }

    /// Render the report as text.
    ///
    /// Each result is printed under a `#!# target:label #!#` header,
    /// followed by one summary line per failure class. With `verbose`,
    /// every failure is also printed with its error.
    pub fn render(&self, label: &str, verbose: bool) -> String {
        let mut out = String::new();

        for result in &self.results {
            out.push_str(&format!(
                "#!# {}:{} #!#\n\n{}\n\n",
                result.target,
                label,
                result.output.trim_end()
            ));
        }

        let summaries = [
            ("Failed to connect to", self.connect_failures()),
            ("Setting config failed", self.config_failures()),
            ("Command failed", self.command_failures()),
            ("Session panicked", self.panicked()),
        ];
        for (title, targets) in summaries {
            if !targets.is_empty() {
                out.push_str(&format!("{}: {}\n", title, targets.join(", ")));
            }
        }

        if verbose {
            for failure in &self.failures {
                out.push_str(&format!(
                    "\n#!# {}:{} #!#\n{}\n",
                    failure.target,
                    failure.error.kind(),
                    failure.error
                ));
            }
        }

        out
    }

    fn targets_where(&self, pred: impl Fn(&PushError) -> bool) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| pred(&f.error))
            .map(|f| f.target.as_str())
            .collect()
    }
}
