//! Batch run reporting

use std::fmt;

/// One task that failed, with what it was working on
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub context: String,
    pub reason: String,
}

/// What a season run did. Returned instead of an error so that one bad
/// event or team never hides the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub year: u16,
    pub events_processed: usize,
    pub teams_processed: usize,
    /// Teams whose season rating was written
    pub teams_updated: usize,
    /// Teams with no usable matches; nothing written
    pub teams_skipped: usize,
    pub failures: Vec<TaskFailure>,
    pub cancelled: bool,
    /// How many failure reasons `Display` lists
    pub report_limit: usize,
}

impl BatchSummary {
    pub fn new(year: u16, report_limit: usize) -> Self {
        BatchSummary {
            year,
            events_processed: 0,
            teams_processed: 0,
            teams_updated: 0,
            teams_skipped: 0,
            failures: Vec::new(),
            cancelled: false,
            report_limit,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn record_failure(&mut self, context: impl Into<String>, reason: impl ToString) {
        let failure = TaskFailure {
            context: context.into(),
            reason: reason.to_string(),
        };
        log::error!("{} failed: {}", failure.context, failure.reason);
        self.failures.push(failure);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Season {}", self.year)?;
        writeln!(f, "  Events processed: {}", self.events_processed)?;
        writeln!(f, "  Teams processed:  {}", self.teams_processed)?;
        writeln!(f, "  Teams updated:    {}", self.teams_updated)?;
        writeln!(f, "  Teams skipped:    {}", self.teams_skipped)?;
        write!(f, "  Failed tasks:     {}", self.failed())?;
        if self.cancelled {
            write!(f, "\n  (cancelled before completion)")?;
        }
        for failure in self.failures.iter().take(self.report_limit) {
            write!(f, "\n    - {}: {}", failure.context, failure.reason)?;
        }
        let hidden = self.failed().saturating_sub(self.report_limit);
        if hidden > 0 {
            write!(f, "\n    ... and {} more", hidden)?;
        }
        Ok(())
    }
}
