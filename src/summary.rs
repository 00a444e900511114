// src/summary.rs
use schematic_engine::{Severity, ValidationResult};
use serde::Serialize;

/// Counts over a set of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failed results by severity.
    pub fatal: usize,
    pub warning: usize,
    pub info: usize,
}

impl ValidationSummary {
    pub fn from_results<'r>(results: impl IntoIterator<Item = &'r ValidationResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.total += 1;
            if result.is_ok() {
                summary.passed += 1;
                continue;
            }
            summary.failed += 1;
            match result.severity {
                Severity::Fatal => summary.fatal += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    /// True when no fatal result failed.
    pub fn is_valid(&self) -> bool {
        self.fatal == 0
    }
}
