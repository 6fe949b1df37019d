//! Aggregate test report

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Aggregate result of one test run against a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub url: String,
    pub summary: String,
    pub successes: Vec<String>,
    pub recommendations: Vec<String>,
    pub common_issues: Vec<String>,
    /// 0..=100
    pub overall_score: u8,
    pub completed_tests: u32,
    pub total_tests: u32,
}

/// Aggregate fields written once every persona has finished
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFindings {
    pub summary: String,
    pub successes: Vec<String>,
    pub recommendations: Vec<String>,
    pub common_issues: Vec<String>,
    pub overall_score: u8,
}

impl ReportFindings {
    /// Fixed findings used by the simulated run.
    pub fn simulated() -> Self {
        Self {
            summary: "Overall, the website shows promise but has several areas for improvement..."
                .to_string(),
            successes: vec![
                "Clean and modern design".to_string(),
                "Fast loading times".to_string(),
                "Mobile responsive layout".to_string(),
            ],
            recommendations: vec![
                "Improve navigation structure".to_string(),
                "Enhance mobile responsiveness".to_string(),
                "Add more contrast to call-to-action buttons".to_string(),
            ],
            common_issues: vec![
                "Navigation is confusing for first-time users".to_string(),
                "Mobile layout breaks on some devices".to_string(),
                "Color contrast ratio doesn't meet WCAG standards".to_string(),
            ],
            overall_score: 75,
        }
    }
}

impl TestReport {
    /// Empty report for a run over `total_tests` personas
    pub fn new(url: impl Into<String>, total_tests: u32) -> Self {
        Self {
            url: url.into(),
            total_tests,
            ..Default::default()
        }
    }

    /// Count one finished persona. Refuses to go past `total_tests`.
    pub fn record_completion(&mut self) -> Result<u32> {
        if self.completed_tests >= self.total_tests {
            return Err(Error::Internal(format!(
                "completion beyond total ({}/{})",
                self.completed_tests, self.total_tests
            )));
        }
        self.completed_tests += 1;
        Ok(self.completed_tests)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_tests == self.total_tests
    }

    /// Completion as a percentage, 0 when there is nothing to run
    pub fn progress_percent(&self) -> f64 {
        if self.total_tests == 0 {
            return 0.0;
        }
        f64::from(self.completed_tests) / f64::from(self.total_tests) * 100.0
    }

    pub fn apply_findings(&mut self, findings: ReportFindings) {
        self.summary = findings.summary;
        self.successes = findings.successes;
        self.recommendations = findings.recommendations;
        self.common_issues = findings.common_issues;
        self.overall_score = findings.overall_score.min(100);
    }
}
