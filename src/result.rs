use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source path (relative to the project root) -> one `C`/`U`/`N` per physical line.
pub type CoverageMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Broken,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Skip => "skip",
            TestStatus::Broken => "broken",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    /// Seconds, when the runner reported it.
    pub duration: Option<f64>,
    pub diagnostic: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub coverage: CoverageMap,
}

impl TestResult {
    /// A result that stands in for a runner crash rather than a decoded event.
    pub fn broken(name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        TestResult {
            name: name.into(),
            status: TestStatus::Broken,
            duration: None,
            diagnostic: diagnostic.into(),
            coverage: CoverageMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub broken: usize,
    pub duration: f64,
}

impl RunSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..RunSummary::default()
        };
        for r in results {
            match r.status {
                TestStatus::Pass => summary.passed += 1,
                TestStatus::Fail => summary.failed += 1,
                TestStatus::Skip => summary.skipped += 1,
                TestStatus::Broken => summary.broken += 1,
            }
            summary.duration += r.duration.unwrap_or(0.0);
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.broken == 0
    }
}
