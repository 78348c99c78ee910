pub mod coverage;
pub mod engine;
pub mod errors;
pub mod output;
pub mod report;
pub mod result;

pub use coverage::{AffectedFiles, read_coverage};
pub use errors::{CoverageError, EngineError, ReportError};
pub use report::parse_report;
pub use result::{CoverageMap, RunSummary, TestResult, TestStatus};

/// Parse a `PATH[=TEST]` argument into an affected-file entry. Without an
/// explicit test the path is its own owner.
pub fn parse_affected(arg: &str) -> (String, String) {
    match arg.split_once('=') {
        Some((path, test)) => (path.to_string(), test.to_string()),
        None => (arg.to_string(), arg.to_string()),
    }
}
