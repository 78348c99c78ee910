use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::coverage::{self, AffectedFiles};
use crate::errors::EngineError;
use crate::report;
use crate::result::{CoverageMap, TestResult};

/// Replaced in runner arguments with the directory the runner writes reports into.
pub const REPORT_DIR_PLACEHOLDER: &str = "{report_dir}";
/// Replaced in runner arguments with the path the coverage report should be written to.
pub const COVERAGE_FILE_PLACEHOLDER: &str = "{coverage_file}";

const COVERAGE_FILE_NAME: &str = "coverage.xml";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Name used for the synthetic result when the runner writes no report.
    pub source_path: String,
    pub coverage: bool,
    pub project_root: Option<Utf8PathBuf>,
    pub affected: AffectedFiles,
    /// Suffix of the temporary report directory; random when absent.
    pub session: Option<String>,
}

#[derive(Debug)]
pub struct EngineOutcome {
    pub results: Vec<TestResult>,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

pub fn split_command(cmd: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts.split_first() {
        Some((program, rest)) => (program.to_string(), rest.iter().map(|s| s.to_string()).collect()),
        None => (String::new(), vec![]),
    }
}

fn generate_session_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn substitute(arg: &str, report_dir: &Path, coverage_file: &Path) -> String {
    arg.replace(REPORT_DIR_PLACEHOLDER, &report_dir.to_string_lossy())
        .replace(COVERAGE_FILE_PLACEHOLDER, &coverage_file.to_string_lossy())
}

/// Regular files the runner left in `dir`, sorted by name, excluding `skip`.
fn collect_artifacts(dir: &Path, skip: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| EngineError::ReadArtifact {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|entry| entry.path())
        .filter(|path| path != skip)
        .collect();
    files.sort();
    Ok(files)
}

fn read_artifact(path: &Path) -> Result<String, EngineError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| EngineError::ReadArtifact {
            path: path.to_path_buf(),
            source,
        })
}

fn load_coverage(config: &EngineConfig, coverage_file: &Path) -> CoverageMap {
    let bytes = match std::fs::read(coverage_file) {
        Ok(b) => b,
        Err(e) => {
            warn!("coverage enabled but no coverage report was written: {e}");
            return CoverageMap::new();
        }
    };
    let line_count = |path: &str| coverage::physical_line_count(Path::new(path));
    match coverage::read_coverage(&bytes, &config.affected, line_count, config.project_root.as_deref()) {
        Ok(map) => map,
        Err(e) => {
            warn!("ignoring unreadable coverage report: {e}");
            CoverageMap::new()
        }
    }
}

/// Run the configured test runner and normalize every report it writes.
///
/// Reports from several artifacts are concatenated in file-name order. A run
/// that leaves no report behind yields a single BROKEN result for
/// `source_path` carrying the runner's stderr.
pub fn run_engine(config: &EngineConfig) -> Result<EngineOutcome, EngineError> {
    let session = config.session.clone().unwrap_or_else(generate_session_id);
    let temp_dir = tempfile::Builder::new()
        .prefix(&format!("testfold-{}-", session))
        .tempdir()
        .map_err(EngineError::TempDir)?;
    let report_dir = temp_dir.path();
    let coverage_file = report_dir.join(COVERAGE_FILE_NAME);

    let mut cmd = Command::new(&config.program);
    for arg in &config.args {
        cmd.arg(substitute(arg, report_dir, &coverage_file));
    }
    debug!("running {:?}", cmd);

    let start = Instant::now();
    let output = cmd.output().map_err(|source| EngineError::Spawn {
        program: config.program.clone(),
        source,
    })?;
    let duration_ms = start.elapsed().as_millis() as u64;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    info!(
        "{} exited with {} after {}ms",
        config.program, output.status, duration_ms
    );

    let coverage = config.coverage.then(|| load_coverage(config, &coverage_file));

    let artifacts = collect_artifacts(report_dir, &coverage_file)?;
    let mut results = Vec::new();
    if artifacts.is_empty() {
        results.extend(report::parse_report(&config.source_path, "", &stderr, None)?);
    }
    for artifact in &artifacts {
        let raw = read_artifact(artifact)?;
        results.extend(report::parse_report(
            &config.source_path,
            &raw,
            &stderr,
            coverage.as_ref(),
        )?);
    }

    Ok(EngineOutcome {
        results,
        stderr,
        exit_code: output.status.code(),
        duration_ms,
    })
}
