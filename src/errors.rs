use std::path::PathBuf;
use thiserror::Error;

/// The event report could not be turned into results.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(
        "test report is empty or not valid JSON even after repair ({source}). \
         The runner probably failed before finishing its report: re-run it with \
         verbose/trace output enabled and run the generated command yourself to see why"
    )]
    EmptyOrInvalidReport {
        #[source]
        source: serde_json::Error,
    },
}

/// The coverage document could not be read.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("failed to parse coverage XML at byte {position}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create report directory")]
    TempDir(#[source] std::io::Error),
    #[error("failed to run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read report artifact `{}`", path.display())]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Report(#[from] ReportError),
}
