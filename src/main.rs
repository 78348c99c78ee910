use testfold::coverage::{self, AffectedFiles};
use testfold::engine::{self, EngineConfig};
use testfold::output;
use testfold::report;
use testfold::result::{CoverageMap, RunSummary, TestResult};

use std::path::{Path, PathBuf};
use std::process;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Parser)]
#[command(name = "testfold", version, about = "Normalize test runner reports and coverage")]
struct Cli {
    /// Log filter directives (e.g. `debug` or `testfold::report=trace`)
    #[arg(long, global = true, env = "TESTFOLD_LOG", default_value = "warn")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an existing event report
    Parse {
        /// Event report written by the test runner
        report: PathBuf,
        /// Name for the broken result when the report is empty (default: the report path)
        #[arg(long)]
        source_path: Option<String>,
        /// File holding the runner's captured stderr
        #[arg(long)]
        stderr_file: Option<PathBuf>,
        /// Clover-style coverage report to attach to each result
        #[arg(long)]
        coverage: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run a test runner and parse the reports it writes
    Run {
        /// Runner command; `{report_dir}` and `{coverage_file}` are substituted
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
        /// Name for the broken result when the runner writes no report
        #[arg(long, default_value = "tests")]
        source_path: String,
        /// Read `{coverage_file}` after the run and attach it to each result
        #[arg(long)]
        coverage: bool,
        /// Suffix for the temporary report directory (default: random)
        #[arg(long)]
        session: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Source file to report coverage for, as PATH or PATH=TEST (repeatable)
    #[arg(long = "affected", value_name = "PATH[=TEST]")]
    affected: Vec<String>,
    /// Prefix stripped from coverage paths
    #[arg(long, env = "TESTFOLD_PROJECT_ROOT")]
    project_root: Option<Utf8PathBuf>,
    /// Output JSON instead of human-readable text
    #[arg(long)]
    json: bool,
    /// Exit code only, no output
    #[arg(short, long)]
    quiet: bool,
}

impl CommonArgs {
    fn affected_files(&self) -> AffectedFiles {
        let affected: AffectedFiles = self.affected.iter().map(|a| testfold::parse_affected(a)).collect();
        if affected.is_empty() {
            tracing::warn!("coverage requested without --affected files, no coverage will be reported");
        }
        affected
    }
}

fn init_logging(directives: &str) {
    let targets = match directives.parse::<Targets>() {
        Ok(t) => t,
        Err(e) => {
            output::print_error(&format!("Invalid log filter `{}`: {}", directives, e));
            Targets::new().with_default(LevelFilter::WARN)
        }
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(targets);
    tracing_subscriber::registry().with(layer).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let exit_code = match cli.command {
        Commands::Parse {
            report,
            source_path,
            stderr_file,
            coverage,
            common,
        } => cmd_parse(report, source_path, stderr_file, coverage, common),
        Commands::Run {
            cmd,
            source_path,
            coverage,
            session,
            common,
        } => cmd_run(cmd, source_path, coverage, session, common),
    };

    process::exit(exit_code);
}

fn read_coverage_file(path: &Path, common: &CommonArgs) -> Result<CoverageMap, i32> {
    let bytes = std::fs::read(path).map_err(|e| {
        output::print_error(&format!("Failed to read {}: {}", path.display(), e));
        2
    })?;
    let line_count = |p: &str| coverage::physical_line_count(Path::new(p));
    match coverage::read_coverage(
        &bytes,
        &common.affected_files(),
        line_count,
        common.project_root.as_deref(),
    ) {
        Ok(map) => Ok(map),
        Err(e) => {
            tracing::warn!("ignoring coverage report {}: {}", path.display(), e);
            Ok(CoverageMap::new())
        }
    }
}

fn cmd_parse(
    report_path: PathBuf,
    source_path: Option<String>,
    stderr_file: Option<PathBuf>,
    coverage_path: Option<PathBuf>,
    common: CommonArgs,
) -> i32 {
    let raw = match std::fs::read(&report_path) {
        Ok(b) => String::from_utf8_lossy(&b).into_owned(),
        Err(e) => {
            output::print_error(&format!("Failed to read {}: {}", report_path.display(), e));
            return 2;
        }
    };

    let stderr = match stderr_file {
        Some(path) => match std::fs::read(&path) {
            Ok(b) => String::from_utf8_lossy(&b).into_owned(),
            Err(e) => {
                output::print_error(&format!("Failed to read {}: {}", path.display(), e));
                return 2;
            }
        },
        None => String::new(),
    };

    let coverage = match coverage_path {
        Some(path) => match read_coverage_file(&path, &common) {
            Ok(map) => Some(map),
            Err(code) => return code,
        },
        None => None,
    };

    let source_path = source_path.unwrap_or_else(|| report_path.display().to_string());
    match report::parse_report(&source_path, &raw, &stderr, coverage.as_ref()) {
        Ok(results) => finalize_results(&results, &common),
        Err(e) => {
            output::print_error(&e.to_string());
            3
        }
    }
}

fn cmd_run(
    cmd: Vec<String>,
    source_path: String,
    coverage: bool,
    session: Option<String>,
    common: CommonArgs,
) -> i32 {
    // A single quoted argument is a whole command line.
    let (program, args) = match cmd.as_slice() {
        [line] => engine::split_command(line),
        [program, rest @ ..] => (program.clone(), rest.to_vec()),
        [] => (String::new(), vec![]),
    };
    if program.is_empty() {
        output::print_error("No runner command given.");
        return 2;
    }

    let affected = if coverage {
        common.affected_files()
    } else {
        AffectedFiles::new()
    };

    let config = EngineConfig {
        program,
        args,
        source_path,
        coverage,
        project_root: common.project_root.clone(),
        affected,
        session,
    };

    match engine::run_engine(&config) {
        Ok(outcome) => finalize_results(&outcome.results, &common),
        Err(e) => {
            output::print_error(&e.to_string());
            3
        }
    }
}

fn finalize_results(results: &[TestResult], common: &CommonArgs) -> i32 {
    let summary = RunSummary::from_results(results);
    let code = if summary.is_success() { 0 } else { 1 };

    if common.quiet {
        return code;
    }

    if common.json {
        match output::to_json(results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                output::print_error(&format!("Failed to serialize results: {}", e));
                return 3;
            }
        }
    } else {
        output::print_results(results);
        output::print_summary(&summary);
    }

    code
}
