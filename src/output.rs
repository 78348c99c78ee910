use console::Style;
use serde::Serialize;

use crate::result::{RunSummary, TestResult, TestStatus};

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub summary: RunSummary,
    pub results: &'a [TestResult],
}

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

fn status_style(status: TestStatus) -> (Style, &'static str) {
    match status {
        TestStatus::Pass => (Style::new().green().bold(), "✓"),
        TestStatus::Fail => (Style::new().red().bold(), "✗"),
        TestStatus::Skip => (Style::new().yellow().bold(), "-"),
        TestStatus::Broken => (Style::new().magenta().bold(), "!"),
    }
}

/// Covered and total statement lines in an annotation string.
pub fn coverage_counts(annotation: &str) -> (usize, usize) {
    let covered = annotation.chars().filter(|c| *c == 'C').count();
    let uncovered = annotation.chars().filter(|c| *c == 'U').count();
    (covered, covered + uncovered)
}

pub fn print_results(results: &[TestResult]) {
    let dim = Style::new().dim();

    for r in results {
        let (style, glyph) = status_style(r.status);
        match r.duration {
            Some(secs) => println!(
                "{} {} {}",
                style.apply_to(glyph),
                r.name,
                dim.apply_to(format!("({:.3}s)", secs)),
            ),
            None => println!("{} {}", style.apply_to(glyph), r.name),
        }

        if r.status != TestStatus::Pass {
            for line in r.diagnostic.lines() {
                println!("    {}", dim.apply_to(line));
            }
        }
    }

    // Every result of one report carries the same map.
    if let Some(coverage) = results.iter().map(|r| &r.coverage).find(|c| !c.is_empty()) {
        println!();
        for (file, annotation) in coverage {
            let (covered, total) = coverage_counts(annotation);
            println!(
                "  {} {} {}/{} lines",
                dim.apply_to("·"),
                file,
                covered,
                total,
            );
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    let style = if summary.is_success() {
        Style::new().green().bold()
    } else {
        Style::new().red().bold()
    };
    println!();
    println!(
        "{} {} tests: {} passed, {} failed, {} skipped, {} broken in {:.1}s",
        style.apply_to(if summary.is_success() { "✓" } else { "✗" }),
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.broken,
        summary.duration,
    );
}

pub fn to_json(results: &[TestResult]) -> serde_json::Result<String> {
    serde_json::to_string(&JsonReport {
        summary: RunSummary::from_results(results),
        results,
    })
}
