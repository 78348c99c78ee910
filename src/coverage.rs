//! Per-line coverage annotations from Clover-style XML reports.
//!
//! Each affected source file becomes one string with a character per
//! physical line: `C` covered statement, `U` uncovered statement, `N` anything
//! else.

use std::collections::BTreeMap;
use std::path::Path;

use camino::Utf8Path;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::errors::CoverageError;
use crate::result::CoverageMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Statement,
    Other,
}

/// A `<line>` element: 1-based line number, kind and execution count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRecord {
    pub num: usize,
    pub kind: LineKind,
    pub count: u64,
}

impl LineRecord {
    fn annotation(&self) -> char {
        match (self.kind, self.count) {
            (LineKind::Other, _) => 'N',
            (LineKind::Statement, 0) => 'U',
            (LineKind::Statement, _) => 'C',
        }
    }
}

/// Source files whose coverage should be reported, each mapped to the test
/// that exercises it. A file mapped to an empty test name counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectedFiles {
    files: BTreeMap<String, String>,
}

impl AffectedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, test: impl Into<String>) {
        self.files.insert(source.into(), test.into());
    }

    pub fn contains(&self, source: &str) -> bool {
        self.files.get(source).is_some_and(|test| !test.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for AffectedFiles {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut affected = AffectedFiles::new();
        for (source, test) in iter {
            affected.insert(source, test);
        }
        affected
    }
}

/// Build the annotation string for one file.
///
/// Lines the records skip over are `N`, as is everything after the last
/// record. Records past `line_count`, or not after the previous record, are
/// ignored so the result is always exactly `line_count` characters.
pub fn annotate(lines: &[LineRecord], line_count: usize) -> String {
    let mut annotation = String::with_capacity(line_count);
    let mut next_line = 1;

    for line in lines {
        if line.num < next_line || line.num > line_count {
            debug!("ignoring coverage record for line {}", line.num);
            continue;
        }
        for _ in next_line..line.num {
            annotation.push('N');
        }
        annotation.push(line.annotation());
        next_line = line.num + 1;
    }

    for _ in next_line..=line_count {
        annotation.push('N');
    }

    annotation
}

/// Number of physical lines, counting a final line without a trailing newline.
pub fn physical_line_count(path: &Path) -> std::io::Result<usize> {
    let bytes = std::fs::read(path)?;
    Ok(bytes.split_inclusive(|b| *b == b'\n').count())
}

fn attribute_value(tag: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    tag.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Integer part of an execution count: `"3.5"` is 3, anything non-numeric
/// or negative is 0.
fn parse_count(value: &str) -> u64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite() && *c > 0.0)
        .map(|c| c.trunc() as u64)
        .unwrap_or(0)
}

fn line_record(tag: &BytesStart<'_>) -> Option<LineRecord> {
    let num = attribute_value(tag, b"num")?.trim().parse::<usize>().ok()?;
    if num == 0 {
        return None;
    }
    let kind = match attribute_value(tag, b"type").as_deref() {
        Some("stmt") => LineKind::Statement,
        _ => LineKind::Other,
    };
    let count = attribute_value(tag, b"count")
        .as_deref()
        .map(parse_count)
        .unwrap_or(0);
    Some(LineRecord { num, kind, count })
}

fn report_key(path: &str, project_root: Option<&Utf8Path>) -> String {
    project_root
        .and_then(|root| Utf8Path::new(path).strip_prefix(root).ok())
        .map(|rel| rel.to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Read a coverage report into a [`CoverageMap`].
///
/// Only files in `affected` are reported. `line_count` supplies each file's
/// physical line count; a file whose count cannot be determined is skipped.
/// Keys are relative to `project_root` when the path lies under it.
pub fn read_coverage<F>(
    bytes: &[u8],
    affected: &AffectedFiles,
    mut line_count: F,
    project_root: Option<&Utf8Path>,
) -> Result<CoverageMap, CoverageError>
where
    F: FnMut(&str) -> std::io::Result<usize>,
{
    let mut reports = CoverageMap::new();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        warn!("coverage report is empty, no coverage will be attached");
        return Ok(reports);
    }

    let mut finish = |path: String, lines: Vec<LineRecord>| match line_count(&path) {
        Ok(count) => {
            reports.insert(report_key(&path, project_root), annotate(&lines, count));
        }
        Err(e) => warn!("cannot count lines of {path}, skipping its coverage: {e}"),
    };

    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<(String, Vec<LineRecord>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => match tag.name().as_ref() {
                b"file" => {
                    current = attribute_value(&tag, b"name")
                        .filter(|name| affected.contains(name))
                        .map(|name| (name, Vec::new()));
                }
                b"line" => {
                    if let (Some((_, lines)), Some(record)) = (current.as_mut(), line_record(&tag)) {
                        lines.push(record);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(tag)) => match tag.name().as_ref() {
                b"file" => {
                    if let Some(name) = attribute_value(&tag, b"name").filter(|n| affected.contains(n)) {
                        finish(name, Vec::new());
                    }
                }
                b"line" => {
                    if let (Some((_, lines)), Some(record)) = (current.as_mut(), line_record(&tag)) {
                        lines.push(record);
                    }
                }
                _ => {}
            },
            Ok(Event::End(tag)) => {
                if tag.name().as_ref() == b"file" {
                    if let Some((name, lines)) = current.take() {
                        finish(name, lines);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(CoverageError::Xml {
                    position: reader.buffer_position(),
                    source,
                });
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("collected coverage for {} files", reports.len());
    Ok(reports)
}
