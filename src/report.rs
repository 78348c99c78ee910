//! Normalization of event-stream test reports.
//!
//! The runner writes one JSON object per lifecycle event, back to back and
//! without an enclosing array. [`parse_report`] repairs that stream, decodes
//! it into [`Event`]s and folds them into one [`TestResult`] per finished test.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ReportError;
use crate::result::{CoverageMap, TestResult, TestStatus};

static OBJECT_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\}\{(\s*)""#).expect("valid boundary regex"));

static NAME_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s) \(.*\)").expect("valid suffix regex"));

/// One decoded record from the event report.
///
/// Only the `event` tag is decoded strictly. Payload fields tolerate loose
/// typing (numbers written as strings and the like) so a recognizable `test`
/// record is never dropped because of one odd field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "testStart")]
    TestStart {
        #[serde(default, deserialize_with = "lenient_string")]
        test: Option<String>,
    },
    #[serde(rename = "test")]
    Test(TestEvent),
    #[serde(other)]
    Other,
}

impl Event {
    fn test_name(&self) -> Option<&str> {
        match self {
            Event::TestStart { test } => test.as_deref(),
            Event::Test(ev) => ev.test.as_deref(),
            Event::Other => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub test: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_trace")]
    pub trace: Option<Vec<TraceFrame>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TraceFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub line: Option<u64>,
}

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A trace that is not an array is treated as absent; frames that are not
/// objects render as an empty `:`.
fn lenient_trace<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<TraceFrame>>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Array(frames) => Some(
            frames
                .into_iter()
                .map(|frame| serde_json::from_value(frame).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    })
}

/// Rewrite `}{"` boundaries to `},{"` and wrap the payload in `[...]`.
///
/// Input that is already an array is only boundary-rewritten, so applying
/// this twice gives the same text as applying it once.
pub fn repair(raw: &str) -> String {
    let joined = OBJECT_BOUNDARY.replace_all(raw, "},{$1\"");
    let trimmed = joined.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        joined.into_owned()
    } else {
        format!("[{joined}]")
    }
}

/// Decode a raw report into events.
///
/// Strict decoding is tried first; the boundary rewrite only runs when the
/// payload does not parse as-is. Records whose `event` tag is missing or not
/// a string decode to [`Event::Other`].
pub fn decode_events(raw: &str) -> Result<Vec<Event>, ReportError> {
    let values = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(obj @ Value::Object(_)) => vec![obj],
        _ => {
            debug!("report is not well-formed JSON, rewriting object boundaries");
            serde_json::from_str::<Vec<Value>>(&repair(raw))
                .map_err(|source| ReportError::EmptyOrInvalidReport { source })?
        }
    };

    Ok(values
        .into_iter()
        .map(|value| match serde_json::from_value::<Event>(value) {
            Ok(event) => event,
            Err(e) => {
                debug!("ignoring report record without a usable event tag: {e}");
                Event::Other
            }
        })
        .collect())
}

/// Strip a trailing parenthesized suffix: `"testFoo (FooTest)"` -> `"testFoo"`.
pub fn normalize_name(name: &str) -> String {
    NAME_SUFFIX.replace(name, "").into_owned()
}

fn append_trace(diagnostic: &mut String, trace: Option<&[TraceFrame]>) {
    for frame in trace.unwrap_or_default() {
        diagnostic.push('\n');
        diagnostic.push_str(frame.file.as_deref().unwrap_or_default());
        diagnostic.push(':');
        if let Some(line) = frame.line {
            diagnostic.push_str(&line.to_string());
        }
    }
}

/// Status and diagnostic text for one `test` event.
pub fn classify(event: &TestEvent) -> (TestStatus, String) {
    let message = event.message.as_deref().unwrap_or_default();
    let trace = event.trace.as_deref();

    match event.status.as_deref() {
        Some("fail") => {
            let mut diagnostic = format!("{message}\n");
            append_trace(&mut diagnostic, trace);
            (TestStatus::Fail, diagnostic)
        }
        Some("error") => {
            if message.contains("Skipped Test") || message.contains("Incomplete Test") {
                (TestStatus::Skip, message.to_string())
            } else {
                let mut diagnostic = message.to_string();
                append_trace(&mut diagnostic, trace);
                (TestStatus::Broken, diagnostic)
            }
        }
        _ => (TestStatus::Pass, String::new()),
    }
}

/// State threaded through the single pass over the events.
struct Fold<'a> {
    results: Vec<TestResult>,
    last_test_finished: bool,
    last_event: Option<&'a Event>,
}

/// Turn decoded events into results, in report order.
///
/// If the stream ends after a `testStart` with no matching `test` event, one
/// synthetic BROKEN result carrying `stderr` is appended. An empty event list
/// yields no results at all.
pub fn fold_events(events: &[Event], stderr: &str, coverage: Option<&CoverageMap>) -> Vec<TestResult> {
    let mut fold = Fold {
        results: Vec::new(),
        last_test_finished: true,
        last_event: None,
    };

    for event in events {
        fold.last_event = Some(event);
        let test = match event {
            Event::Test(test) => test,
            Event::TestStart { .. } => {
                fold.last_test_finished = false;
                continue;
            }
            Event::Other => continue,
        };

        let (status, diagnostic) = classify(test);
        fold.results.push(TestResult {
            name: normalize_name(test.test.as_deref().unwrap_or_default()),
            status,
            duration: test.time,
            diagnostic,
            coverage: coverage.cloned().unwrap_or_default(),
        });
        fold.last_test_finished = true;
    }

    if !fold.last_test_finished {
        let name = fold.last_event.and_then(Event::test_name).unwrap_or_default();
        warn!("report ended before test `{name}` finished, recording it as broken");
        fold.results.push(TestResult::broken(name, stderr));
    }

    fold.results
}

/// Parse one raw event report produced for `source_path`.
///
/// An empty report means the runner never wrote one: the whole source path is
/// reported as a single BROKEN result carrying `stderr`.
pub fn parse_report(
    source_path: &str,
    raw: &str,
    stderr: &str,
    coverage: Option<&CoverageMap>,
) -> Result<Vec<TestResult>, ReportError> {
    if raw.trim().is_empty() {
        warn!("no test report for {source_path}, recording it as broken");
        return Ok(vec![TestResult::broken(source_path, stderr)]);
    }

    let events = decode_events(raw)?;
    debug!("decoded {} report events for {source_path}", events.len());
    Ok(fold_events(&events, stderr, coverage))
}
