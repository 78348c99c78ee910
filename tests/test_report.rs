use testfold::report::{self, Event, TestEvent, TraceFrame};
use testfold::result::{CoverageMap, TestStatus};

fn test_event(status: &str, name: &str, message: &str, trace: &[(&str, u64)]) -> Event {
    Event::Test(TestEvent {
        status: Some(status.to_string()),
        test: Some(name.to_string()),
        time: Some(0.01),
        message: Some(message.to_string()),
        trace: Some(
            trace
                .iter()
                .map(|(file, line)| TraceFrame {
                    file: Some(file.to_string()),
                    line: Some(*line),
                })
                .collect(),
        ),
    })
}

fn start(name: &str) -> Event {
    Event::TestStart {
        test: Some(name.to_string()),
    }
}

// --- repair / decode ---

#[test]
fn back_to_back_objects_parse_in_order() {
    let raw = r#"{"event":"test","status":"pass","test":"a"}{"event":"test","status":"pass","test":"b"}"#;
    let results = report::parse_report("FooTest.php", raw, "", None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].name, "a");
    assert_eq!(results[1].name, "b");
    assert!(results.iter().all(|r| r.status == TestStatus::Pass));
}

#[test]
fn pretty_printed_objects_are_repaired() {
    let raw = "{\n    \"event\": \"testStart\",\n    \"test\": \"t1\"\n}{\n    \"event\": \"test\",\n    \"status\": \"pass\",\n    \"test\": \"t1\",\n    \"time\": 0.5\n}";
    let results = report::parse_report("FooTest.php", raw, "", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].duration, Some(0.5));
}

#[test]
fn repair_is_idempotent_on_wrapped_input() {
    let wrapped = r#"[{"event":"test","test":"a"},{"event":"test","test":"b"}]"#;
    assert_eq!(report::repair(wrapped), wrapped);
}

#[test]
fn repair_applied_twice_matches_once() {
    let raw = r#"{"event":"test"}{"event":"test"}"#;
    let once = report::repair(raw);
    assert_eq!(once, r#"[{"event":"test"},{"event":"test"}]"#);
    assert_eq!(report::repair(&once), once);
}

#[test]
fn valid_payload_with_boundary_inside_string_is_not_rewritten() {
    let raw = r#"[{"event":"test","status":"fail","test":"a","message":"got }{\"x\" instead"}]"#;
    let events = report::decode_events(raw).unwrap();
    match &events[0] {
        Event::Test(ev) => assert_eq!(ev.message.as_deref(), Some(r#"got }{"x" instead"#)),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn single_object_decodes_as_one_event() {
    let events = report::decode_events(r#"{"event":"test","status":"pass","test":"a"}"#).unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn unknown_and_untagged_records_become_other() {
    let raw = r#"[{"event":"suiteStart","suite":"S","tests":2},{"foo":1},{"event":"test","status":"pass","test":"a"}]"#;
    let events = report::decode_events(raw).unwrap();
    assert_eq!(events[0], Event::Other);
    assert_eq!(events[1], Event::Other);
    assert!(matches!(events[2], Event::Test(_)));
}

#[test]
fn garbage_report_is_an_error_with_guidance() {
    let err = report::parse_report("FooTest.php", "PHP Fatal error: oops", "", None).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("empty or not valid JSON"));
    assert!(msg.contains("verbose"));
}

// --- empty report ---

#[test]
fn empty_report_yields_single_broken_result() {
    let results = report::parse_report("FooTest.php", "", "Segmentation fault", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "FooTest.php");
    assert_eq!(results[0].status, TestStatus::Broken);
    assert_eq!(results[0].diagnostic, "Segmentation fault");
}

#[test]
fn whitespace_report_counts_as_empty() {
    let results = report::parse_report("FooTest.php", "  \n", "boom", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, TestStatus::Broken);
}

// --- classification ---

#[test]
fn fail_appends_trace_frames_in_order() {
    let events = vec![test_event(
        "fail",
        "testFoo (FooTest)",
        "Failed asserting that false is true.",
        &[("/src/FooTest.php", 12), ("/src/Helper.php", 40)],
    )];
    let results = report::fold_events(&events, "", None);
    assert_eq!(results[0].status, TestStatus::Fail);
    assert_eq!(
        results[0].diagnostic,
        "Failed asserting that false is true.\n\n/src/FooTest.php:12\n/src/Helper.php:40"
    );
}

#[test]
fn skipped_test_is_skip_without_trace() {
    let events = vec![test_event("error", "t", "Skipped Test: needs mysql", &[("/a.php", 1)])];
    let results = report::fold_events(&events, "", None);
    assert_eq!(results[0].status, TestStatus::Skip);
    assert_eq!(results[0].diagnostic, "Skipped Test: needs mysql");
}

#[test]
fn incomplete_test_is_skip() {
    let events = vec![test_event("error", "t", "Incomplete Test: later", &[("/a.php", 1)])];
    let results = report::fold_events(&events, "", None);
    assert_eq!(results[0].status, TestStatus::Skip);
    assert_eq!(results[0].diagnostic, "Incomplete Test: later");
}

#[test]
fn other_error_is_broken_with_trace() {
    let events = vec![test_event("error", "t", "Exception: boom", &[("/a.php", 7)])];
    let results = report::fold_events(&events, "", None);
    assert_eq!(results[0].status, TestStatus::Broken);
    assert_eq!(results[0].diagnostic, "Exception: boom\n/a.php:7");
}

#[test]
fn missing_trace_is_not_an_error() {
    let raw = r#"{"event":"test","status":"error","test":"t","message":"boom"}"#;
    let results = report::parse_report("FooTest.php", raw, "", None).unwrap();
    assert_eq!(results[0].status, TestStatus::Broken);
    assert_eq!(results[0].diagnostic, "boom");
}

#[test]
fn string_trace_line_keeps_the_failure() {
    let raw = r#"{"event":"testStart","test":"t1"}{"event":"test","status":"fail","test":"t1","message":"boom","trace":[{"file":"/a.php","line":"12"}]}"#;
    let results = report::parse_report("FooTest.php", raw, "STDERR", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "t1");
    assert_eq!(results[0].status, TestStatus::Fail);
    assert_eq!(results[0].diagnostic, "boom\n\n/a.php:12");
}

#[test]
fn string_time_keeps_the_result() {
    let raw = r#"{"event":"testStart","test":"t1"}{"event":"test","status":"pass","test":"t1","time":"0.01"}"#;
    let results = report::parse_report("FooTest.php", raw, "STDERR", None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "t1");
    assert_eq!(results[0].status, TestStatus::Pass);
    assert_eq!(results[0].duration, Some(0.01));
}

#[test]
fn odd_field_types_do_not_drop_test_events() {
    let raw = r#"[{"event":"test","status":"error","test":"t1","message":42,"trace":"none"},{"event":"test","status":"pass","test":"t2","time":[1],"trace":[7,{"file":"/b.php"}]}]"#;
    let results = report::parse_report("FooTest.php", raw, "", None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, TestStatus::Broken);
    assert_eq!(results[0].diagnostic, "42");
    assert_eq!(results[1].duration, None);
}

#[test]
fn unknown_status_is_pass() {
    let raw = r#"{"event":"test","status":"warning","test":"t"}"#;
    let results = report::parse_report("FooTest.php", raw, "", None).unwrap();
    assert_eq!(results[0].status, TestStatus::Pass);
    assert_eq!(results[0].diagnostic, "");
    assert_eq!(results[0].duration, None);
}

// --- names ---

#[test]
fn name_suffix_is_stripped() {
    assert_eq!(report::normalize_name("testFoo (FooTest)"), "testFoo");
}

#[test]
fn name_without_suffix_is_unchanged() {
    assert_eq!(report::normalize_name("FooTest::testBar"), "FooTest::testBar");
}

#[test]
fn name_without_closing_paren_is_unchanged() {
    assert_eq!(report::normalize_name("testFoo (FooTest"), "testFoo (FooTest");
}

// --- folding ---

#[test]
fn only_test_events_produce_results() {
    let events = vec![
        Event::Other,
        start("a"),
        test_event("pass", "a", "", &[]),
        Event::Other,
        start("b"),
        test_event("fail", "b", "no", &[]),
    ];
    let results = report::fold_events(&events, "", None);
    assert_eq!(results.len(), 2);
}

#[test]
fn crash_after_test_start_appends_broken_for_last_event() {
    let events = vec![start("a"), test_event("pass", "a", "", &[]), start("b (FooTest)")];
    let results = report::fold_events(&events, "Fatal error: out of memory", None);
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].name, "b (FooTest)");
    assert_eq!(results[1].status, TestStatus::Broken);
    assert_eq!(results[1].diagnostic, "Fatal error: out of memory");
}

#[test]
fn consecutive_test_starts_yield_one_broken() {
    let events = vec![start("a"), start("b"), start("c")];
    let results = report::fold_events(&events, "crash", None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "c");
}

#[test]
fn trailing_unknown_event_after_start_gives_empty_name() {
    let events = vec![start("a"), Event::Other];
    let results = report::fold_events(&events, "crash", None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "");
}

#[test]
fn empty_event_list_yields_nothing() {
    let results = report::parse_report("FooTest.php", "[]", "crash", None).unwrap();
    assert!(results.is_empty());
}

#[test]
fn coverage_is_attached_to_each_result() {
    let mut coverage = CoverageMap::new();
    coverage.insert("src/Foo.php".to_string(), "NCU".to_string());
    let raw = r#"{"event":"test","status":"pass","test":"a"}{"event":"test","status":"pass","test":"b"}"#;
    let results = report::parse_report("FooTest.php", raw, "", Some(&coverage)).unwrap();
    assert!(results.iter().all(|r| r.coverage == coverage));
}
