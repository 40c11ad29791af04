//! Outcomes and the reporting sink.
//!
//! Every case produces exactly one [`TestOutcome`]. While a run is in flight the
//! scheduler records start, result and end events on a [`Reporter`]; the run context
//! serializes those calls, so implementations never see interleaved events.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::catalog::{DiscoveryWarning, TestCase};
use crate::errors::{HarnessError, TestFailure};
use crate::tree::TreeValue;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    /// The case could not be re-materialized: its method or fragment is gone.
    NotFound,
    TimedOut,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Passed => "PASS",
            Status::Failed => "FAIL",
            Status::Skipped => "SKIP",
            Status::NotFound => "STALE",
            Status::TimedOut => "TIMEOUT",
        }
    }

    fn color(self) -> Color {
        match self {
            Status::Passed => Color::Green,
            Status::Failed | Status::TimedOut => Color::Red,
            Status::Skipped => Color::Yellow,
            Status::NotFound => Color::Magenta,
        }
    }
}

/// The result of running one test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub test_case: TestCase,
    pub status: Status,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    pub returned_value: Option<TreeValue>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl TestOutcome {
    pub fn passed(test_case: TestCase, returned_value: Option<TreeValue>) -> Self {
        Self::new(test_case, Status::Passed, None).with_value(returned_value)
    }

    pub fn failed(test_case: TestCase, message: impl Into<String>) -> Self {
        Self::new(test_case, Status::Failed, Some(message.into()))
    }

    pub fn skipped(test_case: TestCase, reason: impl Into<String>) -> Self {
        Self::new(test_case, Status::Skipped, Some(reason.into()))
    }

    pub fn not_found(test_case: TestCase, message: impl Into<String>) -> Self {
        Self::new(test_case, Status::NotFound, Some(message.into()))
    }

    pub fn timed_out(test_case: TestCase) -> Self {
        let message = format!("Test timeout: {}", test_case.display_name);
        Self::new(test_case, Status::TimedOut, Some(message))
    }

    /// Maps what a verification function returned onto an outcome.
    pub fn from_failure(test_case: TestCase, failure: TestFailure) -> Self {
        match failure {
            TestFailure::Skipped { reason } => Self::skipped(test_case, reason),
            TestFailure::Failed {
                message,
                stack_trace,
            } => Self {
                stack_trace,
                ..Self::failed(test_case, message)
            },
        }
    }

    fn new(test_case: TestCase, status: Status, message: Option<String>) -> Self {
        Self {
            test_case,
            status,
            message,
            stack_trace: None,
            returned_value: None,
            duration: Duration::ZERO,
        }
    }

    fn with_value(mut self, value: Option<TreeValue>) -> Self {
        self.returned_value = value;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub timed_out: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        outcomes.iter().fold(Summary::default(), |mut summary, outcome| {
            summary.total += 1;
            match outcome.status {
                Status::Passed => summary.passed += 1,
                Status::Failed => summary.failed += 1,
                Status::Skipped => summary.skipped += 1,
                Status::NotFound => summary.not_found += 1,
                Status::TimedOut => summary.timed_out += 1,
            }
            summary
        })
    }

    /// True when nothing failed, timed out or went stale.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.timed_out == 0 && self.not_found == 0
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One outcome per executed case, in input order.
    pub outcomes: Vec<TestOutcome>,
    /// Documents rewritten with returned values.
    pub rewritten: Vec<std::path::PathBuf>,
    pub warnings: Vec<String>,
    pub summary: Summary,
}

impl RunReport {
    pub fn new(outcomes: Vec<TestOutcome>, rewritten: Vec<std::path::PathBuf>) -> Self {
        Self {
            summary: Summary::from_outcomes(&outcomes),
            outcomes,
            rewritten,
            warnings: Vec::new(),
        }
    }

    pub fn outcome(&self, display_name: &str) -> Option<&TestOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.test_case.display_name == display_name)
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        serde_json::to_string_pretty(self).map_err(|source| HarnessError::Report { source })
    }
}

// ============================================================================
// REPORTERS
// ============================================================================

/// Receives run events. Calls are never concurrent.
pub trait Reporter: Send {
    fn record_start(&mut self, _test_case: &TestCase) {}

    fn record_result(&mut self, outcome: &TestOutcome);

    fn record_end(&mut self, _test_case: &TestCase, _status: Status) {}

    fn warning(&mut self, _warning: &DiscoveryWarning) {}

    fn summary(&mut self, _summary: &Summary) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn record_result(&mut self, _outcome: &TestOutcome) {}
}

/// Prints one line per outcome and a closing summary, colored when enabled.
pub struct ConsoleReporter<W: WriteColor + Send = StandardStream> {
    out: W,
}

impl ConsoleReporter {
    pub fn stdout(use_colors: bool) -> Self {
        let choice = if use_colors {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self::with_writer(StandardStream::stdout(choice))
    }
}

impl<W: WriteColor + Send> ConsoleReporter<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&mut self, text: &str, color: Color) {
        let _ = self
            .out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.out, "{}", text);
        let _ = self.out.reset();
    }
}

impl<W: WriteColor + Send> Reporter for ConsoleReporter<W> {
    fn record_result(&mut self, outcome: &TestOutcome) {
        let case = &outcome.test_case;
        self.paint(outcome.status.label(), outcome.status.color());
        let _ = write!(
            self.out,
            ": {} [{}]",
            case.display_name,
            case.fragment.file_path.display()
        );
        match (outcome.status, &outcome.message) {
            (Status::Passed, _) | (_, None) => {}
            (Status::Skipped, Some(reason)) => {
                let _ = write!(self.out, " ({})", reason);
            }
            (_, Some(message)) => {
                let _ = write!(self.out, "\n  Error: {}", message);
            }
        }
        if let Some(trace) = &outcome.stack_trace {
            for line in trace.lines() {
                let _ = write!(self.out, "\n    {}", line);
            }
        }
        let _ = writeln!(self.out);
    }

    fn warning(&mut self, warning: &DiscoveryWarning) {
        self.paint("WARN", Color::Yellow);
        let _ = writeln!(self.out, ": {}", warning);
    }

    fn summary(&mut self, summary: &Summary) {
        let _ = write!(self.out, "\nTest summary: total {}, ", summary.total);
        self.paint("passed", Color::Green);
        let _ = write!(self.out, " {}, ", summary.passed);
        self.paint("failed", Color::Red);
        let _ = write!(self.out, " {}, ", summary.failed);
        self.paint("skipped", Color::Yellow);
        let _ = write!(self.out, " {}", summary.skipped);
        if summary.timed_out > 0 {
            let _ = write!(self.out, ", timed out {}", summary.timed_out);
        }
        if summary.not_found > 0 {
            let _ = write!(self.out, ", stale {}", summary.not_found);
        }
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

/// One recorded reporter call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Start(String),
    Result(String, Status),
    End(String, Status),
    Warning(String),
}

/// Keeps every event in memory; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    events: Arc<parking_lot::Mutex<Vec<ReportEvent>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }
}

impl Reporter for CollectingReporter {
    fn record_start(&mut self, test_case: &TestCase) {
        self.events
            .lock()
            .push(ReportEvent::Start(test_case.display_name.clone()));
    }

    fn record_result(&mut self, outcome: &TestOutcome) {
        self.events.lock().push(ReportEvent::Result(
            outcome.test_case.display_name.clone(),
            outcome.status,
        ));
    }

    fn record_end(&mut self, test_case: &TestCase, status: Status) {
        self.events
            .lock()
            .push(ReportEvent::End(test_case.display_name.clone(), status));
    }

    fn warning(&mut self, warning: &DiscoveryWarning) {
        self.events.lock().push(ReportEvent::Warning(warning.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_case;

    #[test]
    fn failures_map_to_statuses() {
        let case = sample_case("a.yml", 1, None);
        let skipped = TestOutcome::from_failure(case.clone(), TestFailure::skip("later"));
        assert_eq!(skipped.status, Status::Skipped);
        assert_eq!(skipped.message.as_deref(), Some("later"));

        let failed = TestOutcome::from_failure(
            case.clone(),
            TestFailure::Failed {
                message: "bad".into(),
                stack_trace: Some("caused by: io".into()),
            },
        );
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.stack_trace.as_deref(), Some("caused by: io"));

        let timed_out = TestOutcome::timed_out(case.clone());
        assert_eq!(
            timed_out.message,
            Some(format!("Test timeout: {}", case.display_name))
        );
    }

    #[test]
    fn summary_counts_every_status() {
        let case = sample_case("a.yml", 1, None);
        let outcomes = vec![
            TestOutcome::passed(case.clone(), None),
            TestOutcome::failed(case.clone(), "x"),
            TestOutcome::skipped(case.clone(), "y"),
            TestOutcome::not_found(case.clone(), "z"),
            TestOutcome::timed_out(case),
        ];
        let summary = Summary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 5);
        assert_eq!(
            (summary.passed, summary.failed, summary.skipped, summary.not_found, summary.timed_out),
            (1, 1, 1, 1, 1)
        );
        assert!(!summary.is_success());
    }

    #[test]
    fn report_serializes_to_json() {
        let case = sample_case("a.yml", 2, Some("v1"));
        let report = RunReport::new(
            vec![TestOutcome::passed(case, Some(TreeValue::from("Hello")))
                .with_duration(Duration::from_millis(12))],
            vec![],
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["passed"], 1);
        assert_eq!(json["outcomes"][0]["status"], "Passed");
        assert_eq!(json["outcomes"][0]["duration_ms"], 12);
        assert_eq!(json["outcomes"][0]["returned_value"], "Hello");
    }

    #[test]
    fn console_lines_follow_the_pass_fail_skip_format() {
        let case = sample_case("a.yml", 1, None);
        let mut reporter = ConsoleReporter::with_writer(termcolor::Buffer::no_color());
        let outcomes = vec![
            TestOutcome::passed(case.clone(), None),
            TestOutcome::skipped(case.clone(), "Marked as [skip]"),
            TestOutcome::failed(case.clone(), "expected 1"),
        ];
        for outcome in &outcomes {
            reporter.record_result(outcome);
        }
        reporter.summary(&Summary::from_outcomes(&outcomes));
        let text = String::from_utf8(reporter.into_inner().into_inner()).unwrap();
        assert!(text.contains(&format!("PASS: {} [a.yml]", case.display_name)));
        assert!(text.contains("(Marked as [skip])"));
        assert!(text.contains("FAIL: "));
        assert!(text.contains("  Error: expected 1"));
        assert!(text.contains("Test summary: total 3, passed 1, failed 1, skipped 1"));
    }

    #[test]
    fn collecting_reporter_shares_its_log() {
        let collector = CollectingReporter::new();
        let mut sink: Box<dyn Reporter> = Box::new(collector.clone());
        let case = sample_case("a.yml", 1, None);
        sink.record_start(&case);
        sink.record_end(&case, Status::Passed);
        assert_eq!(
            collector.events(),
            vec![
                ReportEvent::Start(case.display_name.clone()),
                ReportEvent::End(case.display_name, Status::Passed),
            ]
        );
    }
}
