mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{registry_with, statuses, Workspace};
use livedoc::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct Span {
    file: String,
    ordinal: usize,
    start: Instant,
    end: Instant,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Clone, Default)]
struct Timeline(Arc<Mutex<Vec<Span>>>);

impl Timeline {
    /// A verification that sleeps for `millis` and records when it ran.
    fn sleeper(&self, millis: u64) -> Verification {
        let timeline = self.clone();
        Verification::new(move |data: TestData| {
            let timeline = timeline.clone();
            async move {
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(millis)).await;
                timeline.0.lock().push(Span {
                    file: data.file_path.file_name().unwrap().to_string_lossy().into_owned(),
                    ordinal: data.ordinal,
                    start,
                    end: Instant::now(),
                });
            }
        })
    }

    fn spans(&self) -> Vec<Span> {
        let mut spans = self.0.lock().clone();
        spans.sort_by_key(|s| s.start);
        spans
    }
}

fn blocks(count: usize) -> String {
    (1..=count)
        .map(|i| format!("# case {}\nx: {}\n", i, i))
        .collect::<Vec<_>>()
        .join("---\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_cases_never_overlap_and_keep_order() {
    let workspace = Workspace::new();
    workspace.write("docs/a.yml", &blocks(3));
    workspace.write("docs/b.yml", &blocks(2));
    let timeline = Timeline::default();
    let harness = Harness::new(registry_with(
        "sleep",
        vec![TestSpec::yaml("docs/*.yml").policy(ConcurrencyPolicy::Sequential)],
        timeline.sleeper(30),
    ));

    let report = harness.run(&workspace.context()).await.unwrap();
    assert_eq!(report.summary.passed, 5);

    let spans = timeline.spans();
    for pair in spans.windows(2) {
        assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    let order: Vec<_> = spans.iter().map(|s| (s.file.as_str(), s.ordinal)).collect();
    assert_eq!(
        order,
        vec![("a.yml", 1), ("a.yml", 2), ("a.yml", 3), ("b.yml", 1), ("b.yml", 2)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_scoped_policy_serializes_within_a_file_only() {
    for policy in [
        ConcurrencyPolicy::FileSequentialTestsParallel,
        ConcurrencyPolicy::FileParallelTestsSequential,
    ] {
        let workspace = Workspace::new();
        workspace.write("docs/a.yml", &blocks(3));
        workspace.write("docs/b.yml", &blocks(3));
        let timeline = Timeline::default();
        let harness = Harness::new(registry_with(
            "sleep",
            vec![TestSpec::yaml("docs/*.yml").policy(policy)],
            timeline.sleeper(60),
        ));

        let report = harness.run(&workspace.context()).await.unwrap();
        assert_eq!(report.summary.passed, 6);

        let spans = timeline.spans();
        for file in ["a.yml", "b.yml"] {
            let same: Vec<_> = spans.iter().filter(|s| s.file == file).collect();
            for pair in same.windows(2) {
                assert!(pair[0].end <= pair[1].start, "{:?}: same-file overlap", policy);
                assert!(pair[0].ordinal < pair[1].ordinal);
            }
        }
        let cross_file_overlap = spans.iter().any(|a| {
            spans
                .iter()
                .any(|b| a.file != b.file && a.overlaps(b))
        });
        assert!(cross_file_overlap, "{:?}: files never ran concurrently", policy);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelism_is_bounded_by_configured_slots() {
    let workspace = Workspace::new();
    workspace.write("docs/a.yml", &blocks(6));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let verification = {
        let (in_flight, peak) = (Arc::clone(&in_flight), Arc::clone(&peak));
        Verification::new(move |_: ()| {
            let (in_flight, peak) = (Arc::clone(&in_flight), Arc::clone(&peak));
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
    };
    let harness = Harness::new(registry_with(
        "count",
        vec![TestSpec::yaml("docs/*.yml")],
        verification,
    ));
    let ctx = workspace.context_with(
        workspace.config().with_max_parallelism(2),
        Box::new(SilentReporter),
    );

    let report = harness.run(&ctx).await.unwrap();
    assert_eq!(report.summary.passed, 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_case_times_out_without_waiting_for_completion() {
    let workspace = Workspace::new();
    workspace.write("docs/slow.yml", "# slow\nx: 1\n");
    let completed = Arc::new(AtomicBool::new(false));
    let verification = {
        let completed = Arc::clone(&completed);
        Verification::new(move |_: ()| {
            let completed = Arc::clone(&completed);
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                completed.store(true, Ordering::SeqCst);
            }
        })
    };
    let harness = Harness::new(registry_with(
        "slow",
        vec![TestSpec::yaml("docs/*.yml").timeout_ms(100)],
        verification,
    ));

    let started = Instant::now();
    let report = harness.run(&workspace.context()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!completed.load(Ordering::SeqCst));
    assert_eq!(statuses(&report), vec![Status::TimedOut]);
    assert_eq!(
        report.outcomes[0].message.as_deref(),
        Some("Test timeout: slow.yml/01: slow")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_failing_case_does_not_affect_its_siblings() {
    let workspace = Workspace::new();
    workspace.write("docs/a.yml", "x: 1\n---\nx: 2\n---\nx: 3\n");
    let harness = Harness::new(registry_with(
        "odd",
        vec![TestSpec::yaml("docs/*.yml")],
        Verification::blocking(|value: TreeValue| -> Result<(), TestFailure> {
            let x = value.get("x").and_then(TreeValue::as_i64).unwrap_or(0);
            livedoc::check!(x % 2 == 1, "{} is even", x);
            Ok(())
        }),
    ));
    let report = harness.run(&workspace.context()).await.unwrap();
    assert_eq!(
        statuses(&report),
        vec![Status::Passed, Status::Failed, Status::Passed]
    );
    assert_eq!(report.outcomes[1].message.as_deref(), Some("2 is even"));
}
