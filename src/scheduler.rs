//! Policy-driven execution of test cases.
//!
//! Cases are grouped by [`ConcurrencyPolicy`] and the groups run one after another:
//!
//! 1. `Parallel`: every case is its own task.
//! 2. `FileSequentialTestsParallel` and `FileParallelTestsSequential`: one task per
//!    file; files run concurrently, the cases of one file strictly in order.
//! 3. `Sequential`: one case at a time, in input order.
//!
//! Every case additionally holds one slot of a semaphore sized by
//! `HarnessConfig::max_parallelism` while it runs.
//!
//! A case that outlives its timeout is reported `TimedOut` and its task is left to
//! finish on its own; its eventual result is discarded.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::{parse_payload, TestCase};
use crate::config::ConcurrencyPolicy;
use crate::context::RunContext;
use crate::errors::render_diagnostic;
use crate::registry::{join_failure, Binding, Registry};
use crate::report::TestOutcome;
use crate::tree::TreeValue;

pub const SKIP_REASON: &str = "Marked as [skip]";
pub const ONLY_REASON: &str = "Not marked [only] in [only] mode";
pub const CANCELLED_REASON: &str = "run cancelled";
pub const LOST_REASON: &str = "scheduler task ended before the case reported an outcome";

pub struct Scheduler {
    ctx: Arc<RunContext>,
    registry: Arc<Registry>,
    slots: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(ctx: Arc<RunContext>, registry: Arc<Registry>) -> Self {
        let permits = ctx.config().max_parallelism.clamp(1, Semaphore::MAX_PERMITS);
        let slots = Arc::new(Semaphore::new(permits));
        Self {
            ctx,
            registry,
            slots,
        }
    }

    /// Runs every case and returns one outcome per case, in input order.
    pub async fn run(&self, cases: Vec<TestCase>) -> Vec<TestOutcome> {
        let total = cases.len();
        let runner = Runner {
            ctx: Arc::clone(&self.ctx),
            registry: Arc::clone(&self.registry),
            slots: Arc::clone(&self.slots),
            only_mode: cases.iter().any(TestCase::is_only),
        };
        tracing::debug!(
            target: "livedoc::scheduler",
            total,
            only_mode = runner.only_mode,
            "scheduling run"
        );

        let inputs = cases.clone();
        let mut groups: HashMap<ConcurrencyPolicy, Vec<(usize, TestCase)>> = HashMap::new();
        for (index, case) in cases.into_iter().enumerate() {
            groups.entry(case.policy).or_default().push((index, case));
        }

        let mut outcomes: Vec<Option<TestOutcome>> = vec![None; total];
        for policy in ConcurrencyPolicy::EXECUTION_ORDER {
            let Some(group) = groups.remove(&policy) else {
                continue;
            };
            let finished = match policy {
                ConcurrencyPolicy::Parallel => runner.run_parallel(group).await,
                ConcurrencyPolicy::Sequential => runner.run_in_order(group).await,
                ConcurrencyPolicy::FileSequentialTestsParallel
                | ConcurrencyPolicy::FileParallelTestsSequential => {
                    runner.run_per_file(group).await
                }
            };
            for (index, outcome) in finished {
                outcomes[index] = Some(outcome);
            }
        }
        outcomes
            .into_iter()
            .zip(inputs)
            .map(|(outcome, case)| outcome.unwrap_or_else(|| lost(case)))
            .collect()
    }
}

#[derive(Clone)]
struct Runner {
    ctx: Arc<RunContext>,
    registry: Arc<Registry>,
    slots: Arc<Semaphore>,
    only_mode: bool,
}

type Indexed = Vec<(usize, TestOutcome)>;

impl Runner {
    async fn run_parallel(&self, group: Vec<(usize, TestCase)>) -> Indexed {
        let mut tasks = JoinSet::new();
        for (index, case) in group {
            let runner = self.clone();
            tasks.spawn(async move { vec![(index, runner.run_case(case).await)] });
        }
        collect(tasks).await
    }

    async fn run_per_file(&self, group: Vec<(usize, TestCase)>) -> Indexed {
        let mut files: BTreeMap<PathBuf, Vec<(usize, TestCase)>> = BTreeMap::new();
        for (index, case) in group {
            files
                .entry(case.fragment.file_path.clone())
                .or_default()
                .push((index, case));
        }
        let mut tasks = JoinSet::new();
        for (_, cases) in files {
            let runner = self.clone();
            tasks.spawn(async move { runner.run_in_order(cases).await });
        }
        collect(tasks).await
    }

    async fn run_in_order(&self, group: Vec<(usize, TestCase)>) -> Indexed {
        let mut finished = Vec::with_capacity(group.len());
        for (index, case) in group {
            finished.push((index, self.run_case(case).await));
        }
        finished
    }

    async fn run_case(&self, case: TestCase) -> TestOutcome {
        // The semaphore is never closed.
        let _permit = self.slots.acquire().await.ok();
        let started = Instant::now();
        self.ctx.record_start(&case);
        tracing::debug!(
            target: "livedoc::scheduler",
            case = %case.display_name,
            policy = ?case.policy,
            "starting"
        );

        let outcome = self.evaluate(case).await.with_duration(started.elapsed());

        tracing::debug!(
            target: "livedoc::scheduler",
            case = %outcome.test_case.display_name,
            status = ?outcome.status,
            elapsed_ms = outcome.duration.as_millis() as u64,
            "finished"
        );
        self.ctx.record_finish(&outcome);
        outcome
    }

    async fn evaluate(&self, case: TestCase) -> TestOutcome {
        if self.ctx.is_cancelled() {
            return TestOutcome::skipped(case, CANCELLED_REASON);
        }
        if self.only_mode && !case.is_only() {
            return TestOutcome::skipped(case, ONLY_REASON);
        }
        if case.is_skip() {
            return TestOutcome::skipped(case, SKIP_REASON);
        }

        let Some(method) = self.ctx.resolve_method(&self.registry, &case) else {
            let message = format!("'{}' is not registered", case.method_key());
            return TestOutcome::not_found(case, message);
        };

        let value = if method.binds_payload(case.attribute_index) {
            match parse_payload(&case.fragment) {
                Ok(value) => value,
                Err(error) => {
                    let rendered = render_diagnostic(&error);
                    let mut outcome = TestOutcome::failed(case, error.to_string());
                    outcome.stack_trace = Some(rendered);
                    return outcome;
                }
            }
        } else {
            TreeValue::Null
        };

        let binding = Binding {
            data: case.test_data(),
            value,
        };
        let task = tokio::spawn(method.verification.invoke(binding));
        let deadline = Duration::from_millis(case.timeout_ms);

        match tokio::time::timeout(deadline, task).await {
            Err(_) => TestOutcome::timed_out(case),
            Ok(Err(join_error)) => TestOutcome::from_failure(case, join_failure(join_error)),
            Ok(Ok(Ok(returned))) => TestOutcome::passed(case, returned),
            Ok(Ok(Err(failure))) => TestOutcome::from_failure(case, failure),
        }
    }
}

/// Outcome for a case whose task died before it could report, e.g. because a
/// reporter panicked.
fn lost(case: TestCase) -> TestOutcome {
    tracing::error!(
        target: "livedoc::scheduler",
        case = %case.display_name,
        "case produced no outcome"
    );
    TestOutcome::failed(case, LOST_REASON)
}

async fn collect(mut tasks: JoinSet<Indexed>) -> Indexed {
    let mut finished = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcomes) => finished.extend(outcomes),
            Err(error) => tracing::error!(target: "livedoc::scheduler", %error, "scheduler task failed"),
        }
    }
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_fragment;
    use crate::config::{HarnessConfig, TestSpec};
    use crate::errors::TestFailure;
    use crate::registry::{Payload, Verification};
    use crate::report::{Reporter, SilentReporter, Status};

    fn setup(verification: Verification) -> (Arc<RunContext>, Arc<Registry>) {
        let mut registry = Registry::new();
        registry
            .register("Sched", "verify", vec![TestSpec::yaml("*.yml")], verification)
            .unwrap();
        let config = HarnessConfig::default()
            .with_working_dir(std::env::temp_dir())
            .with_colors(false);
        let ctx = RunContext::with_reporter(config, Box::new(SilentReporter)).unwrap();
        (Arc::new(ctx), Arc::new(registry))
    }

    fn case(registry: &Registry, file: &str, ordinal: usize, summary: &str, raw: &str) -> TestCase {
        let mut fragment = sample_fragment(file, ordinal, Some(summary));
        fragment.raw_text = raw.to_string();
        TestCase::new(
            &registry.methods()[0],
            0,
            Arc::new(fragment),
            None,
            2_000,
            false,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn outcomes_follow_input_order_and_map_statuses() {
        #[derive(serde::Deserialize)]
        struct Input {
            mode: String,
        }
        let (ctx, registry) = setup(Verification::blocking(|Payload(input): Payload<Input>| {
            match input.mode.as_str() {
                "pass" => Ok(TreeValue::from("ok")),
                "skip" => Err(TestFailure::skip("not today")),
                "panic" => panic!("exploded"),
                _ => Err(TestFailure::fail("unknown mode")),
            }
        }));
        let cases = vec![
            case(&registry, "a.yml", 1, "one", "mode: pass\n"),
            case(&registry, "a.yml", 2, "two", "mode: skip\n"),
            case(&registry, "a.yml", 3, "three", "mode: fail\n"),
            case(&registry, "a.yml", 4, "four", "mode: panic\n"),
            case(&registry, "a.yml", 5, "five", "mode: [unclosed\n"),
            case(&registry, "a.yml", 6, "[skip] six", "mode: pass\n"),
        ];
        let names: Vec<_> = cases.iter().map(|c| c.display_name.clone()).collect();
        let outcomes = Scheduler::new(ctx, registry).run(cases).await;

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                Status::Passed,
                Status::Skipped,
                Status::Failed,
                Status::Failed,
                Status::Failed,
                Status::Skipped,
            ]
        );
        let ordered: Vec<_> = outcomes.iter().map(|o| o.test_case.display_name.clone()).collect();
        assert_eq!(ordered, names);
        assert_eq!(outcomes[0].returned_value, Some(TreeValue::from("ok")));
        assert_eq!(outcomes[1].message.as_deref(), Some("not today"));
        assert!(outcomes[3].message.as_deref().unwrap().contains("exploded"));
        assert!(outcomes[4].message.as_deref().unwrap().starts_with("Parse error"));
        assert_eq!(outcomes[5].message.as_deref(), Some(SKIP_REASON));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn only_marker_skips_everything_else() {
        let (ctx, registry) = setup(Verification::blocking(|_: ()| ()));
        let cases = vec![
            case(&registry, "a.yml", 1, "plain", "x: 1\n"),
            case(&registry, "a.yml", 2, "[only] focused", "x: 1\n"),
            case(&registry, "b.yml", 1, "other", "x: 1\n"),
        ];
        let outcomes = Scheduler::new(ctx, registry).run(cases).await;
        assert_eq!(outcomes[0].status, Status::Skipped);
        assert_eq!(outcomes[0].message.as_deref(), Some(ONLY_REASON));
        assert_eq!(outcomes[1].status, Status::Passed);
        assert_eq!(outcomes[2].status, Status::Skipped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_method_is_not_found() {
        let (ctx, registry) = setup(Verification::blocking(|_: ()| ()));
        let mut orphan = case(&registry, "a.yml", 1, "orphan", "x: 1\n");
        orphan.method = "gone".into();
        orphan.fully_qualified_name = "Sched.gone(0,xyz)".into();
        let outcomes = Scheduler::new(ctx, registry).run(vec![orphan]).await;
        assert_eq!(outcomes[0].status, Status::NotFound);
    }

    struct PanickingReporter;

    impl Reporter for PanickingReporter {
        fn record_start(&mut self, test_case: &TestCase) {
            if test_case.display_name.contains("boom") {
                panic!("reporter failed");
            }
        }

        fn record_result(&mut self, _outcome: &TestOutcome) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_input_gets_an_outcome_even_when_its_task_dies() {
        let mut registry = Registry::new();
        registry
            .register(
                "Sched",
                "verify",
                vec![TestSpec::yaml("*.yml")],
                Verification::blocking(|_: ()| ()),
            )
            .unwrap();
        let registry = Arc::new(registry);
        let config = HarnessConfig::default()
            .with_working_dir(std::env::temp_dir())
            .with_colors(false);
        let ctx = Arc::new(RunContext::with_reporter(config, Box::new(PanickingReporter)).unwrap());
        let cases = vec![
            case(&registry, "a.yml", 1, "one", "x: 1\n"),
            case(&registry, "a.yml", 2, "boom", "x: 1\n"),
            case(&registry, "a.yml", 3, "three", "x: 1\n"),
        ];

        let outcomes = Scheduler::new(ctx, registry).run(cases).await;
        let summary: Vec<_> = outcomes
            .iter()
            .map(|o| (o.test_case.fragment.ordinal, o.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, Status::Passed),
                (2, Status::Failed),
                (3, Status::Passed),
            ]
        );
        assert_eq!(outcomes[1].message.as_deref(), Some(LOST_REASON));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_run_skips_pending_cases() {
        let (ctx, registry) = setup(Verification::blocking(|_: ()| ()));
        ctx.cancel_flag().cancel();
        let cases = vec![case(&registry, "a.yml", 1, "one", "x: 1\n")];
        let outcomes = Scheduler::new(ctx, registry).run(cases).await;
        assert_eq!(outcomes[0].status, Status::Skipped);
        assert_eq!(outcomes[0].message.as_deref(), Some(CANCELLED_REASON));
    }
}
