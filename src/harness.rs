//! The Discover/Execute boundary a host test runner talks to.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use livedoc::prelude::*;
//!
//! # fn main() -> Result<(), HarnessError> {
//! let mut registry = Registry::new();
//! registry.register(
//!     "HelloTest",
//!     "greet",
//!     vec![TestSpec::yaml("docs/**/*.yml").update_source(true)],
//!     Verification::blocking(|value: TreeValue| {
//!         format!("Hello {}", value.get("name").and_then(TreeValue::as_str).unwrap_or("nobody"))
//!     }),
//! )?;
//!
//! let ctx = Arc::new(RunContext::new(HarnessConfig::default().with_update_sources(true))?);
//! let report = Harness::new(registry).run_blocking(&ctx)?;
//! if !report.summary.is_success() {
//!     std::process::exit(1);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Discovery, TestCase, TestRef};
use crate::context::RunContext;
use crate::errors::HarnessError;
use crate::registry::Registry;
use crate::report::{RunReport, TestOutcome};
use crate::scheduler::Scheduler;
use crate::updater;

pub struct Harness {
    registry: Arc<Registry>,
}

impl Harness {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Streams every case of every registered method.
    pub fn discover(&self, ctx: &Arc<RunContext>) -> Discovery {
        Discovery::new(Arc::clone(ctx), self.registry.methods())
    }

    /// Runs `cases`, then writes returned values back when the run asks for it.
    pub async fn execute(
        &self,
        ctx: &Arc<RunContext>,
        cases: Vec<TestCase>,
    ) -> Result<RunReport, HarnessError> {
        let outcomes = Scheduler::new(Arc::clone(ctx), Arc::clone(&self.registry))
            .run(cases)
            .await;
        self.finish(ctx, outcomes)
    }

    /// Runs cases a host only kept references to.
    ///
    /// Each reference is re-materialized by a fresh discovery pass over its method's
    /// spec, matched by file, ordinal and matrix label, and checked against its stable
    /// id. References that no longer resolve are reported `NotFound`.
    ///
    /// # Panics
    ///
    /// When a reference names an attribute index the registered method does not have.
    pub async fn execute_refs(
        &self,
        ctx: &Arc<RunContext>,
        refs: &[TestRef],
    ) -> Result<RunReport, HarnessError> {
        let mut rediscovered: HashMap<(String, String, usize), Vec<TestCase>> = HashMap::new();
        let mut resolved = Vec::with_capacity(refs.len());

        for reference in refs {
            let Some(method) = self
                .registry
                .find(&reference.declaring_type, &reference.method)
            else {
                resolved.push(Err(format!(
                    "'{}.{}' is not registered",
                    reference.declaring_type, reference.method
                )));
                continue;
            };
            let key = (
                reference.declaring_type.clone(),
                reference.method.clone(),
                reference.attribute_index,
            );
            let cases = rediscovered.entry(key).or_insert_with(|| {
                Discovery::for_spec(Arc::clone(ctx), Arc::clone(method), reference.attribute_index)
                    .collect()
            });
            let found = cases
                .iter()
                .find(|case| {
                    case.fragment.file_path == reference.file_path
                        && case.fragment.ordinal == reference.ordinal
                        && case.matrix_label == reference.matrix_label
                })
                .filter(|case| case.stable_id == reference.stable_id)
                .cloned();
            resolved.push(found.ok_or_else(|| {
                format!(
                    "fragment #{} of '{}' changed or no longer exists",
                    reference.ordinal,
                    reference.file_path.display()
                )
            }));
        }

        let runnable: Vec<TestCase> = resolved
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        let mut ran = Scheduler::new(Arc::clone(ctx), Arc::clone(&self.registry))
            .run(runnable)
            .await
            .into_iter();

        let mut outcomes = Vec::with_capacity(refs.len());
        for (reference, resolution) in refs.iter().zip(resolved) {
            match resolution {
                Ok(_) => outcomes.extend(ran.next()),
                Err(message) => {
                    tracing::warn!(
                        target: "livedoc::harness",
                        stable_id = %reference.stable_id,
                        %message,
                        "test not found"
                    );
                    let outcome = TestOutcome::not_found(TestCase::unresolved(reference), message);
                    ctx.record_start(&outcome.test_case);
                    ctx.record_finish(&outcome);
                    outcomes.push(outcome);
                }
            }
        }
        self.finish(ctx, outcomes)
    }

    /// Discovers, filters and executes everything registered.
    pub async fn run(&self, ctx: &Arc<RunContext>) -> Result<RunReport, HarnessError> {
        let (mut cases, warnings) = self.discover(ctx).collect_all();
        for warning in &warnings {
            ctx.report_warning(warning);
        }
        if let Some(filter) = &ctx.config().filter {
            let before = cases.len();
            cases.retain(|case| case.matches_filter(filter));
            tracing::debug!(
                target: "livedoc::harness",
                filter = %filter,
                kept = cases.len(),
                dropped = before - cases.len(),
                "applied filter"
            );
        }
        let mut report = self.execute(ctx, cases).await?;
        report.warnings = warnings.iter().map(ToString::to_string).collect();
        Ok(report)
    }

    /// [`Harness::run`] on a runtime of its own, for synchronous hosts.
    ///
    /// Work abandoned by timed-out cases is not waited for.
    pub fn run_blocking(&self, ctx: &Arc<RunContext>) -> Result<RunReport, HarnessError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|source| HarnessError::Runtime { source })?;
        let report = runtime.block_on(self.run(ctx));
        runtime.shutdown_background();
        report
    }

    fn finish(
        &self,
        ctx: &Arc<RunContext>,
        outcomes: Vec<TestOutcome>,
    ) -> Result<RunReport, HarnessError> {
        let rewritten = if ctx.config().update_sources {
            updater::apply(updater::collect(&outcomes)?)?
        } else {
            Vec::new()
        };
        let report = RunReport::new(outcomes, rewritten);
        ctx.report_summary(&report.summary);
        Ok(report)
    }
}
