//! Process-scoped state for one run.
//!
//! A [`RunContext`] is built once per run and shared behind an `Arc` by discovery and
//! the scheduler. It owns the only mutable shared structures of a run:
//!
//! - the repository root, found by one upward walk and cached;
//! - the method lookup cache, append-only and safe to populate concurrently;
//! - the reporting sink, the single structure guarded by a lock;
//! - the cancellation flag, checked before each case starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::catalog::{DiscoveryWarning, TestCase};
use crate::config::{HarnessConfig, TestSpec};
use crate::errors::HarnessError;
use crate::registry::{RegisteredMethod, Registry};
use crate::report::{ConsoleReporter, Reporter, Summary, TestOutcome};

/// Marker whose presence identifies a repository root.
const VCS_MARKER: &str = ".git";

/// A host-issued cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RunContext {
    config: HarnessConfig,
    working_dir: PathBuf,
    repository_root: OnceCell<Option<PathBuf>>,
    methods: DashMap<String, Option<Arc<RegisteredMethod>>>,
    sink: Mutex<Box<dyn Reporter>>,
    cancel: CancelFlag,
}

impl RunContext {
    /// Builds a context that reports to the console.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        let reporter = ConsoleReporter::stdout(config.use_colors);
        Self::with_reporter(config, Box::new(reporter))
    }

    pub fn with_reporter(
        config: HarnessConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        let working_dir = match &config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| HarnessError::io(".", e))?,
        };
        Ok(Self {
            config,
            working_dir,
            repository_root: OnceCell::new(),
            methods: DashMap::new(),
            sink: Mutex::new(reporter),
            cancel: CancelFlag::new(),
        })
    }

    /// Replaces the cancellation flag with one the host holds on to.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The configured root, relative to the working directory when not absolute.
    pub fn root(&self) -> PathBuf {
        self.working_dir.join(&self.config.root)
    }

    /// Nearest ancestor of the working directory holding a `.git` entry, falling back
    /// to the configured root. Computed once per context.
    pub fn repository_root(&self) -> PathBuf {
        self.repository_root
            .get_or_init(|| find_repository_root(&self.working_dir))
            .clone()
            .unwrap_or_else(|| self.root())
    }

    /// Directory a spec's glob is resolved against, and the glob with any
    /// repository prefix removed.
    pub fn glob_base<'a>(&self, spec: &'a TestSpec) -> (PathBuf, &'a str) {
        match spec.pattern() {
            (true, pattern) => (self.repository_root(), pattern),
            (false, pattern) => (self.root(), pattern),
        }
    }

    /// Looks a case's method up, caching the answer per `<type>.<method>`.
    pub fn resolve_method(
        &self,
        registry: &Registry,
        test_case: &TestCase,
    ) -> Option<Arc<RegisteredMethod>> {
        let key = test_case.method_key();
        if let Some(hit) = self.methods.get(key) {
            return hit.value().clone();
        }
        let resolved = registry.find_by_full_name(key).cloned();
        self.methods.insert(key.to_string(), resolved.clone());
        resolved
    }

    // ------------------------------------------------------------------------
    // Reporting; every call takes the sink lock.
    // ------------------------------------------------------------------------

    pub fn record_start(&self, test_case: &TestCase) {
        self.sink.lock().record_start(test_case);
    }

    /// Records an outcome and the end of its case under one acquisition.
    pub fn record_finish(&self, outcome: &TestOutcome) {
        let mut sink = self.sink.lock();
        sink.record_result(outcome);
        sink.record_end(&outcome.test_case, outcome.status);
    }

    pub fn report_warning(&self, warning: &DiscoveryWarning) {
        self.sink.lock().warning(warning);
    }

    pub fn report_summary(&self, summary: &Summary) {
        self.sink.lock().summary(summary);
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("config", &self.config)
            .field("working_dir", &self.working_dir)
            .field("repository_root", &self.repository_root.get())
            .field("cached_methods", &self.methods.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Walks up from `start` to the first directory containing `.git` (directory or file).
pub fn find_repository_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(VCS_MARKER).exists())
        .map(Path::to_path_buf)
}
