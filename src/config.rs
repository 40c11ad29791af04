//! Configuration records.
//!
//! [`TestSpec`] is the declaration attached to a verification function: where its
//! documents live, how they are split, how the resulting cases are scheduled. It is
//! validated eagerly when the function is registered.
//!
//! [`HarnessConfig`] configures a whole run. It has sensible defaults and can be
//! loaded from a YAML file:
//!
//! ```yaml
//! root: docs
//! max_parallelism: 8
//! default_timeout_ms: 30000
//! update_sources: true
//! filter: greet
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::errors::HarnessError;
use crate::fragment::DocumentShape;

/// Timeout applied to a test case that does not declare one.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Prefix marking a glob as relative to the repository root.
pub const REPOSITORY_PREFIXES: [&str; 2] = ["~/", "~\\"];

/// How a test case may overlap in time with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    /// No ordering constraint.
    #[default]
    Parallel,
    /// Strictly one at a time, in declaration order.
    Sequential,
    /// Different files run concurrently; cases within one file run in order.
    FileSequentialTestsParallel,
    /// Files are processed concurrently; within each file cases run in order.
    FileParallelTestsSequential,
}

impl ConcurrencyPolicy {
    /// Order in which policy groups are executed within one run.
    pub const EXECUTION_ORDER: [ConcurrencyPolicy; 4] = [
        ConcurrencyPolicy::Parallel,
        ConcurrencyPolicy::FileSequentialTestsParallel,
        ConcurrencyPolicy::FileParallelTestsSequential,
        ConcurrencyPolicy::Sequential,
    ];

    pub fn is_file_scoped(self) -> bool {
        matches!(
            self,
            ConcurrencyPolicy::FileSequentialTestsParallel
                | ConcurrencyPolicy::FileParallelTestsSequential
        )
    }
}

// ============================================================================
// TEST SPEC
// ============================================================================

/// Declares which documents feed a verification function and how to run them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Glob over document paths. A `~/` prefix resolves against the repository root.
    pub glob: String,
    /// Name of an expansion function registered on the same declaring type.
    pub expand: Option<String>,
    /// Per-case timeout; the run's default applies when unset.
    pub timeout_ms: Option<u64>,
    pub policy: ConcurrencyPolicy,
    pub shape: DocumentShape,
    /// Whether a returned value is written back into the document.
    pub update_source: bool,
}

impl TestSpec {
    /// Multi-document YAML files split at `---`.
    pub fn yaml(glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            expand: None,
            timeout_ms: None,
            policy: ConcurrencyPolicy::default(),
            shape: DocumentShape::Separated,
            update_source: false,
        }
    }

    /// Markdown files; fenced blocks whose info word equals `tip` become fragments.
    /// Without a tip every fenced block is a fragment.
    pub fn markdown(glob: impl Into<String>, tip: Option<&str>) -> Self {
        Self {
            shape: DocumentShape::Fenced {
                tip: tip.map(str::to_string),
            },
            ..Self::yaml(glob)
        }
    }

    pub fn expand(mut self, function: impl Into<String>) -> Self {
        self.expand = Some(function.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn update_source(mut self, update: bool) -> Self {
        self.update_source = update;
        self
    }

    /// Splits the glob into (relative-to-repository, pattern).
    pub fn pattern(&self) -> (bool, &str) {
        REPOSITORY_PREFIXES
            .iter()
            .find_map(|prefix| self.glob.strip_prefix(prefix))
            .map_or((false, self.glob.as_str()), |rest| (true, rest))
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        let (_, pattern) = self.pattern();
        if pattern.trim().is_empty() {
            return Err(HarnessError::registration(
                "glob pattern is empty",
                Some("use `**` to match every file under the root".to_string()),
            ));
        }
        glob::Pattern::new(pattern).map_err(|e| HarnessError::Glob {
            pattern: self.glob.clone(),
            message: e.to_string(),
        })?;
        if self.timeout_ms == Some(0) {
            return Err(HarnessError::registration(
                format!("timeout for '{}' must be greater than zero", self.glob),
                None,
            ));
        }
        if let Some(name) = &self.expand {
            if name.trim().is_empty() {
                return Err(HarnessError::registration(
                    "expansion function name is empty",
                    None,
                ));
            }
        }
        if let DocumentShape::Fenced { tip: Some(tip) } = &self.shape {
            if tip.trim().is_empty() || tip.contains(char::is_whitespace) {
                return Err(HarnessError::registration(
                    format!("fence tip '{}' must be a single word", tip),
                    None,
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// HARNESS CONFIG
// ============================================================================

/// Configuration for discovery, execution and reporting of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root that plain globs are resolved against.
    pub root: PathBuf,
    /// Directory the repository-root search starts from; the process working
    /// directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Maximum number of cases in flight at once.
    pub max_parallelism: usize,
    pub default_timeout_ms: u64,
    /// Rewrite documents with returned values after the run.
    pub update_sources: bool,
    /// Case-insensitive substring a display name or qualified name must contain.
    pub filter: Option<String>,
    pub use_colors: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            working_dir: None,
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get() * 4)
                .unwrap_or(16),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            update_sources: false,
            filter: None,
            use_colors: atty::is(atty::Stream::Stderr),
        }
    }
}

impl HarnessConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = max;
        self
    }

    pub fn with_update_sources(mut self, update: bool) -> Self {
        self.update_sources = update;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, HarnessError> {
        let config: HarnessConfig = if text.trim().is_empty() {
            HarnessConfig::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| HarnessError::config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.max_parallelism == 0 {
            return Err(HarnessError::config("max_parallelism must be at least 1"));
        }
        if self.max_parallelism > Semaphore::MAX_PERMITS {
            return Err(HarnessError::config(format!(
                "max_parallelism must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.default_timeout_ms == 0 {
            return Err(HarnessError::config(
                "default_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn timeout_for(&self, spec: &TestSpec) -> u64 {
        spec.timeout_ms.unwrap_or(self.default_timeout_ms)
    }
}
