//! # Livedoc
//!
//! A document-embedded test harness. Test cases live in documents: the `---`
//! separated blocks of a YAML file, or the fenced code blocks of a Markdown file.
//! Each block is bound to a registered verification function, run under a
//! concurrency and timeout policy, and, when asked to, rewritten in place with the
//! value the function returned, so documentation keeps matching actual behavior.
//!
//! ## Module map
//!
//! - [`tree`]: the generic payload value and its YAML codec
//! - [`fragment`]: splitting documents into fragments with line provenance
//! - [`catalog`]: discovery, expansion and stable case identity
//! - [`registry`]: typed registration of verification and expansion functions
//! - [`context`]: per-run shared state
//! - [`scheduler`]: policy-driven execution with per-case timeouts
//! - [`updater`]: splicing returned values back into documents
//! - [`harness`]: the Discover/Execute boundary
//! - [`report`]: outcomes and reporting sinks
//! - [`config`], [`errors`]

pub mod catalog;
pub mod config;
pub mod context;
pub mod errors;
pub mod fragment;
pub mod harness;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod tree;
pub mod updater;

pub use crate::catalog::{Discovery, DiscoveryWarning, StableId, TestCase, TestData, TestRef};
pub use crate::config::{ConcurrencyPolicy, HarnessConfig, TestSpec};
pub use crate::context::{CancelFlag, RunContext};
pub use crate::errors::{HarnessError, TestFailure};
pub use crate::fragment::{DocumentShape, Fragment};
pub use crate::harness::Harness;
pub use crate::registry::{Expander, Payload, Registry, Returned, Verification};
pub use crate::report::{RunReport, Status, TestOutcome};
pub use crate::tree::TreeValue;

/// Everything a test suite built on livedoc usually needs.
pub mod prelude {
    pub use crate::catalog::{TestCase, TestData, TestRef};
    pub use crate::config::{ConcurrencyPolicy, HarnessConfig, TestSpec};
    pub use crate::context::{CancelFlag, RunContext};
    pub use crate::errors::{HarnessError, TestFailure};
    pub use crate::harness::Harness;
    pub use crate::registry::{Expander, Payload, Registry, Returned, Verification};
    pub use crate::report::{ConsoleReporter, RunReport, SilentReporter, Status, TestOutcome};
    pub use crate::tree::TreeValue;
    pub use crate::{check, fail, skip};
}
