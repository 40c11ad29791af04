//! Livedoc error handling.
//!
//! Two error families live here:
//!
//! - [`HarnessError`] covers everything the harness itself can fail at: malformed
//!   fragment payloads, unreadable documents, bad registrations and bad configuration.
//!   Every variant is a `miette` diagnostic so hosts can render it with source context.
//! - [`TestFailure`] is what a verification function hands back when it does not pass.
//!   It is a plain sum type: a skip is a variant, never a masked failure.
//!
//! Any `std::error::Error` converts into [`TestFailure::Failed`] through `?`, so
//! verification functions can propagate I/O, parse or assertion errors directly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, SourceSpan};
use thiserror::Error;

// ============================================================================
// HARNESS ERRORS
// ============================================================================

/// Unified error type for every harness-level failure mode.
#[derive(Error, Diagnostic, Debug)]
pub enum HarnessError {
    #[error("Parse error: {message}")]
    #[diagnostic(code(livedoc::tree::parse))]
    Parse {
        message: String,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("malformed here")]
        span: Option<SourceSpan>,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    #[diagnostic(code(livedoc::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    #[diagnostic(code(livedoc::glob), help("see the `glob` crate for the supported syntax"))]
    Glob { pattern: String, message: String },

    #[error("Registration error: {message}")]
    #[diagnostic(code(livedoc::registry))]
    Registration {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(livedoc::config))]
    Config { message: String },

    #[error("Failed to start the async runtime: {source}")]
    #[diagnostic(code(livedoc::runtime))]
    Runtime {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode run report: {source}")]
    #[diagnostic(code(livedoc::report))]
    Report {
        #[source]
        source: serde_json::Error,
    },
}

impl HarnessError {
    /// Wraps an I/O failure together with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Builds a parse error pointing at `offset` inside `text`.
    pub fn parse(
        name: impl AsRef<str>,
        text: &str,
        message: impl Into<String>,
        offset: Option<usize>,
    ) -> Self {
        let span = offset.map(|offset| {
            let offset = offset.min(text.len());
            let len = usize::from(offset < text.len());
            SourceSpan::from((offset, len))
        });
        HarnessError::Parse {
            message: message.into(),
            src: Arc::new(NamedSource::new(name, text.to_string())),
            span,
        }
    }

    pub fn registration(message: impl Into<String>, help: Option<String>) -> Self {
        HarnessError::Registration {
            message: message.into(),
            help,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::Config {
            message: message.into(),
        }
    }
}

/// Renders a diagnostic the way miette's graphical handler prints it, without colors.
pub fn render_diagnostic(diagnostic: &dyn Diagnostic) -> String {
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    let mut rendered = String::new();
    if handler.render_report(&mut rendered, diagnostic).is_err() {
        return diagnostic.to_string();
    }
    rendered
}

// ============================================================================
// TEST FAILURES
// ============================================================================

/// Why a verification function did not pass.
///
/// Must not implement `std::error::Error`: the blanket `From<E: Error>` conversion
/// below relies on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFailure {
    /// The test asked to be skipped; `reason` is shown to the user.
    Skipped { reason: String },
    /// The test failed; `stack_trace` carries the error's cause chain when there is one.
    Failed {
        message: String,
        stack_trace: Option<String>,
    },
}

impl TestFailure {
    pub fn skip(reason: impl Into<String>) -> Self {
        TestFailure::Skipped {
            reason: reason.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        TestFailure::Failed {
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TestFailure::Skipped { .. })
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFailure::Skipped { reason } => write!(f, "skipped: {}", reason),
            TestFailure::Failed { message, .. } => f.write_str(message),
        }
    }
}

impl<E> From<E> for TestFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        TestFailure::Failed {
            message: error.to_string(),
            stack_trace: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Returns early from a verification function with [`TestFailure::Failed`].
///
/// `fail!("expected {}, got {}", expected, actual)`
#[macro_export]
macro_rules! fail {
    ($($arg:tt)+) => {
        return ::core::result::Result::Err(::core::convert::Into::into(
            $crate::TestFailure::fail(format!($($arg)+)),
        ))
    };
}

/// Returns early from a verification function with [`TestFailure::Skipped`].
#[macro_export]
macro_rules! skip {
    ($($arg:tt)+) => {
        return ::core::result::Result::Err(::core::convert::Into::into(
            $crate::TestFailure::skip(format!($($arg)+)),
        ))
    };
}

/// Fails the current verification function unless `cond` holds.
#[macro_export]
macro_rules! check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fail!($($arg)+);
        }
    };
}
