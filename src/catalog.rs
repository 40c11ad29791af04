//! Test discovery and identity.
//!
//! For every registered method and every [`TestSpec`] it declares, discovery resolves
//! the test spec's glob, streams each matching document's fragments and turns each
//! fragment into one or more [`TestCase`]s. A case's identity is derived from its
//! content and declared position only:
//!
//! ```text
//! display_name         = "<file>/<ordinal:02>: [<label>] <summary>"
//! fully_qualified_name = "<type>.<method>(<attribute_index>,<base64(display_name)>)"
//! stable_id            = sha256(fully_qualified_name)[..16]
//! ```
//!
//! so two independent discovery passes over unchanged documents agree on every id.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine as _;
use miette::Diagnostic;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{ConcurrencyPolicy, HarnessConfig, TestSpec};
use crate::context::RunContext;
use crate::fragment::{self, Fragment, Fragments};
use crate::registry::{Binding, RegisteredMethod};
use crate::tree::{self, TreeValue};

static SKIP_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[skip\]").unwrap());
static ONLY_DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[only\]").unwrap());

// ============================================================================
// TEST DATA
// ============================================================================

/// Raw metadata of a case, bindable by verification and expansion functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestData {
    pub file_path: PathBuf,
    /// Line the payload starts on.
    pub line_number: usize,
    pub ordinal: usize,
    pub summary: Option<String>,
    pub fence_tip: Option<String>,
    /// Payload text, each line terminated by `\n`.
    pub content: String,
    /// Matrix label of this variant; `None` when the fragment is not expanded.
    pub matrix: Option<String>,
    /// Whether a returned value will be written back into the document.
    pub update_source: bool,
}

impl TestData {
    pub fn from_fragment(fragment: &Fragment, matrix: Option<String>, update_source: bool) -> Self {
        Self {
            file_path: fragment.file_path.clone(),
            line_number: fragment.content_start_line,
            ordinal: fragment.ordinal,
            summary: fragment.summary.clone(),
            fence_tip: fragment.fence_tip.clone(),
            content: fragment.raw_text.clone(),
            matrix,
            update_source,
        }
    }
}

// ============================================================================
// STABLE ID
// ============================================================================

/// Content-derived case identity: the first 16 bytes of a SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableId([u8; 16]);

impl StableId {
    pub fn of(fully_qualified_name: &str) -> Self {
        let digest = Sha256::digest(fully_qualified_name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        StableId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
    }
}

impl fmt::Debug for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableId({})", self)
    }
}

impl FromStr for StableId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(format!("expected 32 hex digits, got '{}'", s));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid stable id '{}': {}", s, e))?;
        }
        Ok(StableId(bytes))
    }
}

impl Serialize for StableId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StableId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TEST CASES
// ============================================================================

/// One runnable unit: a fragment bound to a verification function, possibly one
/// matrix variant of it.
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub declaring_type: String,
    pub method: String,
    /// Position of the originating spec among the method's specs.
    pub attribute_index: usize,
    pub fragment: Arc<Fragment>,
    pub matrix_label: Option<String>,
    pub timeout_ms: u64,
    pub policy: ConcurrencyPolicy,
    pub stable_id: StableId,
    pub display_name: String,
    pub fully_qualified_name: String,
    pub update_eligible: bool,
}

impl TestCase {
    pub fn new(
        method: &RegisteredMethod,
        attribute_index: usize,
        fragment: Arc<Fragment>,
        matrix_label: Option<String>,
        timeout_ms: u64,
        update_eligible: bool,
    ) -> Self {
        let policy = method.specs[attribute_index].policy;
        let display_name = display_name(&fragment, matrix_label.as_deref());
        let fully_qualified_name = fully_qualified_name(
            &method.declaring_type,
            &method.name,
            attribute_index,
            &display_name,
        );
        Self {
            declaring_type: method.declaring_type.clone(),
            method: method.name.clone(),
            attribute_index,
            fragment,
            matrix_label,
            timeout_ms,
            policy,
            stable_id: StableId::of(&fully_qualified_name),
            display_name,
            fully_qualified_name,
            update_eligible,
        }
    }

    /// Placeholder for a reference that no longer resolves to anything.
    pub fn unresolved(reference: &TestRef) -> Self {
        let fragment = Fragment {
            file_path: reference.file_path.clone(),
            start_line: 0,
            content_start_line: 0,
            ordinal: reference.ordinal,
            summary: None,
            fence_tip: None,
            raw_text: String::new(),
        };
        Self {
            declaring_type: reference.declaring_type.clone(),
            method: reference.method.clone(),
            attribute_index: reference.attribute_index,
            fragment: Arc::new(fragment),
            matrix_label: reference.matrix_label.clone(),
            timeout_ms: crate::config::DEFAULT_TIMEOUT_MS,
            policy: ConcurrencyPolicy::default(),
            stable_id: reference.stable_id,
            display_name: reference.display_name.clone(),
            fully_qualified_name: format!(
                "{}.{}({})",
                reference.declaring_type, reference.method, reference.attribute_index
            ),
            update_eligible: false,
        }
    }

    /// `<declaring_type>.<method>`, the cache key for method lookup.
    pub fn method_key(&self) -> &str {
        self.fully_qualified_name
            .split_once('(')
            .map_or(self.fully_qualified_name.as_str(), |(head, _)| head)
    }

    pub fn test_data(&self) -> TestData {
        TestData::from_fragment(
            &self.fragment,
            self.matrix_label.clone(),
            self.update_eligible,
        )
    }

    pub fn to_ref(&self) -> TestRef {
        TestRef {
            stable_id: self.stable_id,
            declaring_type: self.declaring_type.clone(),
            method: self.method.clone(),
            attribute_index: self.attribute_index,
            file_path: self.fragment.file_path.clone(),
            ordinal: self.fragment.ordinal,
            matrix_label: self.matrix_label.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn is_skip(&self) -> bool {
        SKIP_DIRECTIVE.is_match(&self.display_name)
    }

    pub fn is_only(&self) -> bool {
        ONLY_DIRECTIVE.is_match(&self.display_name)
    }

    /// Case-insensitive substring match over the display or qualified name.
    pub fn matches_filter(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.display_name.to_lowercase().contains(&filter)
            || self.fully_qualified_name.to_lowercase().contains(&filter)
    }
}

/// The identity a host keeps for a case between discovery and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRef {
    pub stable_id: StableId,
    pub declaring_type: String,
    pub method: String,
    pub attribute_index: usize,
    pub file_path: PathBuf,
    pub ordinal: usize,
    pub matrix_label: Option<String>,
    pub display_name: String,
}

pub fn display_name(fragment: &Fragment, matrix_label: Option<&str>) -> String {
    let mut name = format!("{}/{:02}:", fragment.file_name(), fragment.ordinal);
    if let Some(label) = matrix_label.filter(|l| !l.is_empty()) {
        name.push_str(&format!(" [{}]", label));
    }
    if let Some(summary) = &fragment.summary {
        name.push(' ');
        name.push_str(summary);
    }
    name
}

pub fn fully_qualified_name(
    declaring_type: &str,
    method: &str,
    attribute_index: usize,
    display_name: &str,
) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(display_name);
    format!(
        "{}.{}({},{})",
        declaring_type, method, attribute_index, encoded
    )
}

// ============================================================================
// DISCOVERY WARNINGS
// ============================================================================

/// A non-fatal discovery problem. Discovery reports it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DiscoveryWarning {
    #[error("No files match '{pattern}' under '{}'", root.display())]
    #[diagnostic(code(livedoc::discovery::no_match), severity(Warning))]
    NoMatchingFiles { pattern: String, root: PathBuf },

    #[error("Cannot read '{}': {message}", path.display())]
    #[diagnostic(code(livedoc::discovery::unreadable), severity(Warning))]
    UnreadableFile { path: PathBuf, message: String },

    #[error("Expansion '{expander}' failed for {}#{ordinal}: {message}", path.display())]
    #[diagnostic(code(livedoc::discovery::expansion), severity(Warning))]
    Expansion {
        path: PathBuf,
        ordinal: usize,
        expander: String,
        message: String,
    },

    #[error("Invalid glob '{pattern}': {message}")]
    #[diagnostic(code(livedoc::discovery::glob), severity(Warning))]
    InvalidGlob { pattern: String, message: String },
}

// ============================================================================
// EXPANSION
// ============================================================================

/// Turns one fragment into the cases `method`'s spec at `attribute_index` yields,
/// plus a warning when the expansion function could not run cleanly.
///
/// Without an expansion function that is exactly one case. With one, it is one case
/// per returned label, and only the first may write back into the document. A payload
/// the expansion function cannot bind because it does not parse still yields one
/// unlabelled case, which fails with the parse error when executed.
pub fn expand(
    config: &HarnessConfig,
    method: &RegisteredMethod,
    attribute_index: usize,
    fragment: Arc<Fragment>,
) -> (Vec<TestCase>, Option<DiscoveryWarning>) {
    let spec = &method.specs[attribute_index];
    let timeout_ms = config.timeout_for(spec);
    let case = |label: Option<String>, update_eligible: bool| {
        TestCase::new(
            method,
            attribute_index,
            Arc::clone(&fragment),
            label,
            timeout_ms,
            update_eligible,
        )
    };

    let Some(expander) = &method.expanders[attribute_index] else {
        return (vec![case(None, spec.update_source)], None);
    };
    let failure = |message: String| DiscoveryWarning::Expansion {
        path: fragment.file_path.clone(),
        ordinal: fragment.ordinal,
        expander: spec.expand.clone().unwrap_or_default(),
        message,
    };

    let value = if expander.binds_payload() {
        match parse_payload(&fragment) {
            Ok(value) => value,
            Err(error) => return (vec![case(None, false)], Some(failure(error.to_string()))),
        }
    } else {
        TreeValue::Null
    };
    let binding = Binding {
        data: TestData::from_fragment(&fragment, None, spec.update_source),
        value,
    };
    match expander.expand(&binding) {
        Ok(labels) => {
            let cases = labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    let label = Some(label).filter(|l| !l.is_empty());
                    case(label, spec.update_source && i == 0)
                })
                .collect();
            (cases, None)
        }
        Err(error) => (Vec::new(), Some(failure(error.to_string()))),
    }
}

/// Parses a fragment's payload, naming it after its file and ordinal in diagnostics.
pub fn parse_payload(fragment: &Fragment) -> Result<TreeValue, crate::errors::HarnessError> {
    let name = format!("{}#{}", fragment.file_path.display(), fragment.ordinal);
    tree::parse_named(&name, &fragment.raw_text)
}

// ============================================================================
// GLOB RESOLUTION
// ============================================================================

/// Files under `base` whose '/'-separated relative path matches `pattern`,
/// case-insensitively, sorted. `.git` directories are never entered.
pub fn resolve_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryWarning> {
    let normalized = pattern.replace('\\', "/");
    let matcher = glob::Pattern::new(&normalized).map_err(|e| DiscoveryWarning::InvalidGlob {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut files: Vec<PathBuf> = WalkDir::new(base)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(base)
                .ok()
                .map(relative_text)
                .is_some_and(|relative| matcher.matches_with(&relative, options))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn relative_text(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// DISCOVERY
// ============================================================================

struct Target {
    method: Arc<RegisteredMethod>,
    attribute_index: usize,
}

impl Target {
    fn spec(&self) -> &TestSpec {
        &self.method.specs[self.attribute_index]
    }
}

/// Lazy stream of discovered cases.
///
/// Documents are opened one at a time as the iterator advances; problems are
/// collected on [`Discovery::warnings`] and logged instead of ending the stream.
pub struct Discovery {
    ctx: Arc<RunContext>,
    targets: VecDeque<Target>,
    target: Option<Target>,
    files: VecDeque<PathBuf>,
    fragments: Option<Fragments>,
    pending: VecDeque<TestCase>,
    warnings: Vec<DiscoveryWarning>,
}

impl Discovery {
    /// Discovers every spec of every method in `methods`.
    pub fn new(ctx: Arc<RunContext>, methods: &[Arc<RegisteredMethod>]) -> Self {
        let targets = methods
            .iter()
            .flat_map(|method| {
                (0..method.specs.len()).map(move |attribute_index| Target {
                    method: Arc::clone(method),
                    attribute_index,
                })
            })
            .collect();
        Self::with_targets(ctx, targets)
    }

    /// Discovers a single spec of a single method.
    pub fn for_spec(ctx: Arc<RunContext>, method: Arc<RegisteredMethod>, attribute_index: usize) -> Self {
        assert!(
            attribute_index < method.specs.len(),
            "attribute index {} out of range for '{}' ({} specs)",
            attribute_index,
            method.full_name(),
            method.specs.len()
        );
        let target = Target {
            method,
            attribute_index,
        };
        Self::with_targets(ctx, VecDeque::from([target]))
    }

    fn with_targets(ctx: Arc<RunContext>, targets: VecDeque<Target>) -> Self {
        Self {
            ctx,
            targets,
            target: None,
            files: VecDeque::new(),
            fragments: None,
            pending: VecDeque::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[DiscoveryWarning] {
        &self.warnings
    }

    /// Drains the stream, returning the cases and every warning raised on the way.
    pub fn collect_all(mut self) -> (Vec<TestCase>, Vec<DiscoveryWarning>) {
        let cases: Vec<TestCase> = self.by_ref().collect();
        (cases, self.warnings)
    }

    fn warn(&mut self, warning: DiscoveryWarning) {
        tracing::warn!(target: "livedoc::discovery", %warning, "discovery warning");
        self.warnings.push(warning);
    }

    fn open_target(&mut self, target: Target) {
        let (base, pattern) = self.ctx.glob_base(target.spec());
        match resolve_files(&base, pattern) {
            Ok(files) if files.is_empty() => self.warn(DiscoveryWarning::NoMatchingFiles {
                pattern: target.spec().glob.clone(),
                root: base,
            }),
            Ok(files) => {
                tracing::debug!(
                    target: "livedoc::discovery",
                    method = %target.method.full_name(),
                    files = files.len(),
                    "resolved glob"
                );
                self.files = files.into();
            }
            Err(warning) => self.warn(warning),
        }
        self.target = Some(target);
    }
}

impl Iterator for Discovery {
    type Item = TestCase;

    fn next(&mut self) -> Option<TestCase> {
        loop {
            if let Some(case) = self.pending.pop_front() {
                return Some(case);
            }

            match self.fragments.as_mut().map(|fragments| fragments.next()) {
                Some(Some(Ok(fragment))) => {
                    let Some(target) = &self.target else {
                        self.fragments = None;
                        continue;
                    };
                    let (cases, warning) = expand(
                        self.ctx.config(),
                        &target.method,
                        target.attribute_index,
                        Arc::new(fragment),
                    );
                    self.pending.extend(cases);
                    if let Some(warning) = warning {
                        self.warn(warning);
                    }
                    continue;
                }
                Some(Some(Err(error))) => {
                    self.fragments = None;
                    self.warn(unreadable(error));
                    continue;
                }
                Some(None) => {
                    self.fragments = None;
                    continue;
                }
                None => {}
            }

            if let Some(path) = self.files.pop_front() {
                let opened = self
                    .target
                    .as_ref()
                    .map(|target| fragment::fragments(&path, &target.spec().shape));
                match opened {
                    Some(Ok(fragments)) => self.fragments = Some(fragments),
                    Some(Err(error)) => self.warn(unreadable(error)),
                    None => {}
                }
                continue;
            }

            let target = self.targets.pop_front()?;
            self.open_target(target);
        }
    }
}

fn unreadable(error: crate::errors::HarnessError) -> DiscoveryWarning {
    match error {
        crate::errors::HarnessError::Io { path, source } => DiscoveryWarning::UnreadableFile {
            path,
            message: source.to_string(),
        },
        other => DiscoveryWarning::UnreadableFile {
            path: PathBuf::new(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{Expander, Registry, Verification};

    pub(crate) fn sample_fragment(file: &str, ordinal: usize, summary: Option<&str>) -> Fragment {
        Fragment {
            file_path: PathBuf::from(file),
            start_line: ordinal * 3,
            content_start_line: ordinal * 3 + 1,
            ordinal,
            summary: summary.map(str::to_string),
            fence_tip: None,
            raw_text: "name: world\n".to_string(),
        }
    }

    pub(crate) fn sample_case(file: &str, ordinal: usize, label: Option<&str>) -> TestCase {
        let mut registry = Registry::new();
        registry
            .register(
                "Sample",
                "verify",
                vec![TestSpec::yaml("*.yml")],
                Verification::blocking(|_: ()| ()),
            )
            .unwrap();
        let method = Arc::clone(&registry.methods()[0]);
        TestCase::new(
            &method,
            0,
            Arc::new(sample_fragment(file, ordinal, Some("greet"))),
            label.map(str::to_string),
            1000,
            false,
        )
    }

    #[test]
    fn display_name_pads_ordinal_and_brackets_label() {
        let fragment = sample_fragment("docs/hello.yml", 3, Some("greet"));
        assert_eq!(display_name(&fragment, None), "hello.yml/03: greet");
        assert_eq!(
            display_name(&fragment, Some("en")),
            "hello.yml/03: [en] greet"
        );
        assert_eq!(display_name(&fragment, Some("")), "hello.yml/03: greet");
        let bare = sample_fragment("docs/hello.yml", 12, None);
        assert_eq!(display_name(&bare, None), "hello.yml/12:");
    }

    #[test]
    fn stable_id_round_trips_through_text() {
        let id = StableId::of("T.m(0,aGVsbG8=)");
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(text.parse::<StableId>().unwrap(), id);
        assert!("xyz".parse::<StableId>().is_err());
        assert_ne!(StableId::of("T.m(1,aGVsbG8=)"), id);
    }

    #[test]
    fn identity_depends_on_attribute_index_and_display_name() {
        let a = fully_qualified_name("T", "m", 0, "a.yml/01: greet");
        let b = fully_qualified_name("T", "m", 1, "a.yml/01: greet");
        let c = fully_qualified_name("T", "m", 0, "a.yml/01: hello");
        assert_eq!(a, "T.m(0,YS55bWwvMDE6IGdyZWV0)");
        assert_ne!(StableId::of(&a), StableId::of(&b));
        assert_ne!(StableId::of(&a), StableId::of(&c));
        assert_eq!(StableId::of(&a), StableId::of(&a.clone()));
    }

    #[test]
    fn directives_and_filter_are_case_insensitive() {
        let mut case = sample_case("a.yml", 1, None);
        case.display_name = "a.yml/01: [SKIP] later".into();
        assert!(case.is_skip());
        assert!(!case.is_only());
        case.display_name = "a.yml/01: focus [Only]".into();
        assert!(case.is_only());
        assert!(case.matches_filter("FOCUS"));
        assert!(case.matches_filter("sample.verify"));
        assert!(case.matches_filter("Sample.verify(0,"));
        assert!(case.matches_filter(&case.fully_qualified_name.clone()));
        assert!(!case.matches_filter("other"));
    }

    #[test]
    fn expansion_yields_one_case_per_label_and_only_first_updates() {
        let mut registry = Registry::new();
        registry
            .register_expander(
                "Sample",
                "langs",
                Expander::new(|value: TreeValue| {
                    value
                        .get("langs")
                        .and_then(TreeValue::as_sequence)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default()
                }),
            )
            .unwrap()
            .register(
                "Sample",
                "verify",
                vec![TestSpec::yaml("*.yml").expand("langs").update_source(true)],
                Verification::blocking(|_: ()| ()),
            )
            .unwrap();
        let method = Arc::clone(&registry.methods()[0]);
        let config = HarnessConfig::default();

        let mut fragment = sample_fragment("a.yml", 1, Some("greet"));
        fragment.raw_text = "langs: [en, fr]\n".into();
        let (cases, warning) = expand(&config, &method, 0, Arc::new(fragment.clone()));
        assert!(warning.is_none());
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].display_name, "a.yml/01: [en] greet");
        assert!(cases[0].update_eligible);
        assert!(!cases[1].update_eligible);
        assert!(Arc::ptr_eq(&cases[0].fragment, &cases[1].fragment));

        fragment.raw_text = "langs: []\n".into();
        assert!(expand(&config, &method, 0, Arc::new(fragment.clone()))
            .0
            .is_empty());

        fragment.raw_text = "langs: [unclosed\n".into();
        let (cases, warning) = expand(&config, &method, 0, Arc::new(fragment));
        assert!(matches!(warning, Some(DiscoveryWarning::Expansion { .. })));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].matrix_label, None);
        assert_eq!(cases[0].display_name, "a.yml/01: greet");
        assert!(!cases[0].update_eligible);
    }

    #[test]
    fn case_without_expansion_honors_update_flag() {
        let case = sample_case("a.yml", 1, None);
        assert!(!case.update_eligible);
        assert_eq!(case.method_key(), "Sample.verify");
        let data = case.test_data();
        assert_eq!(data.content, "name: world\n");
        assert_eq!(data.line_number, 4);
        let reference = case.to_ref();
        assert_eq!(reference.stable_id, case.stable_id);
        let placeholder = TestCase::unresolved(&reference);
        assert_eq!(placeholder.stable_id, case.stable_id);
        assert_eq!(placeholder.display_name, case.display_name);
    }

    #[test]
    fn glob_matching_is_case_insensitive_sorted_and_skips_git() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("docs/nested")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("docs/B.YML"), "b: 1\n").unwrap();
        std::fs::write(root.join("docs/a.yml"), "a: 1\n").unwrap();
        std::fs::write(root.join("docs/nested/c.yml"), "c: 1\n").unwrap();
        std::fs::write(root.join("docs/notes.md"), "# notes\n").unwrap();
        std::fs::write(root.join(".git/config.yml"), "x: 1\n").unwrap();

        let flat = resolve_files(root, "docs/*.yml").unwrap();
        assert_eq!(flat, vec![root.join("docs/B.YML"), root.join("docs/a.yml")]);

        let deep = resolve_files(root, "docs/**/*.yml").unwrap();
        assert!(deep.contains(&root.join("docs/nested/c.yml")));
        assert!(!deep.iter().any(|p| p.starts_with(root.join(".git"))));

        assert!(resolve_files(root, "nothing/*.yml").unwrap().is_empty());
        assert!(matches!(
            resolve_files(root, "docs/[").unwrap_err(),
            DiscoveryWarning::InvalidGlob { .. }
        ));
    }
}
