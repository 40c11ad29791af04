//! Splitting documents into fragments.
//!
//! Two document shapes are supported:
//!
//! - [`DocumentShape::Separated`]: multi-document YAML. Fragments are split at lines
//!   that are exactly `---`.
//! - [`DocumentShape::Fenced`]: Markdown. Fragments are the payloads of fenced code
//!   blocks (```` ``` ```` or `~~~`) whose info string starts with the configured tip.
//!
//! In both shapes the comment lines (`#`) and blank lines that precede the first
//! payload line are not part of the payload. The first such comment becomes the
//! fragment's summary, and `content_start_line` points past them so that source
//! updates only ever rewrite payload lines. Blank lines after the payload belong to
//! it: a value whose serialization ends in blank lines reads back the same, and a
//! rewrite replaces exactly the lines it wrote before.
//!
//! Fragments are produced lazily, one line of input at a time.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::HarnessError;

/// The separator line between fragments of a separated document.
pub const SEPARATOR: &str = "---";

const SUMMARY_TRIM: &[char] = &['#', ' ', '\t'];

/// One payload block of a document, with exact line provenance.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub file_path: PathBuf,
    /// First line belonging to the fragment (after the separator or opening fence).
    pub start_line: usize,
    /// First payload line; summary and comment lines come before it.
    pub content_start_line: usize,
    /// 1-based position among the non-empty fragments of the file.
    pub ordinal: usize,
    pub summary: Option<String>,
    /// Info word of the fence for Markdown fragments, e.g. `yml` for ```` ```yml ````.
    pub fence_tip: Option<String>,
    /// Payload lines, each terminated by `\n`.
    pub raw_text: String,
}

impl Fragment {
    /// Number of payload lines.
    pub fn line_count(&self) -> usize {
        self.raw_text.matches('\n').count()
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.display().to_string())
    }
}

/// How a document is cut into fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentShape {
    Separated,
    Fenced { tip: Option<String> },
}

impl Default for DocumentShape {
    fn default() -> Self {
        DocumentShape::Separated
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Opens `path` and returns a lazy iterator over its fragments.
pub fn fragments(path: impl AsRef<Path>, shape: &DocumentShape) -> Result<Fragments, HarnessError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| HarnessError::io(path, e))?;
    Ok(Fragments::new(
        path.to_path_buf(),
        shape,
        Box::new(BufReader::new(file).lines()),
    ))
}

/// Splits in-memory text as if it had been read from `path`.
pub fn fragments_from_str(path: impl AsRef<Path>, text: &str, shape: &DocumentShape) -> Fragments {
    let lines: Vec<io::Result<String>> = text.lines().map(|line| Ok(line.to_string())).collect();
    Fragments::new(path.as_ref().to_path_buf(), shape, Box::new(lines.into_iter()))
}

type LineSource = Box<dyn Iterator<Item = io::Result<String>> + Send>;

/// Lazy fragment iterator returned by [`fragments`].
pub struct Fragments {
    path: PathBuf,
    lines: LineSource,
    splitter: Splitter,
    done: bool,
}

impl Fragments {
    fn new(path: PathBuf, shape: &DocumentShape, lines: LineSource) -> Self {
        Self {
            splitter: Splitter::new(path.clone(), shape),
            path,
            lines,
            done: false,
        }
    }
}

impl Iterator for Fragments {
    type Item = Result<Fragment, HarnessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(fragment) = self.splitter.push(&line) {
                        return Some(Ok(fragment));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(HarnessError::io(&self.path, e)));
                }
                None => {
                    self.done = true;
                    return self.splitter.finish().map(Ok);
                }
            }
        }
    }
}

// ============================================================================
// SPLITTING STATE MACHINE
// ============================================================================

/// Accumulates the lines of one candidate fragment.
#[derive(Debug)]
struct Block {
    start_line: usize,
    summary: Option<String>,
    content_start_line: Option<usize>,
    payload: Vec<String>,
    has_text: bool,
}

impl Block {
    fn new(start_line: usize) -> Self {
        Self {
            start_line,
            summary: None,
            content_start_line: None,
            payload: Vec::new(),
            has_text: false,
        }
    }

    fn push(&mut self, line_number: usize, line: &str) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.has_text = true;
        }
        if self.content_start_line.is_none() {
            if trimmed.is_empty() {
                return;
            }
            if trimmed.starts_with('#') {
                if self.summary.is_none() {
                    self.summary = Some(trimmed.trim_matches(SUMMARY_TRIM).to_string());
                }
                return;
            }
            self.content_start_line = Some(line_number);
        }
        self.payload.push(line.to_string());
    }

    /// Closes the block. `next_line` is the first line after it, which is where the
    /// payload of a comment-only block would be inserted.
    fn close(
        self,
        path: &Path,
        ordinal: usize,
        next_line: usize,
        fence_tip: Option<String>,
        fallback_summary: Option<&str>,
    ) -> Fragment {
        let mut raw_text = String::new();
        for line in &self.payload {
            raw_text.push_str(line);
            raw_text.push('\n');
        }
        Fragment {
            file_path: path.to_path_buf(),
            start_line: self.start_line,
            content_start_line: self.content_start_line.unwrap_or(next_line),
            ordinal,
            summary: self
                .summary
                .or_else(|| fallback_summary.map(str::to_string))
                .filter(|s| !s.is_empty()),
            fence_tip,
            raw_text,
        }
    }
}

#[derive(Debug)]
struct OpenFence {
    marker: char,
    len: usize,
    tip: Option<String>,
    matched: bool,
    block: Block,
}

#[derive(Debug)]
enum Mode {
    Separated { block: Block },
    Fenced {
        tip: Option<String>,
        heading: Option<String>,
        open: Option<OpenFence>,
    },
}

struct Splitter {
    path: PathBuf,
    line_number: usize,
    ordinal: usize,
    mode: Mode,
}

impl Splitter {
    fn new(path: PathBuf, shape: &DocumentShape) -> Self {
        let mode = match shape {
            DocumentShape::Separated => Mode::Separated {
                block: Block::new(1),
            },
            DocumentShape::Fenced { tip } => Mode::Fenced {
                tip: tip.clone(),
                heading: None,
                open: None,
            },
        };
        Self {
            path,
            line_number: 0,
            ordinal: 0,
            mode,
        }
    }

    fn push(&mut self, line: &str) -> Option<Fragment> {
        self.line_number += 1;
        let line_number = self.line_number;
        match &mut self.mode {
            Mode::Separated { block } => {
                if line != SEPARATOR {
                    block.push(line_number, line);
                    return None;
                }
                let finished = std::mem::replace(block, Block::new(line_number + 1));
                self.emit(finished, line_number, None, None)
            }
            Mode::Fenced { tip, heading, open } => {
                if open.is_none() {
                    if let Some((marker, len, info)) = parse_fence_open(line) {
                        let matched = tip.as_deref().map_or(true, |wanted| {
                            info.as_deref()
                                .is_some_and(|word| word.eq_ignore_ascii_case(wanted))
                        });
                        *open = Some(OpenFence {
                            marker,
                            len,
                            tip: info,
                            matched,
                            block: Block::new(line_number + 1),
                        });
                    } else if let Some(title) = parse_heading(line) {
                        *heading = Some(title);
                    }
                    return None;
                }
                let fence = open.as_mut()?;
                if !is_fence_close(line, fence.marker, fence.len) {
                    fence.block.push(line_number, line);
                    return None;
                }
                let fence = open.take()?;
                let fallback = heading.clone();
                if !fence.matched {
                    return None;
                }
                self.emit(fence.block, line_number, fence.tip, fallback)
            }
        }
    }

    fn finish(&mut self) -> Option<Fragment> {
        let next_line = self.line_number + 1;
        match &mut self.mode {
            Mode::Separated { block } => {
                let finished = std::mem::replace(block, Block::new(next_line));
                self.emit(finished, next_line, None, None)
            }
            // An unterminated fence runs to the end of the document.
            Mode::Fenced { heading, open, .. } => {
                let fence = open.take()?;
                let fallback = heading.clone();
                if !fence.matched {
                    return None;
                }
                self.emit(fence.block, next_line, fence.tip, fallback)
            }
        }
    }

    fn emit(
        &mut self,
        block: Block,
        next_line: usize,
        fence_tip: Option<String>,
        fallback_summary: Option<String>,
    ) -> Option<Fragment> {
        if !block.has_text {
            return None;
        }
        self.ordinal += 1;
        Some(block.close(
            &self.path,
            self.ordinal,
            next_line,
            fence_tip,
            fallback_summary.as_deref(),
        ))
    }
}

/// Recognizes an opening fence and returns (marker, length, info word).
fn parse_fence_open(line: &str) -> Option<(char, usize, Option<String>)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    let word = info
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .filter(|w| !w.is_empty())
        .map(str::to_string);
    Some((marker, len, word))
}

fn is_fence_close(line: &str, marker: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= len && trimmed.chars().all(|c| c == marker)
}

fn parse_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
        return None;
    }
    Some(trimmed.trim_matches(SUMMARY_TRIM).to_string())
}
