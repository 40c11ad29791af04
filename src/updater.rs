//! Writing returned values back into their documents.
//!
//! After a run, every update-eligible case that passed with a non-empty value yields a
//! [`PendingSourceEdit`] replacing its fragment's payload lines with the serialized
//! value. Edits are grouped per file and applied in one pass; lines outside the edited
//! ranges, including the summary comments above each payload, pass through untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::errors::HarnessError;
use crate::report::{Status, TestOutcome};
use crate::tree;

/// Replacement of `line_count` lines starting at 0-based `start_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSourceEdit {
    pub file_path: PathBuf,
    pub start_line: usize,
    pub line_count: usize,
    pub new_lines: Vec<String>,
}

/// The edit an outcome asks for, if any.
pub fn edit_for(outcome: &TestOutcome) -> Result<Option<PendingSourceEdit>, HarnessError> {
    let case = &outcome.test_case;
    if !case.update_eligible || outcome.status != Status::Passed {
        return Ok(None);
    }
    let Some(value) = outcome.returned_value.as_ref().filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let text = tree::serialize(value)?;
    Ok(Some(PendingSourceEdit {
        file_path: case.fragment.file_path.clone(),
        start_line: case.fragment.content_start_line.saturating_sub(1),
        line_count: case.fragment.line_count(),
        new_lines: text.lines().map(str::to_string).collect(),
    }))
}

/// Edits for every outcome that asks for one.
pub fn collect(outcomes: &[TestOutcome]) -> Result<Vec<PendingSourceEdit>, HarnessError> {
    let mut edits = Vec::new();
    for outcome in outcomes {
        if let Some(edit) = edit_for(outcome)? {
            edits.push(edit);
        }
    }
    Ok(edits)
}

/// Applies `edits`, all for one file and ascending by `start_line`, to its lines.
///
/// # Panics
///
/// When two edits overlap. Only the first variant of an expanded fragment may
/// write back, so overlapping edits mean a broken caller.
pub fn splice(lines: &[String], edits: &[PendingSourceEdit]) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut cursor = 0;
    for edit in edits {
        assert!(
            edit.start_line >= cursor,
            "overlapping source edits for '{}': edit at line {} starts inside the previous edit (ends at {})",
            edit.file_path.display(),
            edit.start_line,
            cursor
        );
        let start = edit.start_line.min(lines.len());
        out.extend_from_slice(&lines[cursor..start]);
        out.extend(edit.new_lines.iter().cloned());
        cursor = (start + edit.line_count).min(lines.len()).max(start);
    }
    out.extend_from_slice(&lines[cursor..]);
    out
}

/// Groups edits per file, applies them, and rewrites each changed file whole.
///
/// Line endings (`\n` or `\r\n`) and the presence of a final newline are kept as the
/// file had them. Returns the files actually rewritten.
pub fn apply(edits: Vec<PendingSourceEdit>) -> Result<Vec<PathBuf>, HarnessError> {
    let mut by_file: BTreeMap<PathBuf, Vec<PendingSourceEdit>> = BTreeMap::new();
    for edit in edits {
        by_file.entry(edit.file_path.clone()).or_default().push(edit);
    }

    let mut rewritten = Vec::new();
    for (path, mut edits) in by_file {
        edits.sort_by_key(|edit| edit.start_line);
        let text = fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let lines: Vec<String> = text.lines().map(str::to_string).collect();

        let mut updated = splice(&lines, &edits).join(newline);
        if text.ends_with('\n') {
            updated.push_str(newline);
        }
        if updated == text {
            tracing::debug!(target: "livedoc::updater", path = %path.display(), "document already up to date");
            continue;
        }

        fs::write(&path, updated).map_err(|e| HarnessError::io(&path, e))?;
        tracing::info!(
            target: "livedoc::updater",
            path = %path.display(),
            edits = edits.len(),
            "rewrote document"
        );
        rewritten.push(path);
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_case;
    use crate::tree::TreeValue;
    use std::sync::Arc;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn edit(start_line: usize, line_count: usize, new_lines: &[&str]) -> PendingSourceEdit {
        PendingSourceEdit {
            file_path: PathBuf::from("doc.yml"),
            start_line,
            line_count,
            new_lines: new_lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn splice_replaces_ranges_and_keeps_the_rest() {
        let original = lines("# one\na: 1\n---\n# two\nb: 2\nc: 3\n");
        let spliced = splice(
            &original,
            &[edit(1, 1, &["a: 10"]), edit(4, 2, &["b: 20"])],
        );
        assert_eq!(spliced, lines("# one\na: 10\n---\n# two\nb: 20\n"));
    }

    #[test]
    fn zero_length_edit_inserts() {
        let original = lines("# note\n---\nx: 1\n");
        let spliced = splice(&original, &[edit(1, 0, &["value: 1"])]);
        assert_eq!(spliced, lines("# note\nvalue: 1\n---\nx: 1\n"));
        let at_end = splice(&original, &[edit(3, 0, &["tail: 1"])]);
        assert_eq!(at_end.last().map(String::as_str), Some("tail: 1"));
    }

    #[test]
    #[should_panic(expected = "overlapping source edits")]
    fn overlapping_edits_panic() {
        let original = lines("a\nb\nc\nd\n");
        splice(&original, &[edit(0, 3, &["x"]), edit(2, 1, &["y"])]);
    }

    #[test]
    fn only_eligible_passed_non_empty_outcomes_produce_edits() {
        let mut case = sample_case("doc.yml", 1, None);
        case.update_eligible = true;
        let passed = TestOutcome::passed(case.clone(), Some(TreeValue::from("Hello world")));
        let empty = TestOutcome::passed(case.clone(), Some(TreeValue::String(String::new())));
        let failed = TestOutcome::failed(case.clone(), "nope");
        let mut ineligible_case = case.clone();
        ineligible_case.update_eligible = false;
        let ineligible = TestOutcome::passed(ineligible_case, Some(TreeValue::from(1)));

        let edits = collect(&[passed, empty, failed, ineligible]).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].start_line, case.fragment.content_start_line - 1);
        assert_eq!(edits[0].line_count, 1);
        assert_eq!(edits[0].new_lines, vec!["Hello world".to_string()]);
    }

    #[test]
    fn apply_preserves_crlf_and_missing_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yml");
        std::fs::write(&path, "# greet\r\nname: world").unwrap();

        let mut case = sample_case("doc.yml", 1, None);
        let mut fragment = (*case.fragment).clone();
        fragment.file_path = path.clone();
        fragment.content_start_line = 2;
        fragment.raw_text = "name: world\n".into();
        case.fragment = Arc::new(fragment);
        case.update_eligible = true;

        let outcome = TestOutcome::passed(case, Some(TreeValue::from("Hello world")));
        let written = apply(collect(&[outcome.clone()]).unwrap()).unwrap();
        assert_eq!(written, vec![path.clone()]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# greet\r\nHello world"
        );
    }

    #[test]
    fn unchanged_documents_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yml");
        std::fs::write(&path, "a: 1\n").unwrap();
        let mut unchanged = edit(0, 1, &["a: 1"]);
        unchanged.file_path = path.clone();
        assert!(apply(vec![unchanged]).unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: 1\n");
    }
}
