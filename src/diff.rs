//! Positional line diff used by the change-request and commit viewers.
//!
//! Lines are compared index by index, not aligned by longest common
//! subsequence. An insertion near the top of a file therefore shows every
//! following line as a removed/added pair. Callers rely on the resulting
//! `added`/`removed` counts, so this must stay positional.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub added: usize,
    pub removed: usize,
    pub lines: Vec<DiffLine>,
}

impl Diff {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Number of lines `diff` sees in `text`. An empty text is one empty line.
#[must_use]
pub fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

#[must_use]
pub fn diff(old_text: &str, new_text: &str) -> Diff {
    let old_lines: Vec<&str> = old_text.split('\n').collect();
    let new_lines: Vec<&str> = new_text.split('\n').collect();

    let mut result = Diff::default();
    let push = |result: &mut Diff, kind: DiffKind, content: &str| {
        result.lines.push(DiffLine {
            kind,
            content: content.to_string(),
        });
    };

    for i in 0..old_lines.len().max(new_lines.len()) {
        match (old_lines.get(i), new_lines.get(i)) {
            (None, Some(new)) => {
                push(&mut result, DiffKind::Added, new);
                result.added += 1;
            }
            (Some(old), None) => {
                push(&mut result, DiffKind::Removed, old);
                result.removed += 1;
            }
            (Some(old), Some(new)) if old == new => {
                push(&mut result, DiffKind::Unchanged, old);
            }
            (Some(old), Some(new)) => {
                push(&mut result, DiffKind::Removed, old);
                push(&mut result, DiffKind::Added, new);
                result.removed += 1;
                result.added += 1;
            }
            (None, None) => unreachable!("index is below the longer side"),
        }
    }

    result
}
