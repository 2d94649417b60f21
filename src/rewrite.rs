//! Position-addressed rewrite buffer.
//!
//! All processor and composer transformations are expressed as edits against
//! the original byte positions of a source slice. Edits are collected in any
//! order and applied in descending start position, so earlier positions stay
//! valid while the buffer is mutated.

use crate::span::Span;

/// A single pending edit against original text positions.
#[derive(Debug, Clone)]
enum Edit {
    /// Replace `[start, end)` with the text.
    Replace { span: Span, text: String },
    /// Insert text at a position (before any text currently at it).
    Insert { pos: usize, text: String },
}

impl Edit {
    fn start(&self) -> usize {
        match self {
            Edit::Replace { span, .. } => span.start,
            Edit::Insert { pos, .. } => *pos,
        }
    }
}

/// Collects edits against an original text and applies them in one pass.
#[derive(Debug, Default)]
pub struct Rewriter {
    edits: Vec<Edit>,
}

impl Rewriter {
    pub fn new() -> Self {
        Rewriter::default()
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::Replace {
            span,
            text: text.into(),
        });
    }

    pub fn delete(&mut self, span: Span) {
        self.edits.push(Edit::Replace {
            span,
            text: String::new(),
        });
    }

    pub fn insert(&mut self, pos: usize, text: impl Into<String>) {
        self.edits.push(Edit::Insert {
            pos,
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all edits to `source` and return the rewritten text.
    ///
    /// Edits are sorted by descending start position; an insert at the start
    /// of a replaced range lands before the replacement text. Overlapping
    /// replacements are a caller bug and resolve last-writer-wins on the
    /// overlap.
    pub fn apply(mut self, source: &str) -> String {
        // Stable sort keeps the relative order of same-position inserts.
        self.edits.sort_by_key(|e| std::cmp::Reverse(e.start()));

        let mut out = source.to_string();
        for edit in self.edits {
            match edit {
                Edit::Replace { span, text } => {
                    let end = span.end.min(out.len());
                    let start = span.start.min(end);
                    out.replace_range(start..end, &text);
                }
                Edit::Insert { pos, text } => {
                    let pos = pos.min(out.len());
                    out.insert_str(pos, &text);
                }
            }
        }
        out
    }
}
