//! Edit operations and results

use crate::document::SectionId;
use smallvec::SmallVec;
use std::ops::Range;

/// Byte offset within one section's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SectionOffset(pub usize);

/// An atomic edit operation on a section's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Insert text at a position
    Insert {
        position: SectionOffset,
        text: String,
    },
    /// Delete text in a range
    Delete {
        start: SectionOffset,
        end: SectionOffset,
    },
    /// A composite transaction of multiple operations, applied in order
    Transaction {
        ops: Vec<EditOp>,
    },
}

impl EditOp {
    /// Create an insert operation
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::Insert {
            position: SectionOffset(position),
            text: text.into(),
        }
    }

    /// Create a delete operation
    pub fn delete(start: usize, end: usize) -> Self {
        Self::Delete {
            start: SectionOffset(start),
            end: SectionOffset(end),
        }
    }

    /// Replace a range with new text
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self::Transaction {
            ops: vec![Self::delete(range.start, range.end), Self::insert(range.start, text)],
        }
    }

    /// Create a transaction
    pub fn transaction(ops: Vec<EditOp>) -> Self {
        Self::Transaction { ops }
    }
}

/// Result of applying an edit operation
#[derive(Debug, Clone)]
pub struct EditResult {
    /// Section that was modified
    pub section: SectionId,
    /// New document version after this edit
    pub version: u64,
    /// Post-edit byte ranges touched by each primitive operation
    pub touched: SmallVec<[Range<usize>; 2]>,
    /// Section length after the edit
    pub new_len: usize,
}

impl EditResult {
    /// Check if any text changed
    pub fn has_changes(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Smallest range covering every touched range
    pub fn span(&self) -> Option<Range<usize>> {
        let start = self.touched.iter().map(|r| r.start).min()?;
        let end = self.touched.iter().map(|r| r.end).max()?;
        Some(start..end)
    }
}
