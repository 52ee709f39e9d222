//! Source code location types

use serde::{Deserialize, Serialize};

/// Index of a parsed file inside a [`crate::ProgramGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// Byte range inside one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    /// Start byte offset (inclusive)
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// `self` lies within `other` (same file, inclusive bounds)
    pub fn is_within(&self, other: &Span) -> bool {
        self.file == other.file && self.start >= other.start && self.end <= other.end
    }

    /// `self` and `other` share at least one byte
    pub fn overlaps(&self, other: &Span) -> bool {
        self.file == other.file && self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Position in flattened translation order.
///
/// `seq` is the index of the top-level item containing the position, so
/// headers expanded by an `#include` sort between the include and the item
/// that follows it. `offset` orders positions inside the same item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SourcePos {
    pub seq: u32,
    pub offset: u32,
}

impl SourcePos {
    pub fn new(seq: u32, offset: u32) -> Self {
        Self { seq, offset }
    }
}

/// Represents a location in source code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path
    pub file: String,
    /// Start line (1-based)
    pub line: u32,
    /// Start column (0-based)
    pub column: u32,
    /// End line (1-based)
    pub end_line: u32,
    /// End column (0-based)
    pub end_column: u32,
}

impl Location {
    /// Create a new location
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: line,
            end_column: column,
        }
    }

    /// Create a location with range
    pub fn with_range(
        file: impl Into<String>,
        line: u32,
        column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line,
            end_column,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
