use serde::{Deserialize, Serialize};

/// A byte range in a template source, plus the 1-based line/column of its
/// first byte.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        if other.end <= self.start {
            return Span {
                start: other.start,
                end: self.end.max(other.end),
                line: other.line,
                column: other.column,
            };
        }
        Span {
            start: self.start,
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }
}

pub type Spanned<T> = (T, Span);
