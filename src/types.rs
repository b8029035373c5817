use std::fmt;

/// Genomic strand/orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Parse the GTF strand column. `?` is read as unknown, like `.`.
    pub fn from_symbol(s: &str) -> Option<Strand> {
        match s {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." | "?" => Some(Strand::Unknown),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Unknown => ".",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous genomic interval.
/// Coordinates are 0-based, half-open: [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefBlock {
    pub start: u32,
    pub end: u32,
}

impl RefBlock {
    /// Create a new block. Panics if start >= end.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start < end, "RefBlock requires start < end");
        Self { start, end }
    }

    #[inline]
    pub fn overlaps(self, other: RefBlock) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The uncovered interval between this block and the next one, `[self.end, next.start)`.
    ///
    /// Returns `None` when the blocks overlap or touch, since the gap would be empty.
    #[inline]
    pub fn gap_to(self, next: RefBlock) -> Option<RefBlock> {
        if self.end < next.start {
            Some(RefBlock {
                start: self.end,
                end: next.start,
            })
        } else {
            None
        }
    }
}
