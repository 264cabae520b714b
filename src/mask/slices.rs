use std::fmt;
use std::ops::Range;

/// One contiguous run of `true` records, the half-open interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Part {
    pub start: usize,
    pub stop: usize,
}

impl Part {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Number of records covered.
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

impl From<Part> for Range<usize> {
    fn from(part: Part) -> Self {
        part.range()
    }
}

/// Return the runs of `true` in `mask`, in ascending order.
///
/// A run still open at the end of the input closes at `mask.len()`.
pub fn slices(mask: &[bool]) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut open: Option<usize> = None;

    for (i, &b) in mask.iter().enumerate() {
        match (b, open) {
            (true, None) => open = Some(i),
            (false, Some(start)) => {
                parts.push(Part::new(start, i));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        parts.push(Part::new(start, mask.len()));
    }
    parts
}
