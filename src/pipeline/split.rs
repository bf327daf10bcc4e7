//! Deterministic train/validation split over an enumerated stream.

/// Which side of the nth-select partition to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Keep items whose index matches the modulo rule (validation).
    AcceptNth,
    /// Keep items whose index does not match (training).
    RejectNth,
}

/// Iterator adapter that filters by stream position.
///
/// Item `i` matches when `(i - offset) % nth == 0`. Two adapters with the
/// same `nth`/`offset` and opposite modes partition the upstream sequence
/// exactly: every item appears in one side and never both. The index keeps
/// counting across indefinite restarts of the upstream, so a cycling
/// enumeration keeps the same per-file assignment on every pass as long as
/// the enumeration length is fixed.
pub struct NthSelect<I> {
    upstream: I,
    mode: SplitMode,
    nth: usize,
    offset: usize,
    index: usize,
}

impl<I> NthSelect<I> {
    pub fn new(upstream: I, mode: SplitMode, nth: usize, offset: usize) -> Self {
        debug_assert!(nth >= 2, "nth-select needs a cycle of at least 2");
        // Clamp so a zero cycle cannot divide-by-zero in release builds.
        let nth = nth.max(1);
        NthSelect {
            upstream,
            mode,
            nth,
            offset: offset % nth,
            index: 0,
        }
    }
}

impl<I: Iterator> Iterator for NthSelect<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        loop {
            let item = self.upstream.next()?;
            // (index - offset) % nth == 0, computed without underflow.
            let matches = (self.index + self.nth - self.offset) % self.nth == 0;
            self.index = self.index.wrapping_add(1);
            let keep = match self.mode {
                SplitMode::AcceptNth => matches,
                SplitMode::RejectNth => !matches,
            };
            if keep {
                return Some(item);
            }
        }
    }
}
