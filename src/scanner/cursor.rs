/// Inclusive block window still to be scanned. `from_block` only ever moves
/// forward; `to_block` only ever grows as the chain head advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    from_block: u64,
    to_block: u64,
}

impl ScanCursor {
    pub const fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
        }
    }

    pub const fn from_block(&self) -> u64 {
        self.from_block
    }

    pub const fn to_block(&self) -> u64 {
        self.to_block
    }

    pub const fn is_exhausted(&self) -> bool {
        self.from_block > self.to_block
    }

    /// Next `[start, end]` window of at most `size` blocks, or `None` once
    /// the cursor has passed `to_block`.
    pub fn next_chunk(&self, size: u64) -> Option<(u64, u64)> {
        if self.is_exhausted() {
            return None;
        }

        let end = self
            .from_block
            .saturating_add(size.max(1) - 1)
            .min(self.to_block);

        Some((self.from_block, end))
    }

    /// Moves past a processed window ending at `end`. Never rewinds.
    pub fn advance_past(&mut self, end: u64) {
        self.from_block = self.from_block.max(end.saturating_add(1));
    }

    /// Raises the upper bound to a newer chain head. Never lowers it.
    pub fn extend_to(&mut self, head: u64) {
        self.to_block = self.to_block.max(head);
    }
}

/// Splits `[start, end]` into consecutive windows of at most `size` blocks.
pub fn chunk_ranges(start: u64, end: u64, size: u64) -> Vec<(u64, u64)> {
    let mut cursor = ScanCursor::new(start, end);
    let mut ranges = Vec::new();

    while let Some((chunk_start, chunk_end)) = cursor.next_chunk(size) {
        ranges.push((chunk_start, chunk_end));
        if chunk_end == u64::MAX {
            break;
        }
        cursor.advance_past(chunk_end);
    }

    ranges
}
