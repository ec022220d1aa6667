/// Precomputed line start offsets for fast byte-offset → line/column conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line. line_starts[0] == 0 always.
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts, len: source.len() }
    }

    /// Convert a byte offset to a 1-based line number.
    pub fn line_of(&self, offset: usize) -> u32 {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(ins) => ins.saturating_sub(1),
        };
        (line + 1) as u32
    }

    /// Convert a byte offset to a (line, column) pair (both 1-based).
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line = self.line_of(offset);
        let col = offset.saturating_sub(self.line_starts[(line - 1) as usize]);
        (line, (col + 1) as u32)
    }

    /// Byte range of a 1-based line, excluding the trailing newline.
    pub fn line_range(&self, line: u32) -> Option<(usize, usize)> {
        if line == 0 {
            return None;
        }
        let idx = (line - 1) as usize;
        let start = *self.line_starts.get(idx)?;
        let end = match self.line_starts.get(idx + 1) {
            Some(next) => next - 1,
            None => self.len,
        };
        Some((start, end))
    }

    /// Number of lines, counting a final line without a trailing newline.
    /// A trailing newline does not open an extra line.
    pub fn line_count(&self) -> u32 {
        let n = self.line_starts.len();
        if self.len == 0 {
            0
        } else if self.line_starts[n - 1] == self.len {
            (n - 1) as u32
        } else {
            n as u32
        }
    }
}
