/// Appended once when the capacity is reached. Later appends are dropped;
/// the notice already records that output was lost from this point on.
pub const TRUNCATION_NOTICE: &str = "\n[output truncated: buffer capacity reached]\n";

/// Smallest capacity the buffer will accept; anything lower could not even
/// hold the truncation notice.
pub const MIN_CAPACITY_BYTES: usize = 256;

/// Append-only text sink with a hard capacity.
///
/// The length never exceeds the capacity, notice included: an append larger
/// than the remaining space is cut at a character boundary and followed by
/// [`TRUNCATION_NOTICE`]. Draining resets the buffer and re-arms the cap so
/// incremental readers keep receiving fresh output.
#[derive(Debug)]
pub struct OutputBuffer {
    data: String,
    capacity: usize,
    capped: bool,
    total_appended: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: String::new(),
            capacity: capacity.max(MIN_CAPACITY_BYTES),
            capped: false,
            total_appended: 0,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.total_appended = self.total_appended.saturating_add(chunk.len() as u64);
        if self.capped || chunk.is_empty() {
            return;
        }

        if self.data.len() + chunk.len() <= self.capacity {
            self.data.push_str(chunk);
            return;
        }

        // Make room for the notice, then keep as much of the chunk as fits.
        let reserved = self.capacity - TRUNCATION_NOTICE.len();
        if self.data.len() > reserved {
            let cut = floor_char_boundary(&self.data, reserved);
            self.data.truncate(cut);
        }
        let keep = floor_char_boundary(chunk, reserved - self.data.len());
        self.data.push_str(&chunk[..keep]);
        self.data.push_str(TRUNCATION_NOTICE);
        self.capped = true;
    }

    /// Atomically hands out everything captured so far and resets the buffer,
    /// so two consecutive drains never return overlapping text.
    pub fn drain(&mut self) -> String {
        self.capped = false;
        std::mem::take(&mut self.data)
    }

    pub fn snapshot(&self) -> String {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }

    /// Bytes the producer actually wrote, including everything truncated away.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
