use std::collections::HashMap;

use crate::core::TabId;

/// Number of bytes kept after a trim: 80% of the cap.
pub fn trimmed_size(max_bytes: usize) -> usize {
    max_bytes / 5 * 4 + (max_bytes % 5) * 4 / 5
}

/// Transcript text for one tab, bounded at `max_bytes`.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    max_bytes: usize,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            text: String::new(),
            max_bytes,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.max_bytes {
            self.trim();
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    fn trim(&mut self) {
        let keep = trimmed_size(self.max_bytes);
        let mut start = self.text.len().saturating_sub(keep);
        // Never split a UTF-8 sequence; rounding up keeps us under the cap.
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        self.text.drain(..start);
    }
}

/// Per-tab transcript buffers sharing one cap.
#[derive(Debug)]
pub struct OutputBuffers {
    buffers: HashMap<TabId, OutputBuffer>,
    max_bytes: usize,
}

impl OutputBuffers {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_bytes,
        }
    }

    /// Starts an empty buffer for `tab_id` if it has none.
    pub fn open(&mut self, tab_id: TabId) {
        let max_bytes = self.max_bytes;
        self.buffers
            .entry(tab_id)
            .or_insert_with(|| OutputBuffer::new(max_bytes));
    }

    /// Appends to an open buffer. Returns `false` and drops the chunk if the
    /// tab has none.
    pub fn append(&mut self, tab_id: TabId, chunk: &str) -> bool {
        match self.buffers.get_mut(&tab_id) {
            Some(buffer) => {
                buffer.append(chunk);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, tab_id: TabId) -> Option<&str> {
        self.buffers.get(&tab_id).map(OutputBuffer::as_str)
    }

    pub fn remove(&mut self, tab_id: TabId) -> Option<OutputBuffer> {
        self.buffers.remove(&tab_id)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn trimmed_size(&self) -> usize {
        trimmed_size(self.max_bytes)
    }
}
