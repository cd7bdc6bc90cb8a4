//! Bounded JSON batch builder
//!
//! Publish payloads are size-capped JSON objects assembled one
//! `"name":value` entry at a time. The builder enforces two budgets:
//! the whole payload (terminator included) and each entry on its own.
//! An append that would overflow fails without mutating the buffer; the
//! caller bails out and drops the batch rather than truncating it.

use crate::constants::KEYVALUE_MAX;

/// Incrementally built, size-capped JSON object.
#[derive(Debug)]
pub struct PublishBatch {
    buf: String,
    entries: usize,
    capacity: usize,
}

impl PublishBatch {
    /// Start an object bounded to `capacity` bytes, terminator included.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::from("{"),
            entries: 0,
            capacity,
        }
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Append one `"name":value` entry.
    ///
    /// Fails when the entry alone exceeds the per-entry budget or the
    /// payload would no longer fit its capacity. The buffer is left
    /// untouched on failure.
    pub fn append(&mut self, name: &str, value: &str) -> bool {
        // "name" + ':' + value, plus the terminator the entry budget reserves.
        let entry_len = name.len() + 2 + 1 + value.len();
        if entry_len + 1 > KEYVALUE_MAX {
            return false;
        }

        let separator = usize::from(self.entries > 0);
        if self.buf.len() + separator + entry_len + 1 > self.capacity {
            return false;
        }

        if separator == 1 {
            self.buf.push(',');
        }
        self.buf.push('"');
        self.buf.push_str(name);
        self.buf.push_str("\":");
        self.buf.push_str(value);
        self.entries += 1;
        true
    }

    /// Close the object. Returns the payload only if the closing brace
    /// still fits the capacity.
    pub fn finish(mut self) -> Option<String> {
        if self.buf.len() + 2 > self.capacity {
            return None;
        }
        self.buf.push('}');
        Some(self.buf)
    }
}
