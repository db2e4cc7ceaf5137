use std::collections::VecDeque;

/// Fixed-size history of committed snapshots, newest first.
#[derive(Debug, Clone)]
pub struct RetentionRing {
    slots: VecDeque<Vec<u8>>,
}

impl RetentionRing {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RetentionRing {
            slots: std::iter::repeat_with(Vec::new).take(capacity).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pushes `snapshot` in as the newest slot and drops the oldest one.
    pub fn commit(&mut self, snapshot: Vec<u8>) {
        self.slots.pop_back();
        self.slots.push_front(snapshot);
    }

    pub fn newest(&self) -> &[u8] {
        self.slots.front().map(Vec::as_slice).unwrap_or_default()
    }

    /// Every slot concatenated, newest first.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.slots.iter().map(Vec::len).sum());
        for slot in &self.slots {
            out.extend_from_slice(slot);
        }
        out
    }
}
