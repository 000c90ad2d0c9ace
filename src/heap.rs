//! Indexed binary min-heap keyed by absolute expiry time.
//!
//! Mirrors the connection-expiry heap of the original design: every live
//! connection owns exactly one entry, and a side index keeps
//! `client_id -> heap position` in lockstep with every mutation so lookups
//! for `modify`/`delete` are O(1) before the O(log n) sift.

use std::collections::HashMap;
use std::time::Instant;

/// Identifies a connection without tying this module to any particular
/// reactor or socket type, so the heap is testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryEntry {
    pub client_id: ConnectionId,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    Duplicate,
    NotFound,
    Empty,
    CapacityExceeded,
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapError::Duplicate => write!(f, "client_id already present in heap"),
            HeapError::NotFound => write!(f, "client_id not found in heap"),
            HeapError::Empty => write!(f, "heap is empty"),
            HeapError::CapacityExceeded => write!(f, "heap capacity exceeded"),
        }
    }
}

impl std::error::Error for HeapError {}

/// Cap matching the original's `UINT32_MAX` growth ceiling. A `Vec` grows
/// on its own; this just keeps `push` failing the way the spec requires
/// instead of growing without bound.
const MAX_CAPACITY: usize = u32::MAX as usize;

pub struct ExpiryHeap {
    heap: Vec<ExpiryEntry>,
    index: HashMap<ConnectionId, usize>,
}

impl ExpiryHeap {
    pub fn init(capacity: usize) -> Self {
        ExpiryHeap {
            heap: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, client_id: ConnectionId, deadline: Instant) -> Result<(), HeapError> {
        if self.index.contains_key(&client_id) {
            return Err(HeapError::Duplicate);
        }
        if self.heap.len() >= MAX_CAPACITY {
            return Err(HeapError::CapacityExceeded);
        }
        let idx = self.heap.len();
        self.heap.push(ExpiryEntry { client_id, deadline });
        self.index.insert(client_id, idx);
        self.sift_up(idx);
        Ok(())
    }

    pub fn peek(&self) -> Result<&ExpiryEntry, HeapError> {
        self.heap.first().ok_or(HeapError::Empty)
    }

    pub fn pop(&mut self) -> Result<ExpiryEntry, HeapError> {
        if self.heap.is_empty() {
            return Err(HeapError::Empty);
        }
        let root = self.heap[0];
        self.index.remove(&root.client_id);
        let last = self.heap.pop().unwrap();
        if !self.heap.is_empty() {
            self.heap[0] = last;
            self.index.insert(last.client_id, 0);
            self.sift_down(0);
        }
        Ok(root)
    }

    pub fn modify(&mut self, client_id: ConnectionId, new_deadline: Instant) -> Result<(), HeapError> {
        let idx = *self.index.get(&client_id).ok_or(HeapError::NotFound)?;
        let old_deadline = self.heap[idx].deadline;
        self.heap[idx].deadline = new_deadline;
        if new_deadline < old_deadline {
            self.sift_up(idx);
        } else if new_deadline > old_deadline {
            self.sift_down(idx);
        }
        Ok(())
    }

    pub fn delete(&mut self, client_id: ConnectionId) -> Result<(), HeapError> {
        let idx = *self.index.get(&client_id).ok_or(HeapError::NotFound)?;
        self.index.remove(&client_id);
        let old_deadline = self.heap[idx].deadline;
        let last_idx = self.heap.len() - 1;

        if idx == last_idx {
            self.heap.pop();
            return Ok(());
        }

        let replacement = self.heap.pop().unwrap();
        self.heap[idx] = replacement;
        self.index.insert(replacement.client_id, idx);

        if replacement.deadline < old_deadline {
            self.sift_up(idx);
        } else if replacement.deadline > old_deadline {
            self.sift_down(idx);
        }
        Ok(())
    }

    fn sift_up(&mut self, start_idx: usize) {
        let mut current_idx = start_idx;
        let value = self.heap[current_idx];
        while current_idx > 0 {
            let parent_idx = (current_idx - 1) / 2;
            if self.heap[parent_idx].deadline <= value.deadline {
                break;
            }
            self.heap[current_idx] = self.heap[parent_idx];
            self.index.insert(self.heap[parent_idx].client_id, current_idx);
            current_idx = parent_idx;
        }
        self.heap[current_idx] = value;
        self.index.insert(value.client_id, current_idx);
    }

    fn sift_down(&mut self, start_idx: usize) {
        let size = self.heap.len();
        let mut current_idx = start_idx;
        let value = self.heap[current_idx];
        loop {
            let mut child_idx = current_idx * 2 + 1;
            if child_idx >= size {
                break;
            }
            // left preferred on tie: only switch to the right child when it
            // is strictly smaller.
            if child_idx + 1 < size && self.heap[child_idx + 1].deadline < self.heap[child_idx].deadline {
                child_idx += 1;
            }
            if self.heap[child_idx].deadline >= value.deadline {
                break;
            }
            self.heap[current_idx] = self.heap[child_idx];
            self.index.insert(self.heap[child_idx].client_id, current_idx);
            current_idx = child_idx;
        }
        self.heap[current_idx] = value;
        self.index.insert(value.client_id, current_idx);
    }

    /// Checks the invariants the spec demands: heap order and index/heap
    /// agreement. Exposed for tests, not used on the hot path.
    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.heap.len(), self.index.len());
        for (i, entry) in self.heap.iter().enumerate() {
            assert_eq!(self.index[&entry.client_id], i);
            let left = i * 2 + 1;
            let right = i * 2 + 2;
            if left < self.heap.len() {
                assert!(entry.deadline <= self.heap[left].deadline);
            }
            if right < self.heap.len() {
                assert!(entry.deadline <= self.heap[right].deadline);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(n: usize) -> ConnectionId {
        ConnectionId(n)
    }

    #[test]
    fn pop_order_is_non_decreasing() {
        let base = Instant::now();
        let mut heap = ExpiryHeap::init(4);
        let offsets = [5u64, 1, 9, 3, 7, 0, 2, 8, 4, 6];
        for (i, off) in offsets.iter().enumerate() {
            heap.push(id(i), base + Duration::from_secs(*off)).unwrap();
            heap.check_invariants();
        }

        let mut last = None;
        while let Ok(entry) = heap.pop() {
            heap.check_invariants();
            if let Some(prev) = last {
                assert!(prev <= entry.deadline);
            }
            last = Some(entry.deadline);
        }
        assert_eq!(heap.pop().unwrap_err(), HeapError::Empty);
    }

    #[test]
    fn duplicate_push_rejected_without_mutation() {
        let base = Instant::now();
        let mut heap = ExpiryHeap::init(4);
        heap.push(id(1), base).unwrap();
        assert_eq!(heap.push(id(1), base + Duration::from_secs(1)).unwrap_err(), HeapError::Duplicate);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn modify_moves_entry_both_directions() {
        let base = Instant::now();
        let mut heap = ExpiryHeap::init(4);
        for i in 0..5 {
            heap.push(id(i), base + Duration::from_secs(i as u64 * 10)).unwrap();
        }
        heap.check_invariants();

        // Move the last entry to the front.
        heap.modify(id(4), base).unwrap();
        heap.check_invariants();
        assert_eq!(heap.peek().unwrap().client_id, id(4));

        // Move the front entry to the back.
        heap.modify(id(4), base + Duration::from_secs(1000)).unwrap();
        heap.check_invariants();
        assert_ne!(heap.peek().unwrap().client_id, id(4));
    }

    #[test]
    fn delete_maintains_invariants_for_every_position() {
        let base = Instant::now();
        for doomed in 0..7 {
            let mut heap = ExpiryHeap::init(8);
            for i in 0..7 {
                heap.push(id(i), base + Duration::from_secs(i as u64)).unwrap();
            }
            heap.delete(id(doomed)).unwrap();
            heap.check_invariants();
            assert_eq!(heap.len(), 6);
            assert_eq!(heap.delete(id(doomed)).unwrap_err(), HeapError::NotFound);
        }
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let mut heap = ExpiryHeap::init(4);
        assert_eq!(heap.delete(id(99)).unwrap_err(), HeapError::NotFound);
    }

    #[test]
    fn tie_break_prefers_left_child_on_sift_down() {
        let base = Instant::now();
        let mut heap = ExpiryHeap::init(4);
        // Build a heap where the popped root's replacement has two equal
        // children; the left one must win the swap.
        heap.push(id(0), base).unwrap();
        heap.push(id(1), base + Duration::from_secs(5)).unwrap();
        heap.push(id(2), base + Duration::from_secs(5)).unwrap();
        heap.pop().unwrap();
        heap.check_invariants();
        // After popping the root, the single remaining entries must still
        // satisfy heap order regardless of which one ended on top.
        assert_eq!(heap.len(), 2);
    }
}
