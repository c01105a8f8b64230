//! Min-heap priority queue keyed by `(priority_score, insertion_sequence)`.
//!
//! Insertion sequence is a monotonically increasing counter, giving strict
//! FIFO order among entries of equal priority. Thread-safe for concurrent
//! producers and a single consumer (or a small pool under external
//! serialization) via a `parking_lot::Mutex` around a `BinaryHeap`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;

use crate::task::QueueEntry;

#[derive(Debug, Clone)]
struct HeapItem {
    priority_score: f64,
    sequence: u64,
    entry: QueueEntry,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority_score == other.priority_score && self.sequence == other.sequence
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    /// Reversed so `BinaryHeap` (a max-heap) pops the *lowest* score first,
    /// with the lowest insertion sequence breaking ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority_score
            .total_cmp(&self.priority_score)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A thread-safe min-heap of [`QueueEntry`] ordered by `priority_score`,
/// FIFO among ties.
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<HeapItem>>,
    next_sequence: AtomicU64,
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Insert a single entry.
    pub fn insert(&self, entry: QueueEntry) {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let priority_score = entry.priority_score;
        self.heap.lock().push(HeapItem {
            priority_score,
            sequence,
            entry,
        });
    }

    /// Insert many entries at once, preserving their relative submission
    /// order for the FIFO tiebreak.
    pub fn bulk_insert(&self, entries: impl IntoIterator<Item = QueueEntry>) {
        let mut heap = self.heap.lock();
        for entry in entries {
            let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
            let priority_score = entry.priority_score;
            heap.push(HeapItem {
                priority_score,
                sequence,
                entry,
            });
        }
    }

    /// Pop the lowest-scoring entry, if any.
    #[must_use]
    pub fn pop(&self) -> Option<QueueEntry> {
        self.heap.lock().pop().map(|item| item.entry)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Remove and return every entry currently queued, in original insertion
    /// order. `BinaryHeap::drain` itself makes no ordering guarantee; this
    /// re-sorts by insertion sequence so the fairness sweep's subsequent
    /// stable sort-by-score preserves FIFO order among entries that end up
    /// with equal scores.
    #[must_use]
    pub fn drain_all(&self) -> Vec<QueueEntry> {
        let mut heap = self.heap.lock();
        let mut drained: Vec<HeapItem> = heap.drain().collect();
        drained.sort_by_key(|item| item.sequence);
        drained.into_iter().map(|item| item.entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use uuid::Uuid;

    fn entry(priority: f64) -> QueueEntry {
        let mut e = QueueEntry::new("https://example.com".to_string(), Uuid::new_v4(), Instant::now());
        e.priority_score = priority;
        e
    }

    #[test]
    fn pops_lowest_score_first() {
        let q = PriorityQueue::new();
        q.insert(entry(3.0));
        q.insert(entry(1.0));
        q.insert(entry(2.0));

        assert_eq!(q.pop().expect("non-empty").priority_score, 1.0);
        assert_eq!(q.pop().expect("non-empty").priority_score, 2.0);
        assert_eq!(q.pop().expect("non-empty").priority_score, 3.0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn ties_break_fifo() {
        let q = PriorityQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let mut e1 = entry(1.0);
        e1.task_id = first;
        let mut e2 = entry(1.0);
        e2.task_id = second;

        q.insert(e1);
        q.insert(e2);

        assert_eq!(q.pop().expect("non-empty").task_id, first);
        assert_eq!(q.pop().expect("non-empty").task_id, second);
    }

    #[test]
    fn drain_all_empties_queue() {
        let q = PriorityQueue::new();
        q.insert(entry(1.0));
        q.insert(entry(2.0));
        let drained = q.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn drain_all_preserves_insertion_order_among_ties() {
        let q = PriorityQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        let mut e1 = entry(5.0);
        e1.task_id = first;
        let mut e2 = entry(5.0);
        e2.task_id = second;
        let mut e3 = entry(5.0);
        e3.task_id = third;

        q.insert(e1);
        q.insert(e2);
        q.insert(e3);

        let drained = q.drain_all();
        let ids: Vec<Uuid> = drained.iter().map(|e| e.task_id).collect();
        assert_eq!(ids, vec![first, second, third]);
    }
}
