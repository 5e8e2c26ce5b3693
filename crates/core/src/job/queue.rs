//! FIFO waitlist of pending job ids with removal by id.
//!
//! Nodes live in an arena and link to each other by slot index, so removing
//! an arbitrary id is O(1) through the id → slot index.

use std::collections::HashMap;

use super::types::JobId;

#[derive(Debug)]
struct QueueNode {
    id: JobId,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked queue of job ids.
#[derive(Debug, Default)]
pub struct JobQueue {
    slots: Vec<Option<QueueNode>>,
    free: Vec<usize>,
    index: HashMap<JobId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` at the tail.
    ///
    /// Returns false if the id is already queued.
    pub fn push(&mut self, id: JobId) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }

        let node = QueueNode {
            id: id.clone(),
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(id, slot);
        true
    }

    /// Removes and returns the id at the head.
    pub fn pop(&mut self) -> Option<JobId> {
        let head = self.head?;
        Some(self.unlink(head))
    }

    /// Removes `id` wherever it sits. Returns false if it was not queued.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.index.get(id).copied() {
            Some(slot) => {
                self.unlink(slot);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Queued ids from head to tail.
    pub fn snapshot(&self) -> Vec<JobId> {
        let mut ids = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.node(slot);
            ids.push(node.id.clone());
            cursor = node.next;
        }
        ids
    }

    /// Detaches the node at `slot`, relinks its neighbours and frees the slot.
    fn unlink(&mut self, slot: usize) -> JobId {
        let node = self.slots[slot]
            .take()
            .unwrap_or_else(|| unreachable!("queue slot {slot} is linked but empty"));

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }

        self.index.remove(&node.id);
        self.free.push(slot);
        node.id
    }

    fn node(&self, slot: usize) -> &QueueNode {
        self.slots[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("queue slot {slot} is linked but empty"))
    }

    fn node_mut(&mut self, slot: usize) -> &mut QueueNode {
        self.slots[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("queue slot {slot} is linked but empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(ids: &[&str]) -> JobQueue {
        let mut queue = JobQueue::new();
        for id in ids {
            queue.push(id.to_string());
        }
        queue
    }

    /// Walks the links both ways and checks they agree with `len()`.
    fn assert_consistent(queue: &JobQueue) {
        let forward = queue.snapshot();
        assert_eq!(forward.len(), queue.len());

        let mut backward = Vec::new();
        let mut cursor = queue.tail;
        while let Some(slot) = cursor {
            let node = queue.node(slot);
            backward.push(node.id.clone());
            cursor = node.prev;
            assert!(backward.len() <= queue.len(), "cycle detected");
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.pop().as_deref(), Some("a"));
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert_eq!(queue.pop().as_deref(), Some("c"));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delete_head_tail_and_interior() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e"]);

        assert!(queue.delete("a"));
        assert_consistent(&queue);
        assert!(queue.delete("e"));
        assert_consistent(&queue);
        assert!(queue.delete("c"));
        assert_consistent(&queue);

        assert_eq!(queue.snapshot(), vec!["b", "d"]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert_eq!(queue.pop().as_deref(), Some("d"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(!queue.delete("zzz"));
        assert_eq!(queue.len(), 2);

        assert!(queue.delete("a"));
        assert_eq!(queue.len(), 1);
        assert!(!queue.delete("a"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_deleted_id_never_popped() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.delete("b");
        let mut popped = Vec::new();
        while let Some(id) = queue.pop() {
            popped.push(id);
        }
        assert_eq!(popped, vec!["a", "c"]);
    }

    #[test]
    fn test_delete_only_element() {
        let mut queue = queue_of(&["solo"]);
        assert!(queue.delete("solo"));
        assert!(queue.is_empty());
        assert_eq!(queue.head, None);
        assert_eq!(queue.tail, None);

        queue.push("next".to_string());
        assert_eq!(queue.snapshot(), vec!["next"]);
    }

    #[test]
    fn test_duplicate_push_rejected() {
        let mut queue = queue_of(&["a"]);
        assert!(!queue.push("a".to_string()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_slots_are_reused() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.delete("b");
        queue.pop();
        queue.push("d".to_string());
        queue.push("e".to_string());
        assert_eq!(queue.slots.len(), 3);
        assert_eq!(queue.snapshot(), vec!["c", "d", "e"]);
        assert_consistent(&queue);
    }

    #[test]
    fn test_clear() {
        let mut queue = queue_of(&["a", "b"]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
        assert!(queue.snapshot().is_empty());
        assert!(queue.push("a".to_string()));
    }

    #[test]
    fn test_interleaved_operations_stay_consistent() {
        let mut queue = JobQueue::new();
        let mut expected: Vec<String> = Vec::new();

        for round in 0..50 {
            let id = format!("job-{round}");
            queue.push(id.clone());
            expected.push(id);

            if round % 3 == 0 {
                let victim = expected.remove(expected.len() / 2);
                assert!(queue.delete(&victim));
            }
            if round % 5 == 0 && !expected.is_empty() {
                assert_eq!(queue.pop(), Some(expected.remove(0)));
            }
            assert_consistent(&queue);
            assert_eq!(queue.snapshot(), expected);
        }
    }
}
