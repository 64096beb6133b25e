//! Exploration queues for the worklist constructions.
//!
//! Arena positions and game nodes are indexed in creation order, so the
//! queue discipline only affects which pending entity is expanded next;
//! both disciplines are deterministic.

use std::collections::VecDeque;

/// A queue of pending entities during a worklist construction.
pub trait ExplorationQueue<I> {
    /// Enqueues a newly created entity.
    fn push(&mut self, item: I);
    /// Removes the next entity to expand.
    fn pop(&mut self) -> Option<I>;
}

/// Explores entities in a breadth-first search, i.e. the entity that was
/// discovered the earliest is expanded next.
pub struct BfsQueue<I> {
    queue: VecDeque<I>,
}

impl<I> BfsQueue<I> {
    pub fn with_capacity(capacity: usize) -> Self {
        BfsQueue {
            queue: VecDeque::with_capacity(capacity),
        }
    }
}

impl<I> ExplorationQueue<I> for BfsQueue<I> {
    fn push(&mut self, item: I) {
        self.queue.push_back(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.queue.pop_front()
    }
}

/// Explores entities in a depth-first search, i.e. the entity that was
/// discovered the latest is expanded next.
pub struct DfsQueue<I> {
    queue: Vec<I>,
}

impl<I> DfsQueue<I> {
    pub fn with_capacity(capacity: usize) -> Self {
        DfsQueue {
            queue: Vec::with_capacity(capacity),
        }
    }
}

impl<I> ExplorationQueue<I> for DfsQueue<I> {
    fn push(&mut self, item: I) {
        self.queue.push(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.queue.pop()
    }
}
