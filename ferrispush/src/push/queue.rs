//! Shared FIFO of pending tasks.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Task;

/// Task queue drained concurrently by the worker pool.
///
/// The task set is closed before workers start: an empty queue ends a
/// worker's loop rather than making it wait.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task.
    pub fn push(&self, task: Task) {
        self.lock().push_back(task);
    }

    /// Take the next task, if any.
    pub fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    /// Number of tasks not yet taken.
    ///
    /// Tasks already taken but still in flight are not counted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if every task has been taken.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        // A panicking holder cannot leave the deque half-modified
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIterator<Task> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            tasks: Mutex::new(iter.into_iter().collect()),
        }
    }
}
