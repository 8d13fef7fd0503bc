use std::collections::{HashSet, VecDeque};

use crate::identity::Identity;

/// Deferred work, run when the host calls [`Store::flush`](crate::Store::flush).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Task {
    /// Tell record arrays that the record changed.
    UpdateRecordArrays(Identity),
    /// Deliver the record's deferred lifecycle triggers.
    FlushTriggers(Identity),
}

/// Single-shot task queue standing in for the host's run loop.
///
/// Scheduling a task that is already queued is a no-op, so any number of
/// calls within one batch produce one execution. The queue only drains when
/// the host flushes it.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<Task>,
    queued: HashSet<Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` unless an identical task is already pending.
    /// Returns whether the task was queued.
    pub fn schedule_once(&mut self, task: Task) -> bool {
        if !self.queued.insert(task.clone()) {
            return false;
        }
        log::trace!("scheduled {:?}", task);
        self.queue.push_back(task);
        true
    }

    /// Takes the next pending task.
    pub fn pop(&mut self) -> Option<Task> {
        let task = self.queue.pop_front()?;
        self.queued.remove(&task);
        Some(task)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
