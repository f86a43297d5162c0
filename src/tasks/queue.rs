//! Task Queues
//!
//! Lock-guarded collections shared between producers, the worker thread
//! and the consumer thread. Every lock is held for one insert, removal or
//! snapshot and never across a call into task code.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::types::{AsyncTask, TaskId};

/// FIFO queue behind a mutex
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Put an item back at the head, ahead of everything else
    pub fn push_front(&self, item: T) {
        self.items.lock().push_front(item);
    }

    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Take every item, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holder for one parallel task. `None` once the task has been handed on.
type TaskSlot = Arc<Mutex<Option<Box<dyn AsyncTask>>>>;

#[derive(Clone)]
struct ParallelEntry {
    id: TaskId,
    slot: TaskSlot,
}

/// Set of tasks ticked side by side.
///
/// Lock order is slot then set; `remove` never holds the set lock while
/// waiting on a slot.
pub struct ParallelTaskSet {
    entries: Mutex<Vec<ParallelEntry>>,
}

impl ParallelTaskSet {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, id: TaskId, task: Box<dyn AsyncTask>) {
        let entry = ParallelEntry {
            id,
            slot: Arc::new(Mutex::new(Some(task))),
        };
        self.entries.lock().push(entry);
    }

    /// Detach a task by id and hand it back to the caller.
    ///
    /// Waits for a tick of that task already in progress. Returns `None`
    /// when the id is unknown or the worker already completed it.
    pub fn remove(&self, id: TaskId) -> Option<Box<dyn AsyncTask>> {
        let entry = {
            let mut entries = self.entries.lock();
            let pos = entries.iter().position(|e| e.id == id)?;
            entries.remove(pos)
        };
        let task = entry.slot.lock().take();
        task
    }

    /// Tick every task once, working from a snapshot so producers can add
    /// and remove while ticks run. Finished tasks are detached from the set
    /// and passed to `on_done` immediately.
    pub fn tick_each(&self, mut on_done: impl FnMut(TaskId, Box<dyn AsyncTask>)) {
        let snapshot: Vec<ParallelEntry> = self.entries.lock().clone();

        for entry in snapshot {
            let mut slot = entry.slot.lock();
            let done = match slot.as_mut() {
                Some(task) => {
                    task.tick();
                    task.is_done()
                }
                None => continue,
            };
            if !done {
                continue;
            }

            let detached = {
                let mut entries = self.entries.lock();
                match entries.iter().position(|e| e.id == entry.id) {
                    Some(pos) => {
                        entries.remove(pos);
                        true
                    }
                    None => false,
                }
            };

            // A remover that beat us to the set collects the task from the slot
            if detached {
                let task = slot.take();
                drop(slot);
                if let Some(task) = task {
                    on_done(entry.id, task);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.lock().iter().any(|e| e.id == id)
    }

    /// Take every remaining task
    pub fn drain(&self) -> Vec<(TaskId, Box<dyn AsyncTask>)> {
        let entries: Vec<ParallelEntry> = self.entries.lock().drain(..).collect();
        entries
            .into_iter()
            .filter_map(|entry| {
                let task = entry.slot.lock().take();
                task.map(|task| (entry.id, task))
            })
            .collect()
    }
}

impl Default for ParallelTaskSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::basic::{GenericTask, TaskStep};
    use std::thread;

    fn countdown(ticks: usize) -> Box<dyn AsyncTask> {
        let mut left = ticks;
        Box::new(GenericTask::new(format!("countdown {}", ticks), move || {
            left -= 1;
            if left == 0 {
                TaskStep::Succeeded
            } else {
                TaskStep::Pending
            }
        }))
    }

    #[test]
    fn test_queue_fifo() {
        let queue = TaskQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.push_front(0);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_concurrent_push() {
        let queue = Arc::new(TaskQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push_back(p * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 1000);
    }

    #[test]
    fn test_parallel_tick_detaches_finished() {
        let set = ParallelTaskSet::new();
        let fast = TaskId::new();
        let slow = TaskId::new();
        set.insert(fast, countdown(1));
        set.insert(slow, countdown(2));

        let mut finished = Vec::new();
        set.tick_each(|id, _| finished.push(id));
        assert_eq!(finished, vec![fast]);
        assert!(!set.contains(fast));
        assert!(set.contains(slow));

        set.tick_each(|id, _| finished.push(id));
        assert_eq!(finished, vec![fast, slow]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_parallel_remove_returns_ownership() {
        let set = ParallelTaskSet::new();
        let id = TaskId::new();
        set.insert(id, countdown(3));

        let task = set.remove(id).expect("task handed back");
        assert!(!task.is_done());
        assert!(set.remove(id).is_none());
        assert_eq!(set.len(), 0);

        let mut finished = 0;
        set.tick_each(|_, _| finished += 1);
        assert_eq!(finished, 0);
    }

    #[test]
    fn test_parallel_drain() {
        let set = ParallelTaskSet::new();
        set.insert(TaskId::new(), countdown(5));
        set.insert(TaskId::new(), countdown(5));
        assert_eq!(set.drain().len(), 2);
        assert!(set.is_empty());
    }
}
