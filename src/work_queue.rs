// src/work_queue.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Concurrent work queue with drain tracking.
//!
//! `push` / `pop` move items between the producer and the workers;
//! `task_done` / `join` account for outstanding work so the producer can
//! block until every pushed item has been fully handled. `pop` never returns
//! an "empty and closed" sentinel; workers run until canceled by the pool.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Signaled on every push.
    available: Notify,
    /// Pushed items not yet marked done.
    unfinished: AtomicUsize,
    /// Signaled when `unfinished` reaches zero.
    drained: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue one item. The item counts as unfinished until a matching
    /// `task_done` call.
    pub fn push(&self, item: T) {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.items.lock().unwrap().push_back(item);
        self.available.notify_one();
    }

    /// Dequeue one item, suspending until one is available.
    pub async fn pop(&self) -> T {
        loop {
            // Register interest before re-checking so a push between the
            // check and the await cannot be missed.
            let notified = self.available.notified();
            if let Some(item) = self.items.lock().unwrap().pop_front() {
                return item;
            }
            notified.await;
        }
    }

    /// Mark one previously popped item as complete.
    pub fn task_done(&self) {
        let prev = self.unfinished.fetch_sub(1, Ordering::SeqCst);
        assert!(prev > 0, "task_done called more times than items were pushed");
        if prev == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Completion handle for one popped item: `task_done` fires when the
    /// guard drops, on success, error, or panic inside the handler.
    pub fn completion_guard(&self) -> CompletionGuard<'_, T> {
        CompletionGuard { queue: self }
    }

    /// Suspend until every pushed item has been marked done. Returns
    /// immediately when nothing is outstanding.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Pushed items not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }
}

pub struct CompletionGuard<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<T> Drop for CompletionGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn pop_returns_items_in_push_order() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop().await, 1);
        assert_eq!(queue.pop().await, 2);
        assert_eq!(queue.pop().await, 3);
        assert_eq!(queue.outstanding(), 3);
    }

    #[tokio::test]
    async fn join_returns_immediately_when_empty() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        tokio::time::timeout(Duration::from_millis(50), queue.join())
            .await
            .expect("join on an empty queue must not block");
    }

    #[tokio::test]
    async fn pop_waits_for_late_push() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(7u32);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn join_waits_for_every_item_across_workers() {
        for worker_count in [1usize, 3, 8] {
            let queue = Arc::new(WorkQueue::new());
            let done = Arc::new(AtomicUsize::new(0));
            let total = 64usize;

            let mut workers = Vec::new();
            for _ in 0..worker_count {
                let queue = queue.clone();
                let done = done.clone();
                workers.push(tokio::spawn(async move {
                    loop {
                        let _item: usize = queue.pop().await;
                        let _guard = queue.completion_guard();
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }

            for i in 0..total {
                queue.push(i);
            }
            tokio::time::timeout(Duration::from_secs(5), queue.join())
                .await
                .expect("join must return once all items are done");

            assert_eq!(done.load(Ordering::SeqCst), total);
            assert_eq!(queue.outstanding(), 0);
            for worker in workers {
                worker.abort();
            }
        }
    }

    #[tokio::test]
    async fn completion_guard_accounts_for_failed_handlers() {
        let queue = Arc::new(WorkQueue::new());
        queue.push("bad");

        let item = queue.pop().await;
        {
            let _guard = queue.completion_guard();
            // Handler "fails" here; the guard still marks the item done.
            assert_eq!(item, "bad");
        }
        tokio::time::timeout(Duration::from_millis(50), queue.join())
            .await
            .expect("join must return after guard drop");
    }
}
