//! FIFO handing messages from a network receiver to the main loop.
//!
//! The mutex is only held for the container operation itself, never across
//! an await point or a socket call.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::Notify, time};

/// Unbounded multi-producer queue with a timed wait for the consumer.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    pushed: Notify,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            pushed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Deque operations cannot leave it half-updated, poisoning is ignored.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, value: T) {
        self.lock().push_back(value);
        self.pushed.notify_one();
    }

    /// Pops the oldest element, if any.
    pub fn poll(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Takes every queued element, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Waits until the queue holds at least one element or `timeout` elapses.
    ///
    /// Returns `true` if the queue is non-empty on return.
    pub async fn wait_if_empty(&self, timeout: Duration) -> bool {
        let deadline = time::Instant::now() + timeout;
        loop {
            let pushed = self.pushed.notified();
            if !self.is_empty() {
                return true;
            }
            if time::timeout_at(deadline, pushed).await.is_err() {
                return !self.is_empty();
            }
        }
    }
}
