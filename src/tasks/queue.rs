use std::{collections::VecDeque, ops::Deref};

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::infrastructure::shutdown::ShutdownListener;

/// Unbounded FIFO shared between producers and a pool of consumers.
/// Tracks outstanding items: an item counts from `push` until the consumer
/// drops its [`Claimed`] handle, so [`WorkQueue::wait_drained`] resolves only
/// once every queued item has been fully processed or purged.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
    outstanding: watch::Sender<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            outstanding,
        }
    }

    pub fn push(&self, value: T) {
        {
            let mut items = self.items.lock();
            self.outstanding.send_modify(|n| *n += 1);
            items.push_back(value);
        }
        self.available.notify_one();
    }

    pub async fn pop(&self, shutdown: &mut ShutdownListener) -> Option<Claimed<'_, T>> {
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            let next = self.items.lock().pop_front();
            if let Some(value) = next {
                return Some(Claimed { value, queue: self });
            }
            tokio::select! {
                _ = self.available.notified() => {}
                _ = shutdown.notified() => return None,
            }
        }
    }

    pub fn purge(&self) -> usize {
        let mut items = self.items.lock();
        let dropped = items.len();
        items.clear();
        self.outstanding
            .send_modify(|n| *n = n.saturating_sub(dropped));
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    pub async fn wait_drained(&self) {
        let mut receiver = self.outstanding.subscribe();
        let _ = receiver.wait_for(|n| *n == 0).await;
    }

    fn complete(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// An item taken from a [`WorkQueue`]; dropping it marks the item done.
pub struct Claimed<'a, T> {
    value: T,
    queue: &'a WorkQueue<T>,
}

impl<T> Deref for Claimed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Claimed<'_, T> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
