// In-memory progress fan-out: task id → set of bounded subscriber channels.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::types::Progress;

/// One subscriber's end of the fan-out. The receiver yields samples until
/// the channel closes, which signals end-of-task.
pub struct Subscription {
    pub token: u64,
    pub rx: mpsc::Receiver<Progress>,
}

/// Routes progress samples from the fetchers to any number of subscribers,
/// keyed by task id. All operations are short critical sections under one
/// mutex; none of them suspend or block on a slow consumer.
pub struct Hub {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_token: u64,
    subs: HashMap<String, HashMap<u64, mpsc::Sender<Progress>>>,
}

impl Hub {
    /// `capacity` bounds each subscriber channel; a full channel drops
    /// samples rather than backpressuring the publisher.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    // Critical sections are pure map and try_send work; nothing under the
    // lock can panic, so poisoning is unreachable.
    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("hub mutex poisoned")
    }

    /// Register a task ahead of its download. A no-op when the id is
    /// already present, so existing subscribers are never dropped.
    pub fn new_task(&self, id: &str) {
        self.locked().subs.entry(id.to_string()).or_default();
    }

    /// Whether the task is known to the hub. Presence is weak evidence
    /// only: it means the task was registered or still has subscribers,
    /// not that its download is running.
    pub fn contains(&self, id: &str) -> bool {
        self.locked().subs.contains_key(id)
    }

    /// Attach a subscriber to a task. A missing id creates the entry, so a
    /// subscriber racing the coordinator still lands in the set.
    pub fn subscribe(&self, id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = self.locked();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.subs.entry(id.to_string()).or_default().insert(token, tx);
        Subscription { token, rx }
    }

    /// Broadcast one sample to every subscriber of `id`. Never blocks:
    /// full channels drop the sample, unknown ids are a no-op.
    pub fn publish(&self, id: &str, sample: Progress) {
        let inner = self.locked();
        if let Some(set) = inner.subs.get(id) {
            for tx in set.values() {
                let _ = tx.try_send(sample);
            }
        }
    }

    /// Detach one subscriber. Dropping its sender closes the channel; the
    /// task entry is reaped once its set empties.
    pub fn unsubscribe(&self, id: &str, token: u64) {
        let mut inner = self.locked();
        if let Some(set) = inner.subs.get_mut(id) {
            set.remove(&token);
            if set.is_empty() {
                inner.subs.remove(id);
            }
        }
    }

    /// Drop every subscriber channel of a finished task and delete the
    /// entry. Remaining subscribers observe the close after draining any
    /// buffered samples; later lookups see the task as unknown.
    pub fn close_task(&self, id: &str) {
        self.locked().subs.remove(id);
    }

    pub fn subscriber_count(&self, id: &str) -> usize {
        self.locked().subs.get(id).map_or(0, |set| set.len())
    }
}
