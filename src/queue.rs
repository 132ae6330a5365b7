use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::types::{EntityChange, EntityKind};

/// Unbounded FIFO buffer guarded by its own lock.
///
/// Producers only ever hold the lock for a push; a drain swaps the whole
/// buffer out, so anything enqueued after the swap belongs to the next drain.
#[derive(Debug)]
pub struct EntityQueue<T> {
    items: Mutex<Vec<T>>,
    len: AtomicUsize,
}

impl<T> Default for EntityQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            len: AtomicUsize::new(0),
        }
    }
}

impl<T> EntityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: T) {
        let mut items = self.lock();
        items.push(item);
        self.len.store(items.len(), Ordering::Relaxed);
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.lock();
        self.len.store(0, Ordering::Relaxed);
        std::mem::take(&mut *items)
    }

    /// Best-effort length for monitoring. Not synchronized with the lock.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panicking producer cannot leave a Vec half-pushed, so the data
        // behind a poisoned lock is still usable.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One independent queue per entity kind.
///
/// This is the inbound handle producers share (usually behind an `Arc`).
#[derive(Debug, Default)]
pub struct EntityQueues {
    queues: [EntityQueue<EntityChange>; EntityKind::COUNT],
}

impl EntityQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand one change to the pipeline. Never fails.
    pub fn publish(&self, change: EntityChange) {
        self.queues[change.kind().index()].enqueue(change);
    }

    pub fn queue(&self, kind: EntityKind) -> &EntityQueue<EntityChange> {
        &self.queues[kind.index()]
    }

    pub fn drain(&self, kind: EntityKind) -> Vec<EntityChange> {
        self.queue(kind).drain_all()
    }

    /// Drain every kind in [`EntityKind::ALL`] order and concatenate.
    pub fn drain_all(&self) -> Vec<EntityChange> {
        let mut out = Vec::new();
        for kind in EntityKind::ALL {
            out.extend(self.queue(kind).drain_all());
        }
        out
    }

    pub fn total_len(&self) -> usize {
        self.queues.iter().map(EntityQueue::len).sum()
    }
}
