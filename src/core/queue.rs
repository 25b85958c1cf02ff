//! # Pending queue: priority order, FIFO among equal priorities.
//!
//! ```text
//! insert(p):  empty or back.priority >= p ─► push_back        (fast path)
//!             front.priority < p          ─► push_front       (fast path)
//!             otherwise                   ─► after the last entry with priority >= p
//! ```
//!
//! Held (paused) entries keep their position; the scheduler takes the first
//! entry that is not held, so a resumed event runs in its original place.

use std::collections::VecDeque;

use crate::core::queued::QueuedEvent;
use crate::events::Event;

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: VecDeque<QueuedEvent>,
    next_seq: u64,
}

impl PendingQueue {
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn get(&self, at: usize) -> Option<&QueuedEvent> {
        self.items.get(at)
    }

    /// Position of the first entry the scheduler has to look at: one that is
    /// not held, or one that has to be dropped (stale or cancelled).
    pub(crate) fn first_ready(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|q| !q.is_current() || q.event.is_cancelled() || !q.event.is_held())
    }

    pub(crate) fn take(&mut self, at: usize) -> Option<QueuedEvent> {
        self.items.remove(at)
    }

    pub(crate) fn insert(&mut self, mut item: QueuedEvent) {
        item.seq = self.next_seq;
        self.next_seq += 1;

        let p = item.priority();
        match (self.items.front(), self.items.back()) {
            (None, _) => self.items.push_back(item),
            (_, Some(back)) if back.priority() >= p => self.items.push_back(item),
            (Some(front), _) if front.priority() < p => self.items.push_front(item),
            _ => self.place(item),
        }
    }

    /// Puts back an entry taken out of this queue, keeping its sequence number
    /// so it stays the oldest among its priority.
    pub(crate) fn restore(&mut self, item: QueuedEvent) {
        self.place(item);
    }

    fn place(&mut self, item: QueuedEvent) {
        let (p, seq) = (item.priority(), item.seq);
        let at = self
            .items
            .iter()
            .rposition(|q| q.priority() > p || (q.priority() == p && q.seq < seq))
            .map_or(0, |i| i + 1);
        self.items.insert(at, item);
    }

    /// Removes the entry inserted earliest (smallest sequence number).
    pub(crate) fn evict_oldest(&mut self) -> Option<QueuedEvent> {
        let at = self
            .items
            .iter()
            .enumerate()
            .min_by_key(|(_, q)| q.seq)
            .map(|(i, _)| i)?;
        self.items.remove(at)
    }

    /// Removes the current-generation entry for `event`, if queued.
    pub(crate) fn remove(&mut self, event: &Event) -> Option<QueuedEvent> {
        let at = self
            .items
            .iter()
            .position(|q| q.event == *event && q.is_current())?;
        self.items.remove(at)
    }

    pub(crate) fn drain(&mut self) -> Vec<QueuedEvent> {
        self.items.drain(..).collect()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.items.iter().map(|q| q.event.clone()).collect()
    }
}
