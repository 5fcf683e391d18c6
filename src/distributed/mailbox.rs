//! Pending message store
//!
//! One mailbox per receiving endpoint. Messages are queued per
//! `(source, tag)` in arrival order, and waiters are woken whenever something
//! arrives or a source closes.

use super::transport::TransportError;
use super::{Rank, Tag};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct MailboxState {
    pending: HashMap<(Rank, Tag), VecDeque<Vec<u8>>>,
    closed_sources: HashSet<Rank>,
    shut_down: bool,
}

/// Receive side of an endpoint
#[derive(Default)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        // State stays consistent under panics (single push/pop per lock)
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `payload` from `source`
    ///
    /// Returns false (and drops the payload) once the mailbox is shut down.
    pub fn deliver(&self, source: Rank, tag: Tag, payload: Vec<u8>) -> bool {
        {
            let mut state = self.lock();
            if state.shut_down {
                return false;
            }
            state
                .pending
                .entry((source, tag))
                .or_default()
                .push_back(payload);
        }
        self.notify.notify_waiters();
        true
    }

    /// Mark `source` as gone
    ///
    /// Messages already queued from it stay receivable; waits for anything
    /// more fail with `PeerClosed`.
    pub fn close_source(&self, source: Rank) {
        self.lock().closed_sources.insert(source);
        self.notify.notify_waiters();
    }

    /// Refuse further deliveries (the owning endpoint went away)
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        state.pending.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Length of the oldest message from `source` with `tag`, waiting if none
    pub async fn probe(&self, source: Rank, tag: Tag) -> Result<usize, TransportError> {
        self.wait_for(source, tag, |queue| Ok(queue.front().map_or(0, Vec::len)))
            .await
    }

    /// Pop the oldest message from `source` with `tag` into `buffer`
    pub async fn take(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<usize, TransportError> {
        let capacity = buffer.len();
        self.wait_for(source, tag, |queue| {
            let needed = queue.front().map_or(0, Vec::len);
            if needed > capacity {
                return Err(TransportError::BufferTooSmall { needed, capacity });
            }

            let message = queue.pop_front().unwrap_or_default();
            buffer[..message.len()].copy_from_slice(&message);
            Ok(message.len())
        })
        .await
    }

    /// Run `ready` on the `(source, tag)` queue once it is non-empty
    async fn wait_for<T, F>(&self, source: Rank, tag: Tag, mut ready: F) -> Result<T, TransportError>
    where
        F: FnMut(&mut VecDeque<Vec<u8>>) -> Result<T, TransportError>,
    {
        loop {
            // Register before checking so a delivery in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(queue) = state.pending.get_mut(&(source, tag)).filter(|q| !q.is_empty()) {
                    return ready(queue);
                }
                if state.closed_sources.contains(&source) {
                    return Err(TransportError::PeerClosed { rank: source, tag });
                }
            }

            notified.await;
        }
    }
}
