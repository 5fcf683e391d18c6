//! In-process transport
//!
//! All ranks live in one process and share a vector of mailboxes. Sending
//! copies the payload into the destination's mailbox; nothing is shared by
//! reference between ranks.

use super::mailbox::Mailbox;
use super::transport::{check_rank, Transport, TransportError};
use super::{Rank, Tag};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One rank's endpoint of an in-process cluster
///
/// Dropping an endpoint closes it: peers waiting on it fail with
/// `PeerClosed`, and sends to it fail with `Unreachable`.
pub struct LocalTransport {
    rank: Rank,
    mailboxes: Arc<Vec<Mailbox>>,
}

impl LocalTransport {
    /// Endpoints for ranks `0..worker_count`, in rank order
    pub fn cluster(worker_count: usize) -> Vec<LocalTransport> {
        let mailboxes: Arc<Vec<Mailbox>> = Arc::new((0..worker_count).map(|_| Mailbox::new()).collect());

        (0..worker_count)
            .map(|rank| LocalTransport {
                rank,
                mailboxes: mailboxes.clone(),
            })
            .collect()
    }

    fn own_mailbox(&self) -> &Mailbox {
        &self.mailboxes[self.rank]
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn worker_count(&self) -> usize {
        self.mailboxes.len()
    }

    async fn send(&self, payload: &[u8], destination: Rank, tag: Tag) -> Result<(), TransportError> {
        let mailbox = self
            .mailboxes
            .get(destination)
            .ok_or(TransportError::Unreachable(destination))?;

        if !mailbox.deliver(self.rank, tag, payload.to_vec()) {
            return Err(TransportError::Unreachable(destination));
        }

        debug!(from = self.rank, to = destination, %tag, bytes = payload.len(), "Sent message");
        Ok(())
    }

    async fn probe(&self, source: Rank, tag: Tag) -> Result<usize, TransportError> {
        check_rank(source, self.worker_count())?;
        self.own_mailbox().probe(source, tag).await
    }

    async fn receive(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<usize, TransportError> {
        check_rank(source, self.worker_count())?;
        let len = self.own_mailbox().take(buffer, source, tag).await?;
        debug!(at = self.rank, from = source, %tag, bytes = len, "Received message");
        Ok(len)
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.own_mailbox().shut_down();
        for mailbox in self.mailboxes.iter() {
            mailbox.close_source(self.rank);
        }
    }
}
