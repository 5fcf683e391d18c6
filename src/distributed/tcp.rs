//! TCP transport
//!
//! The coordinator listens and every worker connects to it (a star, since
//! only worker → coordinator traffic exists). Each connection starts with a
//! hello/accepted handshake that binds it to a rank; after that, a reader
//! task per connection moves incoming payloads into the local mailbox, where
//! `probe` and `receive` find them.

use super::mailbox::Mailbox;
use super::protocol::*;
use super::transport::{check_rank, Transport, TransportError};
use super::{Rank, Tag, COORDINATOR_RANK};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// TCP endpoint of one rank
pub struct TcpTransport {
    rank: Rank,
    worker_count: usize,
    node_id: String,
    mailbox: Arc<Mailbox>,
    peers: HashMap<Rank, Mutex<OwnedWriteHalf>>,
    readers: Vec<JoinHandle<()>>,
}

impl TcpTransport {
    /// Bind `addr` and wait until every worker rank has connected
    pub async fn listen(addr: &str, worker_count: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind coordinator on {}", addr))?;

        Self::accept_workers(listener, worker_count).await
    }

    /// Accept hellos on `listener` from ranks `1..worker_count`
    ///
    /// Fails on the first invalid hello: a protocol version or worker count
    /// mismatch, an out-of-range rank, or a rank that already connected.
    pub async fn accept_workers(listener: TcpListener, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            anyhow::bail!("Worker count must be at least 1");
        }

        let node_id = get_node_id()?;
        let mailbox = Arc::new(Mailbox::new());
        let mut peers: HashMap<Rank, Mutex<OwnedWriteHalf>> = HashMap::new();
        let mut readers = Vec::new();

        let expected = worker_count - 1;
        if let Ok(local) = listener.local_addr() {
            info!("Coordinator listening on {} for {} workers", local, expected);
        }

        while peers.len() < expected {
            let (mut stream, addr) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            stream.set_nodelay(true).ok();

            let hello = match read_message(&mut stream).await {
                Ok(Message::Hello(hello)) => hello,
                Ok(other) => {
                    warn!("Expected HELLO from {}, got {:?}; dropping connection", addr, other);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read HELLO from {}: {:#}", addr, e);
                    continue;
                }
            };

            if let Err(reason) = validate_hello(&hello, worker_count, |rank| peers.contains_key(&rank)) {
                let error = ErrorMessage {
                    node_id: node_id.clone(),
                    error: reason.clone(),
                };
                write_message(&mut stream, &Message::Error(error)).await.ok();
                anyhow::bail!("Rejected worker {} ({}): {}", hello.node_id, addr, reason);
            }

            write_message(
                &mut stream,
                &Message::Accepted(AcceptedMessage {
                    protocol_version: PROTOCOL_VERSION,
                    node_id: node_id.clone(),
                }),
            )
            .await
            .with_context(|| format!("Failed to accept rank {}", hello.rank))?;

            info!(
                "Worker rank {} connected from {} ({}) [{}/{}]",
                hello.rank,
                addr,
                hello.node_id,
                peers.len() + 1,
                expected
            );

            let (read_half, write_half) = stream.into_split();
            readers.push(spawn_reader(read_half, hello.rank, mailbox.clone()));
            peers.insert(hello.rank, Mutex::new(write_half));
        }

        Ok(Self {
            rank: COORDINATOR_RANK,
            worker_count,
            node_id,
            mailbox,
            peers,
            readers,
        })
    }

    /// Connect worker `rank` to the coordinator at `addr`
    ///
    /// The coordinator may not be listening yet, so the connect is retried
    /// up to `retries` more times, `retry_delay` apart.
    pub async fn connect(
        addr: &str,
        rank: Rank,
        worker_count: usize,
        retries: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        if rank == COORDINATOR_RANK || rank >= worker_count {
            anyhow::bail!("Worker rank {} out of range 1..{}", rank, worker_count);
        }

        let node_id = get_node_id()?;

        let mut attempt = 0;
        let mut stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Connect to coordinator {} failed ({}); retry {}/{} in {:?}",
                        addr, e, attempt, retries, retry_delay
                    );
                    sleep(retry_delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to connect to coordinator {} after {} attempts", addr, attempt + 1)
                    })
                }
            }
        };
        stream.set_nodelay(true).ok();

        let hello = Message::Hello(HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            rank,
            worker_count,
            node_id: node_id.clone(),
        });
        write_message(&mut stream, &hello).await?;

        match read_message(&mut stream).await.context("No reply to HELLO")? {
            Message::Accepted(accepted) => {
                if accepted.protocol_version != PROTOCOL_VERSION {
                    anyhow::bail!(
                        "Protocol version mismatch on coordinator {}: expected {}, got {}",
                        accepted.node_id,
                        PROTOCOL_VERSION,
                        accepted.protocol_version
                    );
                }
                info!("Rank {} connected to coordinator {} ({})", rank, addr, accepted.node_id);
            }
            Message::Error(error) => {
                anyhow::bail!("Coordinator {} rejected rank {}: {}", error.node_id, rank, error.error)
            }
            other => anyhow::bail!("Expected ACCEPTED, got {:?}", other),
        }

        let mailbox = Arc::new(Mailbox::new());
        let (read_half, write_half) = stream.into_split();
        let readers = vec![spawn_reader(read_half, COORDINATOR_RANK, mailbox.clone())];
        let mut peers: HashMap<Rank, Mutex<OwnedWriteHalf>> = HashMap::new();
        peers.insert(COORDINATOR_RANK, Mutex::new(write_half));

        Ok(Self {
            rank,
            worker_count,
            node_id,
            mailbox,
            peers,
            readers,
        })
    }

    /// Host name reported in handshakes
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    async fn send(&self, payload: &[u8], destination: Rank, tag: Tag) -> Result<(), TransportError> {
        check_rank(destination, self.worker_count).map_err(|_| TransportError::Unreachable(destination))?;

        if destination == self.rank {
            self.mailbox.deliver(self.rank, tag, payload.to_vec());
            return Ok(());
        }

        let peer = self
            .peers
            .get(&destination)
            .ok_or(TransportError::Unreachable(destination))?;

        let msg = Message::Payload(PayloadMessage {
            tag,
            bytes: payload.to_vec(),
        });
        let mut writer = peer.lock().await;
        write_message(&mut *writer, &msg)
            .await
            .map_err(|e| TransportError::Channel {
                rank: destination,
                reason: format!("{:#}", e),
            })?;

        debug!(from = self.rank, to = destination, %tag, bytes = payload.len(), "Sent message");
        Ok(())
    }

    async fn probe(&self, source: Rank, tag: Tag) -> Result<usize, TransportError> {
        check_rank(source, self.worker_count)?;
        self.mailbox.probe(source, tag).await
    }

    async fn receive(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<usize, TransportError> {
        check_rank(source, self.worker_count)?;
        self.mailbox.take(buffer, source, tag).await
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Check a worker's hello against this job
fn validate_hello(
    hello: &HelloMessage,
    worker_count: usize,
    already_connected: impl Fn(Rank) -> bool,
) -> std::result::Result<(), String> {
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(format!(
            "Protocol version mismatch on node {}: expected {}, got {}",
            hello.node_id, PROTOCOL_VERSION, hello.protocol_version
        ));
    }
    if hello.worker_count != worker_count {
        return Err(format!(
            "Worker count mismatch: coordinator has {}, worker has {}",
            worker_count, hello.worker_count
        ));
    }
    if hello.rank == COORDINATOR_RANK || hello.rank >= worker_count {
        return Err(format!("Rank {} out of range 1..{}", hello.rank, worker_count));
    }
    if already_connected(hello.rank) {
        return Err(format!("Rank {} already connected", hello.rank));
    }
    Ok(())
}

/// Move payloads from `peer`'s connection into `mailbox` until it closes
fn spawn_reader(mut read_half: OwnedReadHalf, peer: Rank, mailbox: Arc<Mailbox>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_message(&mut read_half).await {
                Ok(Message::Payload(payload)) => {
                    debug!(from = peer, tag = %payload.tag, bytes = payload.bytes.len(), "Received message");
                    mailbox.deliver(peer, payload.tag, payload.bytes);
                }
                Ok(Message::Error(error)) => {
                    warn!("Rank {} ({}) reported an error: {}", peer, error.node_id, error.error);
                    break;
                }
                Ok(other) => {
                    warn!("Unexpected message from rank {}: {:?}", peer, other);
                    break;
                }
                Err(e) if is_disconnect(&e) => {
                    debug!("Rank {} closed its connection", peer);
                    break;
                }
                Err(e) => {
                    warn!("Connection to rank {} failed: {:#}", peer, e);
                    break;
                }
            }
        }
        mailbox.close_source(peer);
    })
}

/// Get node identifier (hostname)
fn get_node_id() -> Result<String> {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return Ok(hostname_str);
        }
    }

    // Fall back to "unknown"
    Ok("unknown".to_string())
}
