//! Delivery fan-out
//!
//! One broadcast turns a message into one delivery attempt per peer. The
//! caller gets a [`BroadcastHandle`] back immediately; everything else runs on
//! spawned tasks:
//!
//! - a supervisor snapshots the directory, spawns the attempts into a
//!   per-broadcast [`JoinSet`] and reads their outcomes off a completion
//!   channel (many producers, one consumer)
//! - once it has seen as many outcomes as attempts it drops the channel and
//!   fires the completion signal, exactly once
//!
//! Every attempt yields exactly one outcome. Failures are outcomes too, so the
//! count always matches. Attempts are never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::{PeerAddress, PeerDirectory};
use crate::errors::DeliveryError;
use crate::message::{Message, Notice};
use crate::sink::EventSink;

// ----------------------------------------------------------------------------
// Delivery Trait
// ----------------------------------------------------------------------------

/// What a peer answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status; any status counts as delivered
    pub status: u16,
    /// Size of the response body
    pub bytes: usize,
}

/// One outbound request to one peer
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(
        &self,
        peer: &PeerAddress,
        content: &str,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Delivery over plain HTTP: `GET http://<peer>/<path>?content=<text>`
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    path: String,
    timeout: Option<Duration>,
}

impl HttpDelivery {
    /// Build a client; without a timeout the transport defaults apply
    pub fn new(path: impl Into<String>, timeout: Option<Duration>) -> Result<Self, DeliveryError> {
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            path: path.into(),
            timeout,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> DeliveryError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => DeliveryError::Timeout {
                duration_ms: timeout.as_millis() as u64,
            },
            _ => DeliveryError::Transport(err.to_string()),
        }
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn deliver(
        &self,
        peer: &PeerAddress,
        content: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .get(peer.receive_url(&self.path))
            .query(&[("content", content)])
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        // The body carries no contract; a truncated one still means delivered.
        let bytes = response.bytes().await.map(|b| b.len()).unwrap_or(0);

        Ok(DeliveryReceipt { status, bytes })
    }
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Delivered { status: u16, bytes: usize },
    Failed { cause: DeliveryError },
}

/// Outcome of one attempt against one peer
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub peer: PeerAddress,
    pub elapsed: Duration,
    pub kind: OutcomeKind,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.kind, OutcomeKind::Delivered { .. })
    }
}

/// Tally of one finished broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub attempts: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastSummary {
    fn new(attempts: usize) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }

    fn completed(&self) -> usize {
        self.delivered + self.failed
    }

    fn record(&mut self, outcome: &DeliveryOutcome) {
        if outcome.is_delivered() {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

// ----------------------------------------------------------------------------
// Broadcast Handle
// ----------------------------------------------------------------------------

/// Caller's view of a running broadcast
///
/// Dropping the handle does not stop the broadcast.
#[derive(Debug)]
pub struct BroadcastHandle {
    outcomes: mpsc::UnboundedReceiver<DeliveryOutcome>,
    done: oneshot::Receiver<BroadcastSummary>,
    cancel: CancellationToken,
}

impl BroadcastHandle {
    /// Next outcome in completion order; `None` once every attempt has finished
    pub async fn next_outcome(&mut self) -> Option<DeliveryOutcome> {
        self.outcomes.recv().await
    }

    /// Wait for the completion signal
    pub async fn finished(self) -> BroadcastSummary {
        // The supervisor always sends unless the runtime is shutting down.
        self.done.await.unwrap_or_default()
    }

    /// Cancel attempts still in flight; they finish as failed outcomes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

// ----------------------------------------------------------------------------
// Broadcaster
// ----------------------------------------------------------------------------

/// Fans messages out to every peer the directory knows about
#[derive(Clone)]
pub struct Broadcaster {
    directory: Arc<dyn PeerDirectory>,
    delivery: Arc<dyn Delivery>,
    sink: Arc<dyn EventSink>,
}

impl Broadcaster {
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        delivery: Arc<dyn Delivery>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            directory,
            delivery,
            sink,
        }
    }

    /// Start a broadcast and return without waiting for any peer
    ///
    /// Must be called from within a tokio runtime.
    pub fn broadcast(&self, message: &Message) -> BroadcastHandle {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            directory: Arc::clone(&self.directory),
            delivery: Arc::clone(&self.delivery),
            sink: Arc::clone(&self.sink),
            content: Arc::from(message.content()),
            cancel: cancel.clone(),
        };
        tokio::spawn(supervisor.run(outcome_tx, done_tx));

        BroadcastHandle {
            outcomes: outcome_rx,
            done: done_rx,
            cancel,
        }
    }
}

struct Supervisor {
    directory: Arc<dyn PeerDirectory>,
    delivery: Arc<dyn Delivery>,
    sink: Arc<dyn EventSink>,
    content: Arc<str>,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(
        self,
        observer: mpsc::UnboundedSender<DeliveryOutcome>,
        done: oneshot::Sender<BroadcastSummary>,
    ) {
        let peers = self.snapshot().await;
        let mut summary = BroadcastSummary::new(peers.len());
        debug!(attempts = peers.len(), "Starting broadcast");

        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
        let mut attempts = JoinSet::new();
        for peer in peers {
            attempts.spawn(attempt(
                Arc::clone(&self.delivery),
                peer,
                Arc::clone(&self.content),
                self.cancel.child_token(),
                completion_tx.clone(),
            ));
        }
        drop(completion_tx);

        while summary.completed() < summary.attempts {
            let Some(outcome) = completion_rx.recv().await else {
                break;
            };
            summary.record(&outcome);
            self.report(&outcome);
            let _ = observer.send(outcome);
        }

        // An attempt that panicked never reported; count it so the tally adds up.
        let lost = summary.attempts - summary.completed();
        if lost > 0 {
            warn!(lost, "Delivery attempts ended without an outcome");
            summary.failed += lost;
        }

        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                debug!("Delivery task ended abnormally: {}", e);
            }
        }
        drop(completion_rx);
        drop(observer);

        info!(
            attempts = summary.attempts,
            delivered = summary.delivered,
            failed = summary.failed,
            "Broadcast finished"
        );
        let _ = done.send(summary);
    }

    /// Read the directory once, off the executor; an unreadable directory
    /// degrades to no peers
    async fn snapshot(&self) -> Vec<PeerAddress> {
        let directory = Arc::clone(&self.directory);
        match tokio::task::spawn_blocking(move || directory.discover_peers()).await {
            Ok(Ok(peers)) => peers,
            Ok(Err(e)) => {
                warn!("Peer directory unavailable: {}", e);
                self.sink
                    .notice(Notice::warning(format!("Peer directory unavailable: {}", e)));
                Vec::new()
            }
            Err(e) => {
                warn!("Peer directory lookup panicked: {}", e);
                self.sink
                    .notice(Notice::warning("Peer directory unavailable"));
                Vec::new()
            }
        }
    }

    fn report(&self, outcome: &DeliveryOutcome) {
        match &outcome.kind {
            OutcomeKind::Delivered { status, bytes } => {
                debug!(
                    peer = %outcome.peer,
                    status,
                    bytes,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Delivered"
                );
            }
            OutcomeKind::Failed { cause } => {
                warn!(peer = %outcome.peer, "Delivery failed: {}", cause);
                self.sink.notice(Notice::warning(format!(
                    "Could not reach {}: {}",
                    outcome.peer, cause
                )));
            }
        }
    }
}

async fn attempt(
    delivery: Arc<dyn Delivery>,
    peer: PeerAddress,
    content: Arc<str>,
    cancel: CancellationToken,
    completion: mpsc::UnboundedSender<DeliveryOutcome>,
) {
    let started = Instant::now();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
        result = delivery.deliver(&peer, &content) => result,
    };

    let kind = match result {
        Ok(receipt) => OutcomeKind::Delivered {
            status: receipt.status,
            bytes: receipt.bytes,
        },
        Err(cause) => OutcomeKind::Failed { cause },
    };

    let _ = completion.send(DeliveryOutcome {
        peer,
        elapsed: started.elapsed(),
        kind,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::errors::DirectoryError;
    use crate::message::ChatEvent;
    use crate::sink::ChannelSink;
    use std::net::Ipv4Addr;

    struct AlwaysOk;

    #[async_trait]
    impl Delivery for AlwaysOk {
        async fn deliver(
            &self,
            _peer: &PeerAddress,
            content: &str,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            Ok(DeliveryReceipt {
                status: 200,
                bytes: content.len(),
            })
        }
    }

    struct BrokenDirectory;

    impl PeerDirectory for BrokenDirectory {
        fn discover_peers(&self) -> Result<Vec<PeerAddress>, DirectoryError> {
            Err(DirectoryError::CommandFailed {
                command: "arp -an".to_string(),
                reason: "not found".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_unavailable_directory_degrades_to_empty_broadcast() {
        let (sink, mut events) = ChannelSink::new();
        let broadcaster = Broadcaster::new(
            Arc::new(BrokenDirectory),
            Arc::new(AlwaysOk),
            Arc::new(sink),
        );

        let summary = broadcaster.broadcast(&Message::local("hi")).finished().await;
        assert_eq!(summary, BroadcastSummary::default());

        match events.recv().await {
            Some(ChatEvent::Notice(notice)) => {
                assert!(notice.text().contains("Peer directory unavailable"))
            }
            other => panic!("expected a notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outcome_reports_receipt() {
        let (sink, _events) = ChannelSink::new();
        let peer = PeerAddress::new(Ipv4Addr::new(10, 0, 0, 2), 3998);
        let broadcaster = Broadcaster::new(
            Arc::new(StaticDirectory::new([peer])),
            Arc::new(AlwaysOk),
            Arc::new(sink),
        );

        let mut handle = broadcaster.broadcast(&Message::local("hello"));
        let outcome = handle.next_outcome().await.expect("one outcome");
        assert_eq!(outcome.peer, peer);
        assert_eq!(outcome.kind, OutcomeKind::Delivered { status: 200, bytes: 5 });
        assert!(handle.next_outcome().await.is_none());
    }
}
