//! Broadcast fan-out tests
//!
//! These tests drive the broadcaster with in-memory directories and deliveries
//! to check the attempt/outcome accounting, the completion signal and the
//! independence of attempts from one another.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use lanchat_core::{
    BroadcastSummary, Broadcaster, ChannelSink, ChatEvent, Delivery, DeliveryError,
    DeliveryReceipt, EventReceiver, Message, NoticeLevel, OutcomeKind, PeerAddress,
    PeerDirectory, StaticDirectory,
};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(5);
const SHORT: Duration = Duration::from_millis(100);

fn peers(count: u8) -> StaticDirectory {
    StaticDirectory::new((1..=count).map(|i| PeerAddress::new(Ipv4Addr::new(10, 0, 0, i), 3998)))
}

fn broadcaster(
    directory: impl PeerDirectory + 'static,
    delivery: impl Delivery + 'static,
) -> (Broadcaster, EventReceiver) {
    let (sink, events) = ChannelSink::new();
    (
        Broadcaster::new(Arc::new(directory), Arc::new(delivery), Arc::new(sink)),
        events,
    )
}

/// Succeeds for even last octets, fails for odd ones
struct EvenOddDelivery;

#[async_trait]
impl Delivery for EvenOddDelivery {
    async fn deliver(
        &self,
        peer: &PeerAddress,
        _content: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if peer.ip().octets()[3] % 2 == 0 {
            Ok(DeliveryReceipt { status: 200, bytes: 8 })
        } else {
            Err(DeliveryError::Transport("connection refused".to_string()))
        }
    }
}

/// Never answers peers in `hanging`, answers everyone else at once
struct HangingDelivery {
    hanging: Vec<Ipv4Addr>,
}

#[async_trait]
impl Delivery for HangingDelivery {
    async fn deliver(
        &self,
        peer: &PeerAddress,
        _content: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if self.hanging.contains(&peer.ip()) {
            std::future::pending::<()>().await;
        }
        Ok(DeliveryReceipt { status: 200, bytes: 0 })
    }
}

/// Each delivery waits for a permit, then counts itself as completed
struct GatedDelivery {
    gate: Arc<Semaphore>,
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl Delivery for GatedDelivery {
    async fn deliver(
        &self,
        _peer: &PeerAddress,
        _content: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        permit.forget();
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt { status: 204, bytes: 0 })
    }
}

// ----------------------------------------------------------------------------
// Attempt Accounting
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_one_outcome_per_peer_for_every_peer_count() {
    for count in 0..=6u8 {
        let (broadcaster, _events) = broadcaster(peers(count), EvenOddDelivery);
        let mut handle = broadcaster.broadcast(&Message::local("ping"));

        let mut outcomes = Vec::new();
        while let Some(outcome) = timeout(WAIT, handle.next_outcome())
            .await
            .expect("outcomes should arrive")
        {
            outcomes.push(outcome);
        }

        let summary = timeout(WAIT, handle.finished()).await.expect("completion signal");
        let expected_delivered = (count / 2) as usize;

        assert_eq!(outcomes.len(), count as usize);
        assert_eq!(summary.attempts, count as usize);
        assert_eq!(summary.delivered, expected_delivered);
        assert_eq!(summary.failed, count as usize - expected_delivered);
        assert_eq!(
            outcomes.iter().filter(|o| o.is_delivered()).count(),
            expected_delivered
        );
    }
}

#[tokio::test]
async fn test_empty_peer_set_completes_immediately() {
    let (broadcaster, mut events) = broadcaster(StaticDirectory::default(), EvenOddDelivery);

    let handle = broadcaster.broadcast(&Message::local("anyone?"));
    let summary = timeout(SHORT, handle.finished())
        .await
        .expect("empty broadcast should finish at once");

    assert_eq!(summary, BroadcastSummary::default());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_attempts_carry_cause_and_notify_sink() {
    let (broadcaster, mut events) = broadcaster(peers(1), EvenOddDelivery);

    let mut handle = broadcaster.broadcast(&Message::local("hi"));
    let outcome = timeout(WAIT, handle.next_outcome())
        .await
        .unwrap()
        .expect("one outcome");

    assert_eq!(outcome.peer, PeerAddress::new(Ipv4Addr::new(10, 0, 0, 1), 3998));
    assert_eq!(
        outcome.kind,
        OutcomeKind::Failed {
            cause: DeliveryError::Transport("connection refused".to_string())
        }
    );

    match timeout(WAIT, events.recv()).await.unwrap() {
        Some(ChatEvent::Notice(notice)) => {
            assert_eq!(notice.level(), NoticeLevel::Warning);
            assert!(notice.text().contains("10.0.0.1:3998"));
        }
        other => panic!("expected a warning notice, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// Completion Signal
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_completion_waits_for_every_attempt() {
    let gate = Arc::new(Semaphore::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let delivery = GatedDelivery {
        gate: Arc::clone(&gate),
        completed: Arc::clone(&completed),
    };
    let (broadcaster, _events) = broadcaster(peers(4), delivery);

    let handle = broadcaster.broadcast(&Message::local("wait for me"));
    let observed = Arc::clone(&completed);
    let waiter = tokio::spawn(async move {
        let summary = handle.finished().await;
        (summary, observed.load(Ordering::SeqCst))
    });

    for released in 0..4 {
        tokio::time::sleep(SHORT).await;
        assert!(
            !waiter.is_finished(),
            "completion fired after only {} of 4 attempts",
            released
        );
        gate.add_permits(1);
    }

    let (summary, completed_at_signal) = timeout(WAIT, waiter).await.unwrap().unwrap();
    assert_eq!(completed_at_signal, 4);
    assert_eq!(summary.attempts, 4);
    assert_eq!(summary.delivered, 4);
}

#[tokio::test]
async fn test_broadcast_returns_without_waiting_for_peers() {
    let hanging = (1..=3).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
    let (broadcaster, _events) = broadcaster(peers(3), HangingDelivery { hanging });

    let started = std::time::Instant::now();
    let handle = broadcaster.broadcast(&Message::local("fire and forget"));
    assert!(started.elapsed() < SHORT);

    // Cancelling resolves the hanging attempts as failures.
    handle.cancel();
    let summary = timeout(WAIT, handle.finished()).await.unwrap();
    assert_eq!(summary.failed, 3);
}

// ----------------------------------------------------------------------------
// Independence
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_slow_peer_does_not_block_fast_peers() {
    let slow = Ipv4Addr::new(10, 0, 0, 3);
    let (broadcaster, _events) = broadcaster(peers(5), HangingDelivery { hanging: vec![slow] });

    let mut handle = broadcaster.broadcast(&Message::local("race"));

    for _ in 0..4 {
        let outcome = timeout(WAIT, handle.next_outcome())
            .await
            .expect("fast peers must not wait for the slow one")
            .expect("outcome");
        assert!(outcome.is_delivered());
        assert_ne!(outcome.peer.ip(), slow);
    }

    assert!(
        timeout(SHORT, handle.next_outcome()).await.is_err(),
        "slow peer should still be in flight"
    );

    handle.cancel();
    let last = timeout(WAIT, handle.next_outcome()).await.unwrap().expect("slow outcome");
    assert_eq!(last.peer.ip(), slow);
    assert_eq!(last.kind, OutcomeKind::Failed { cause: DeliveryError::Cancelled });

    let summary = timeout(WAIT, handle.finished()).await.unwrap();
    assert_eq!(
        summary,
        BroadcastSummary {
            attempts: 5,
            delivered: 4,
            failed: 1
        }
    );
}

#[tokio::test]
async fn test_dropped_handle_does_not_stop_broadcast() {
    let gate = Arc::new(Semaphore::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let delivery = GatedDelivery {
        gate: Arc::clone(&gate),
        completed: Arc::clone(&completed),
    };
    let (broadcaster, _events) = broadcaster(peers(3), delivery);

    drop(broadcaster.broadcast(&Message::local("orphan")));
    gate.add_permits(3);

    timeout(WAIT, async {
        while completed.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("attempts should run to completion without a handle");
}
