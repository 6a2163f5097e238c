//! Integration tests for the connection lifecycle
//!
//! Exercises the controller against the scripted transport: the
//! one-connection-per-identity invariant, identity switches, frame
//! classification end to end and subscriber isolation.

mod common;

use common::*;
use notify_stream::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_rapid_connects_open_once() {
    verbose_println!("Testing rapid connect calls...");

    let transport = MockTransport::with_open_delay(Duration::from_millis(200));
    let client = mock_client(&transport, test_config());

    let pending: Vec<_> = (0..10).map(|_| client.connect("u1")).collect();
    assert_eq!(client.state(), ConnectionState::Connecting);

    for result in futures::future::join_all(pending).await {
        result.unwrap();
    }

    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.max_active(), 1);
    assert!(client.is_connected());

    // Connecting again while open has no side effects
    client.connect("u1").await.unwrap();
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_disconnect_storm_keeps_one_connection() {
    let transport = MockTransport::with_open_delay(Duration::from_millis(50));
    let client = mock_client(&transport, test_config());

    for round in 0..20 {
        let identity = if round % 3 == 0 { "u1" } else { "u2" };
        let _ = client.connect(identity);
        if round % 2 == 0 {
            client.disconnect();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(transport.active() <= 1, "round {}: {} live connections", round, transport.active());
    }

    client.connect("u1").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    verbose_println!("  Opens: {}", transport.open_count());
    assert_eq!(transport.max_active(), 1);
    assert_eq!(transport.active(), 1);
    assert_eq!(client.identity(), Some(Identity::from("u1")));
}

#[tokio::test(start_paused = true)]
async fn test_identity_switch_replaces_connection() {
    let transport = MockTransport::new();
    let client = mock_client(&transport, test_config());
    let rx = client.subscribe_channel();

    client.connect("alice").await.unwrap();
    client.connect("bob").await.unwrap();

    assert_eq!(transport.opened_identities(), vec!["alice", "bob"]);
    assert_eq!(transport.max_active(), 1);
    assert_eq!(transport.closed_count(), 1);
    assert_eq!(client.identity(), Some(Identity::from("bob")));

    let events = drain(&rx);
    assert_eq!(
        kinds(&events),
        vec!["ConnectionEstablished", "ConnectionClosed", "ConnectionEstablished"]
    );
    assert_eq!(
        events[1],
        ClassifiedEvent::ConnectionClosed {
            identity: Identity::from("alice"),
            reason: DisconnectReason::IdentityChanged,
            retry_in: None,
        }
    );

    // The registry survives the switch
    assert_eq!(client.registry().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalives_never_reach_subscribers() {
    let transport = MockTransport::new();
    let mut steps = vec![frame("INIT", "Connection established for user: u1")];
    for _ in 0..25 {
        steps.push(frame("KEEPALIVE", "KEEPALIVE_HEARTBEAT"));
        steps.push(frame("message", "KEEPALIVE_HEARTBEAT"));
    }
    steps.push(notification("n1"));
    transport.push(Script::Open(steps));

    let client = mock_client(&transport, test_config());
    let rx = client.subscribe_channel();
    client.connect("u1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = drain(&rx);
    assert_eq!(kinds(&events), vec!["ConnectionEstablished", "NotificationReceived"]);
    assert_eq!(client.metrics().frames_received, 52);
    assert_eq!(client.metrics().notifications_published, 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_keep_connection_open() {
    let transport = MockTransport::new();
    transport.push(Script::Open(vec![
        frame("message", "{not json"),
        frame("message", "   "),
        frame("message", r#"{"content":"no id"}"#),
        notification("n2"),
    ]));

    let client = mock_client(&transport, test_config());
    let rx = client.subscribe_channel();
    client.connect("u1").await.unwrap();

    let record = recv_notification(&rx, Duration::from_secs(1)).await.unwrap();
    assert_eq!(record.id.as_str(), "n2");
    assert!(client.is_connected());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.metrics().frames_dropped, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failing_subscriber_is_isolated() {
    let transport = MockTransport::new();
    transport.push(Script::Open(vec![notification("n1"), notification("n2")]));

    let client = mock_client(&transport, test_config());
    let _panicky = client.subscribe(|event| {
        if event.as_notification().is_some() {
            panic!("consumer bug");
        }
        Ok(())
    });
    let _erroring = client.subscribe(|_| Err(NotifyError::ProtocolError("consumer error".into())));

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let _healthy = client.subscribe(move |event| {
        if event.as_notification().is_some() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    client.connect("u1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(received.load(Ordering::SeqCst), 2);
    assert!(client.is_connected());
    assert_eq!(client.registry().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribing_last_subscriber_keeps_connection() {
    let transport = MockTransport::new();
    let client = mock_client(&transport, test_config());

    let mut subscription = client.subscribe(|_| Ok(()));
    client.connect("u1").await.unwrap();

    assert!(subscription.unsubscribe());
    assert!(client.registry().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.is_connected());
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting_cancels_connect() {
    let transport = MockTransport::with_open_delay(Duration::from_secs(1));
    let client = mock_client(&transport, test_config());
    let rx = client.subscribe_channel();

    let pending = client.connect("u1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.active(), 1);

    client.disconnect();
    assert!(matches!(pending.await, Err(NotifyError::Cancelled(_))));
    assert_eq!(transport.active(), 0);
    assert_eq!(client.identity(), None);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(kinds(&drain(&rx)), vec!["ConnectionClosed"]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let transport = MockTransport::new();
    let client = mock_client(&transport, test_config());
    let rx = client.subscribe_channel();

    client.disconnect();
    client.connect("u1").await.unwrap();
    client.disconnect();
    client.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.state(), ConnectionState::ClosedTerminal);
    assert_eq!(transport.active(), 0);
    assert_eq!(kinds(&drain(&rx)), vec!["ConnectionEstablished", "ConnectionClosed"]);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_may_disconnect_from_callback() {
    let transport = MockTransport::new();
    transport.push(Script::Open(vec![notification("n1"), notification("n2")]));

    let client = Arc::new(mock_client(&transport, test_config()));
    let seen = Arc::new(AtomicUsize::new(0));

    let weak = Arc::downgrade(&client);
    let counter = Arc::clone(&seen);
    let _sub = client.subscribe(move |event| {
        if event.as_notification().is_some() {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(client) = weak.upgrade() {
                client.disconnect();
            }
        }
        Ok(())
    });

    client.connect("u1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::ClosedTerminal);
    assert_eq!(transport.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_closes_connection() {
    let transport = MockTransport::new();
    let client = mock_client(&transport, test_config());
    client.connect("u1").await.unwrap();
    assert_eq!(transport.active(), 1);

    drop(client);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_inbox_consumer_end_to_end() {
    let transport = MockTransport::new();
    transport.push(Script::Open(vec![
        notification("n1"),
        notification("n1"),
        frame("KEEPALIVE", ""),
        notification("n2"),
    ]));

    let client = mock_client(&transport, test_config());
    let bell = InboxConsumer::attach_to(&client, "bell", NotificationInbox::single(10), None);

    client.connect("u1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(bell.realtime_available());
    assert_eq!(bell.unread_count(), 2);
    let ids: Vec<String> = bell.items("all").iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["n2", "n1"]);

    bell.inbox().lock().mark_read([&NotificationId::from("n1")]);
    assert_eq!(bell.unread_count(), 1);
}
