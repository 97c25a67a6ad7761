#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests: boundary conditions, concurrent access and framing limits

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_util::codec::Framed;
use ua_protocol::address_space::{
    AddressSpace, MethodAttributes, NodeAttributes, NodeClass, VariableAttributes, Variant,
};
use ua_protocol::core::FrameCodec;
use ua_protocol::error::ProtocolError;
use ua_protocol::protocol::dispatcher::Dispatcher;
use ua_protocol::protocol::message::Request;
use ua_protocol::service::SubscriptionTable;
use ua_protocol::transport::{SecureChannel, SessionManager};
use ua_protocol::utils::Metrics;

// ============================================================================
// ADDRESS SPACE
// ============================================================================

#[test]
fn test_failed_operations_leave_space_unchanged() {
    let space = AddressSpace::new();
    space.add_node("N1", NodeAttributes::default()).unwrap();

    assert!(space
        .add_variable("N9", "temp", Variant::Double(1.0), VariableAttributes::default())
        .is_err());
    assert!(space.add_reference("N1", "Organizes", "N9").is_err());
    assert!(space.write_variable("N1", "temp", Variant::Double(1.0)).is_err());

    let node = space.get_node("N1").unwrap();
    assert!(node.variables.is_empty());
    assert!(node.references.is_empty());
    assert_eq!(space.list_nodes().unwrap(), vec!["N1".to_string()]);
}

#[test]
fn test_node_snapshot_is_detached() {
    let space = AddressSpace::new();
    space
        .add_node("Pump", NodeAttributes::default().with_node_class(NodeClass::Object))
        .unwrap();
    space
        .add_variable("Pump", "speed", Variant::UInt16(1200), VariableAttributes::default())
        .unwrap();

    let snapshot = space.get_node("Pump").unwrap();
    space.write_variable("Pump", "speed", Variant::UInt16(0)).unwrap();

    assert_eq!(snapshot.variables["speed"].value, Variant::UInt16(1200));
    assert_eq!(
        space.read_variable("Pump", "speed").unwrap(),
        Variant::UInt16(0)
    );
}

#[test]
fn test_method_error_propagates() {
    let space = AddressSpace::new();
    space.add_node("N1", NodeAttributes::default()).unwrap();
    space
        .add_method(
            "N1",
            "divide",
            |args| match args {
                [Variant::Int32(a), Variant::Int32(b)] if *b != 0 => Ok(Variant::Int32(a / b)),
                _ => Err(ProtocolError::PreconditionViolated("divide by zero".into())),
            },
            MethodAttributes::default(),
        )
        .unwrap();

    assert_eq!(
        space
            .call_method("N1", "divide", &[Variant::Int32(9), Variant::Int32(3)])
            .unwrap(),
        Variant::Int32(3)
    );
    assert!(matches!(
        space.call_method("N1", "divide", &[Variant::Int32(9), Variant::Int32(0)]),
        Err(ProtocolError::PreconditionViolated(_))
    ));
}

#[test]
fn test_concurrent_writers_and_readers() {
    let space = AddressSpace::shared();
    space.add_node("N1", NodeAttributes::default()).unwrap();
    for i in 0..8 {
        space
            .add_variable("N1", &format!("v{i}"), Variant::UInt32(0), VariableAttributes::default())
            .unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let space = space.clone();
            thread::spawn(move || {
                let name = format!("v{i}");
                for n in 1..=500u32 {
                    space.write_variable("N1", &name, Variant::UInt32(n)).unwrap();
                    let _ = space.read_variable("N1", "v0").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        assert_eq!(
            space.read_variable("N1", &format!("v{i}")).unwrap(),
            Variant::UInt32(500)
        );
    }
}

#[test]
fn test_duplicate_node_race_has_single_winner() {
    let space = AddressSpace::shared();
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let space = space.clone();
            let winners = winners.clone();
            thread::spawn(move || {
                if space.add_node("Shared", NodeAttributes::default()).is_ok() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(space.list_nodes().unwrap().len(), 1);
}

#[test]
fn test_write_parses_against_type_in_force() {
    let space = AddressSpace::shared();
    space.add_node("N1", NodeAttributes::default()).unwrap();
    space
        .add_variable("N1", "level", Variant::Int32(0), VariableAttributes::default())
        .unwrap();
    let dispatcher = Dispatcher::new(space.clone(), Arc::new(Metrics::new()));

    let redeclare = {
        let space = space.clone();
        thread::spawn(move || {
            for i in 0..2000 {
                let value = if i % 2 == 0 { Variant::Double(0.0) } else { Variant::Int32(0) };
                space
                    .add_variable("N1", "level", value, VariableAttributes::default())
                    .unwrap();
            }
        })
    };
    let writer = thread::spawn(move || {
        for _ in 0..2000 {
            dispatcher.dispatch(&Request::write("N1/level", "5"));
        }
    });

    // "5" parses as either declared type, so stored and declared types always agree
    while !redeclare.is_finished() || !writer.is_finished() {
        let node = space.get_node("N1").unwrap();
        let variable = &node.variables["level"];
        assert_eq!(variable.value.data_type(), variable.data_type);
    }
    redeclare.join().unwrap();
    writer.join().unwrap();
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

#[test]
fn test_same_key_notifications_arrive_in_order() {
    let table = SubscriptionTable::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    table
        .subscribe("N1/temp", move |v| sink.lock().unwrap().push(v.clone()))
        .unwrap();

    for n in 0..10 {
        table.notify("N1/temp", &Variant::Int32(n)).unwrap();
    }
    let expected: Vec<_> = (0..10).map(Variant::Int32).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

// ============================================================================
// SESSIONS
// ============================================================================

#[tokio::test]
async fn test_expired_session_is_removed_on_validation() {
    let sessions = SessionManager::new(Duration::from_millis(50));
    let token = sessions.create_session("client-1").await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(!sessions.validate_session("client-1", &token).await);
    assert_eq!(sessions.stats().await.total_entries, 0);
}

#[tokio::test]
async fn test_sweeper_purges_without_validation() {
    let metrics = Arc::new(Metrics::new());
    let sessions = SessionManager::new(Duration::from_millis(20)).with_metrics(metrics.clone());
    sessions.create_session("a").await;
    sessions.create_session("b").await;

    let sweeper = sessions.spawn_sweeper(Duration::from_millis(30));
    tokio::time::sleep(Duration::from_millis(150)).await;
    sweeper.abort();

    assert_eq!(sessions.stats().await.total_entries, 0);
    assert_eq!(metrics.snapshot().sessions_expired, 2);
}

#[tokio::test]
async fn test_concurrent_session_creation() {
    let sessions = SessionManager::new(Duration::from_secs(60));
    let mut tasks = Vec::new();
    for i in 0..32 {
        let sessions = sessions.clone();
        tasks.push(tokio::spawn(async move {
            let client = format!("client-{i}");
            let token = sessions.create_session(&client).await;
            sessions.validate_session(&client, &token).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(sessions.stats().await.total_entries, 32);
}

// ============================================================================
// FRAMING
// ============================================================================

#[tokio::test]
async fn test_frames_carry_channel_payloads() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut left = Framed::new(a, FrameCodec::default());
    let mut right = Framed::new(b, FrameCodec::default());

    let channel = SecureChannel::generate().unwrap();
    let peer = channel.peer();

    for message in ["READ N1/temp", "WRITE N1/temp 30.5", "READ N1"] {
        left.send(channel.encode(message.as_bytes()).unwrap()).await.unwrap();
    }
    for expected in ["READ N1/temp", "WRITE N1/temp 30.5", "READ N1"] {
        let frame = right.next().await.unwrap().unwrap();
        assert_eq!(peer.decode(&frame).unwrap(), expected.as_bytes());
    }
}

#[tokio::test]
async fn test_oversized_frame_is_an_error() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut left = Framed::new(a, FrameCodec::new(8 * 1024));
    let mut right = Framed::new(b, FrameCodec::new(1024));

    left.send("A".repeat(4096)).await.unwrap();
    assert!(matches!(
        right.next().await,
        Some(Err(ProtocolError::OversizedPacket(_)))
    ));
}
