//! Integration tests for star and gossip dissemination.
//!
//! The gossip simulations drive a [`Room`] directly with a seeded RNG so
//! fan-out choices are reproducible; the registry tests go through the
//! per-room tasks with `#[tokio::test]`.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::time::Duration;

use converge_relay::{
    ClientMessage, GossipObserver, JoinRequest, RelayConfig, Room, RoomConnection, RoomRegistry,
    ServerMessage, SessionId, Topology, now_ms,
};
use converge_types::Value;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;

// =============================================================================
// Gossip simulation
// =============================================================================

struct Node {
    session: SessionId,
    observer: GossipObserver,
    inbox: UnboundedReceiver<ServerMessage>,
}

fn gossip_room(observers: usize, fanout: usize, seed: u64) -> (Room, Vec<Node>) {
    let config = RelayConfig {
        fanout,
        ..RelayConfig::default()
    };
    let mut room = Room::new(
        "sim",
        Topology::Gossip,
        vec!["state".to_owned()],
        &config,
        SmallRng::seed_from_u64(seed),
    );
    let nodes = (0..observers)
        .map(|i| {
            let (tx, inbox) = mpsc::unbounded_channel();
            let session = SessionId::new_v4();
            let peer = format!("peer-{i}");
            room.join(session, peer.clone(), tx);
            Node {
                session,
                observer: GossipObserver::new(peer),
                inbox,
            }
        })
        .collect();
    (room, nodes)
}

/// Deliver queued messages until the room goes quiet; returns rounds taken.
fn settle(room: &mut Room, nodes: &mut [Node]) -> usize {
    let mut rounds = 0;
    loop {
        let mut replies = Vec::new();
        let mut delivered = 0;
        for node in nodes.iter_mut() {
            while let Ok(message) = node.inbox.try_recv() {
                delivered += 1;
                if let Some(reply) = node.observer.handle(message) {
                    replies.push((node.session, reply));
                }
            }
        }
        if delivered == 0 {
            return rounds;
        }
        for (session, reply) in replies {
            room.handle(session, reply, Instant::now());
        }
        rounds += 1;
        assert!(rounds < 100, "gossip did not settle");
    }
}

#[test]
fn gossip_reaches_every_observer() {
    let (mut room, mut nodes) = gossip_room(6, 2, 42);
    settle(&mut room, &mut nodes);

    let write = nodes[0].observer.set("state", "cursor", Value::Int(7), 100);
    room.handle(nodes[0].session, write, Instant::now());
    settle(&mut room, &mut nodes);

    for node in &nodes {
        assert_eq!(
            node.observer.get("state", "cursor"),
            Some(&Value::Int(7)),
            "{} did not converge",
            node.observer.peer_id()
        );
    }
}

#[test]
fn concurrent_gossip_writes_converge_to_latest() {
    for seed in [1, 2, 3] {
        let (mut room, mut nodes) = gossip_room(6, 2, seed);
        settle(&mut room, &mut nodes);

        let early = nodes[1].observer.set("state", "cursor", Value::from("early"), 10);
        let late = nodes[4].observer.set("state", "cursor", Value::from("late"), 20);
        room.handle(nodes[1].session, early, Instant::now());
        room.handle(nodes[4].session, late, Instant::now());
        settle(&mut room, &mut nodes);

        for node in &nodes {
            assert_eq!(
                node.observer.get("state", "cursor"),
                Some(&Value::from("late"))
            );
        }
        assert_eq!(room.store().get("state", "cursor").unwrap().peer, "peer-4");
    }
}

#[test]
fn equal_timestamps_resolve_to_higher_peer_everywhere() {
    let (mut room, mut nodes) = gossip_room(4, 2, 9);
    settle(&mut room, &mut nodes);

    let from_b = nodes[1].observer.set("state", "k", Value::from("B"), 5);
    let from_a = nodes[0].observer.set("state", "k", Value::from("A"), 5);
    room.handle(nodes[1].session, from_b, Instant::now());
    room.handle(nodes[0].session, from_a, Instant::now());
    settle(&mut room, &mut nodes);

    for node in &nodes {
        assert_eq!(node.observer.get("state", "k"), Some(&Value::from("B")));
    }
}

#[test]
fn relay_echo_does_not_loop() {
    let (mut room, mut nodes) = gossip_room(3, 1, 5);
    settle(&mut room, &mut nodes);

    let write = nodes[2].observer.set("state", "k", Value::Int(1), 1);
    room.handle(nodes[2].session, write, Instant::now());
    let rounds = settle(&mut room, &mut nodes);

    assert!(rounds <= 3, "took {rounds} rounds");
    assert!(
        nodes
            .iter()
            .all(|node| node.observer.get("state", "k") == Some(&Value::Int(1)))
    );
}

// =============================================================================
// Registry
// =============================================================================

async fn next(connection: &mut RoomConnection) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), connection.recv())
        .await
        .expect("timed out waiting for room message")
        .expect("room closed")
}

async fn join(registry: &RoomRegistry, room: &str, peer: &str, mode: Topology) -> RoomConnection {
    registry
        .join(JoinRequest {
            room: Some(room.to_owned()),
            peer_id: Some(peer.to_owned()),
            mode: Some(mode),
            namespaces: None,
        })
        .await
        .unwrap()
}

async fn wait_for_teardown(registry: &RoomRegistry) {
    for _ in 0..200 {
        if registry.room_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("room was not torn down");
}

#[tokio::test]
async fn star_room_lifecycle() {
    let registry = RoomRegistry::new(RelayConfig::default());

    let mut alice = join(&registry, "doc", "alice", Topology::Star).await;
    assert!(matches!(next(&mut alice).await, ServerMessage::Welcome { .. }));
    assert!(matches!(next(&mut alice).await, ServerMessage::Snapshot { .. }));

    let mut bob = join(&registry, "doc", "bob", Topology::Gossip).await;
    assert_eq!(bob.meta().mode, Topology::Star);
    let mut peers = bob.meta().peers.clone();
    peers.sort();
    assert_eq!(peers, vec!["alice", "bob"]);
    next(&mut bob).await;
    next(&mut bob).await;
    assert_eq!(
        next(&mut alice).await,
        ServerMessage::PeerJoined {
            peer_id: "bob".to_owned()
        }
    );

    let mut view = GossipObserver::new(alice.peer_id());
    assert!(alice.send(view.set("state", "cursor", Value::Int(3), now_ms())));
    let ServerMessage::Diff { entries } = next(&mut bob).await else {
        panic!("expected diff");
    };
    assert_eq!(entries["state"]["cursor"].val, Value::Int(3));

    assert!(bob.send(ClientMessage::Ping { t: 7 }));
    assert_eq!(next(&mut bob).await, ServerMessage::Pong { t: 7 });

    let mut carol = join(&registry, "doc", "carol", Topology::Star).await;
    next(&mut carol).await;
    let ServerMessage::Snapshot { entries, .. } = next(&mut carol).await else {
        panic!("expected snapshot");
    };
    assert_eq!(entries["state"]["cursor"].val, Value::Int(3));
    drop(carol);

    drop(bob);
    assert!(matches!(next(&mut alice).await, ServerMessage::PeerJoined { .. }));
    assert!(matches!(next(&mut alice).await, ServerMessage::PeerLeft { .. }));
    assert_eq!(
        next(&mut alice).await,
        ServerMessage::PeerLeft {
            peer_id: "bob".to_owned()
        }
    );
    assert_eq!(registry.room_count().await, 1);

    drop(alice);
    wait_for_teardown(&registry).await;
}

#[tokio::test]
async fn room_is_recreated_fresh_after_teardown() {
    let registry = RoomRegistry::new(RelayConfig::default());

    let first = join(&registry, "x", "a", Topology::Gossip).await;
    assert_eq!(first.meta().mode, Topology::Gossip);
    let mut view = GossipObserver::new("a");
    assert!(first.send(view.set("state", "k", Value::Int(1), 1)));
    drop(first);
    wait_for_teardown(&registry).await;

    let mut second = join(&registry, "x", "b", Topology::Star).await;
    assert_eq!(second.meta().mode, Topology::Star);
    next(&mut second).await;
    let ServerMessage::Snapshot { entries, .. } = next(&mut second).await else {
        panic!("expected snapshot");
    };
    assert!(entries.is_empty());
}

#[tokio::test]
async fn gossip_room_forwards_with_message_id() {
    let registry = RoomRegistry::new(RelayConfig::default());
    let mut a = join(&registry, "g", "a", Topology::Gossip).await;
    let mut b = join(&registry, "g", "b", Topology::Gossip).await;
    let mut c = join(&registry, "g", "c", Topology::Gossip).await;
    for _ in 0..4 {
        next(&mut a).await;
    }
    for _ in 0..3 {
        next(&mut b).await;
    }
    for _ in 0..2 {
        next(&mut c).await;
    }

    let mut writer = GossipObserver::new("a");
    assert!(a.send(writer.set("state", "k", Value::from("hi"), now_ms())));

    for connection in [&mut b, &mut c] {
        let mut view = GossipObserver::new(connection.peer_id());
        let message = next(connection).await;
        assert!(matches!(message, ServerMessage::GossipDiff { .. }));
        let relay = view.handle(message).expect("gossip_diff must be relayed");
        assert!(matches!(relay, ClientMessage::GossipRelay { msg_id: Some(_), .. }));
        assert!(connection.send(relay));
        assert_eq!(view.get("state", "k"), Some(&Value::from("hi")));
    }
}

#[tokio::test]
async fn unnamed_room_and_peer_get_defaults() {
    let registry = RoomRegistry::new(RelayConfig::default());
    let connection = registry.join(JoinRequest::default()).await.unwrap();
    assert_eq!(connection.meta().room, "main");
    assert_eq!(connection.meta().namespaces, vec!["state"]);
    assert!(connection.peer_id().starts_with("anon-"));
}
