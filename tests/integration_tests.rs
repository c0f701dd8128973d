//! End-to-end tests: a real `Node` against a scripted peer over in-memory
//! pipes.

use beamlink_core::node::{ChannelDelivery, LocalEvent, NodeEvent, wait_for_event};
use beamlink_core::{
    ConnectionError, ControlMessage, DISTRIBUTION_VERSION, DistributionFlags, Recipient, term,
};
use beamlink_integration_tests::{
    CLIENT, COOKIE, PEER_FLAGS, STEP, ScriptedPeer, TestClient, client_config, remote_pid, server,
};
use eetf::Atom;
use std::time::Duration;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_and_send() {
    let mut client = TestClient::start();
    let from = client.node.make_pid();
    client
        .node
        .send(remote_pid(7), term::atom("hello"))
        .unwrap();

    let mut peer = client.accept().await;
    let hello = peer.handshake().await;
    assert_eq!(hello.name, CLIENT);
    assert_eq!(hello.version, DISTRIBUTION_VERSION);
    assert_eq!(hello.flags, DistributionFlags::CLIENT_DEFAULT);

    match client.next_event().await {
        NodeEvent::Up { node, peer } => {
            assert_eq!(node, server());
            assert_eq!(peer.name, "server@localhost");
            assert_eq!(peer.creation, 3);
            assert!(peer.flags.contains(DistributionFlags::BIG_CREATION));
        }
        other => panic!("expected node up, got {other:?}"),
    }

    assert_eq!(
        peer.recv_control().await,
        ControlMessage::Send {
            to: remote_pid(7),
            message: term::atom("hello"),
        }
    );

    peer.send_control(&ControlMessage::Send {
        to: from.clone(),
        message: term::int(42),
    })
    .await;
    assert_eq!(
        client.next_local().await,
        LocalEvent::Message {
            to: Recipient::Pid(from),
            message: term::int(42),
        }
    );
}

#[tokio::test]
async fn test_bad_cookie_reports_single_node_down() {
    let mut client = TestClient::start();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();

    let mut peer = client.accept().await.with_cookie("some-other-cookie");
    peer.read_name(b"sok").await;
    let (_, ok) = peer.challenge().await;
    assert!(!ok);
    peer.close().await;

    match client.next_event().await {
        NodeEvent::Down { node, reason } => {
            assert_eq!(node, server());
            assert!(reason.is_authentication(), "unexpected reason {reason}");
        }
        other => panic!("expected node down, got {other:?}"),
    }
    let again = wait_for_event(&mut client.events, Duration::from_millis(200), |_| true).await;
    assert!(again.is_none(), "second event {again:?}");
}

#[tokio::test]
async fn test_bad_ack_digest_is_authentication_failure() {
    let mut client = TestClient::start();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();

    let mut peer = client.accept().await;
    peer.read_name(b"sok").await;
    let (client_challenge, ok) = peer.challenge().await;
    assert!(ok);
    peer.ack(client_challenge.wrapping_add(1)).await;

    match client.next_event().await {
        NodeEvent::Down { reason, .. } => assert!(reason.is_authentication()),
        other => panic!("expected node down, got {other:?}"),
    }
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_refused_status_closes() {
    let mut client = TestClient::start();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();

    let mut peer = client.accept().await;
    peer.read_name(b"nok").await;

    match client.next_event().await {
        NodeEvent::Down { reason, .. } => {
            assert!(matches!(reason, ConnectionError::ProtocolViolation(_)));
        }
        other => panic!("expected node down, got {other:?}"),
    }
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_handshake_timeout() {
    let config = client_config(COOKIE).with_handshake_timeout(Some(Duration::from_millis(100)));
    let mut client = TestClient::start_with(config, ChannelDelivery::new());
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();

    let mut peer = client.accept().await;
    peer.read_handshake().await;

    match client.next_event().await {
        NodeEvent::Down { reason, .. } => assert_eq!(reason, ConnectionError::HandshakeTimeout),
        other => panic!("expected node down, got {other:?}"),
    }
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_refused_connect_then_reconnect() {
    let mut client = TestClient::start();
    client.connector.set_refuse(true);
    client.node.send(remote_pid(1), term::atom("lost")).unwrap();

    match client.next_event().await {
        NodeEvent::Down { node, reason } => {
            assert_eq!(node, server());
            assert_eq!(reason, ConnectionError::TransportClosed);
        }
        other => panic!("expected node down, got {other:?}"),
    }

    client.connector.set_refuse(false);
    client.node.send(remote_pid(1), term::atom("found")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::Send {
            to: remote_pid(1),
            message: term::atom("found"),
        }
    );
}

// ============================================================================
// Live traffic
// ============================================================================

#[tokio::test]
async fn test_queued_operations_flush_in_order() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.send(remote_pid(1), term::int(1)).unwrap();
    client.node.link(local.clone(), remote_pid(2)).unwrap();
    client
        .node
        .reg_send(server(), local.clone(), Atom::from("logger"), term::int(3))
        .unwrap();

    let mut peer = client.accept().await;
    peer.handshake().await;

    assert_eq!(
        peer.recv_control().await,
        ControlMessage::Send {
            to: remote_pid(1),
            message: term::int(1),
        }
    );
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::Link {
            from: local.clone(),
            to: remote_pid(2),
        }
    );
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::RegSend {
            from: local,
            name: Atom::from("logger"),
            message: term::int(3),
        }
    );
}

#[tokio::test]
async fn test_tick_is_echoed() {
    let mut client = TestClient::start();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;

    peer.write_raw(&[0, 0, 0, 0]).await;
    assert_eq!(peer.read_raw(4).await, vec![0, 0, 0, 0]);
}

#[tokio::test]
async fn test_unregistered_name_is_dropped() {
    let config = client_config(COOKIE);
    let mut client = TestClient::start_with(config, ChannelDelivery::with_names(["logger"]));
    let local = client.node.make_pid();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;

    peer.send_control(&ControlMessage::RegSend {
        from: remote_pid(1),
        name: Atom::from("nobody"),
        message: term::int(1),
    })
    .await;
    peer.send_control(&ControlMessage::RegSend {
        from: remote_pid(1),
        name: Atom::from("logger"),
        message: term::int(2),
    })
    .await;
    peer.send_control(&ControlMessage::Send {
        to: local.clone(),
        message: term::int(3),
    })
    .await;

    assert_eq!(
        client.next_local().await,
        LocalEvent::Message {
            to: Recipient::Name(Atom::from("logger")),
            message: term::int(2),
        }
    );
    assert_eq!(
        client.next_local().await,
        LocalEvent::Message {
            to: Recipient::Pid(local),
            message: term::int(3),
        }
    );

    // connection stays up
    let down = wait_for_event(&mut client.events, Duration::from_millis(200), |e| {
        matches!(e, NodeEvent::Down { .. })
    })
    .await;
    assert!(down.is_none());
}

#[tokio::test]
async fn test_malformed_control_tears_down() {
    let mut client = TestClient::start();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;
    assert!(matches!(client.next_event().await, NodeEvent::Up { .. }));

    // pass-through marker followed by garbage
    peer.write_raw(&[0, 0, 0, 3, b'p', 0xff, 0xff]).await;

    match client.next_event().await {
        NodeEvent::Down { reason, .. } => {
            assert!(matches!(reason, ConnectionError::MalformedControlTuple(_)));
        }
        other => panic!("expected node down, got {other:?}"),
    }
    peer.expect_closed().await;
}

// ============================================================================
// Links and exits
// ============================================================================

#[tokio::test]
async fn test_inbound_link_exit_and_unlink() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;

    peer.send_control(&ControlMessage::Link {
        from: remote_pid(9),
        to: local.clone(),
    })
    .await;
    assert_eq!(
        client.next_local().await,
        LocalEvent::Linked {
            local: local.clone(),
            remote: remote_pid(9),
        }
    );

    peer.send_control(&ControlMessage::Unlink {
        from: remote_pid(9),
        to: local.clone(),
    })
    .await;
    assert_eq!(
        client.next_local().await,
        LocalEvent::Unlinked {
            local: local.clone(),
            remote: remote_pid(9),
        }
    );

    peer.send_control(&ControlMessage::Exit2 {
        from: remote_pid(9),
        to: local.clone(),
        reason: term::atom("kill"),
    })
    .await;
    assert_eq!(
        client.next_local().await,
        LocalEvent::Exit {
            to: local,
            from: remote_pid(9),
            reason: term::atom("kill"),
        }
    );
}

#[tokio::test]
async fn test_connection_loss_breaks_links() {
    let mut client = TestClient::start();
    let a = client.node.make_pid();
    let b = client.node.make_pid();
    client.node.link(a.clone(), remote_pid(1)).unwrap();

    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;

    peer.send_control(&ControlMessage::Link {
        from: remote_pid(2),
        to: b.clone(),
    })
    .await;
    assert!(matches!(
        client.next_local().await,
        LocalEvent::Linked { .. }
    ));
    assert!(matches!(client.next_event().await, NodeEvent::Up { .. }));

    peer.close().await;

    let mut exits = vec![client.next_local().await, client.next_local().await];
    exits.sort_by_key(|e| format!("{e:?}"));
    let mut expected = vec![
        LocalEvent::Exit {
            to: a,
            from: remote_pid(1),
            reason: term::atom("noconnection"),
        },
        LocalEvent::Exit {
            to: b,
            from: remote_pid(2),
            reason: term::atom("noconnection"),
        },
    ];
    expected.sort_by_key(|e| format!("{e:?}"));
    assert_eq!(exits, expected);

    match client.next_event().await {
        NodeEvent::Down { reason, .. } => assert_eq!(reason, ConnectionError::TransportClosed),
        other => panic!("expected node down, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unlink_uses_id_when_peer_supports_it() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.link(local.clone(), remote_pid(1)).unwrap();
    client.node.unlink(local.clone(), remote_pid(1)).unwrap();
    client.node.unlink(local.clone(), remote_pid(1)).unwrap();

    let mut peer = client
        .accept()
        .await
        .with_flags(PEER_FLAGS | DistributionFlags::UNLINK_ID);
    peer.handshake().await;

    assert!(matches!(
        peer.recv_control().await,
        ControlMessage::Link { .. }
    ));
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::UnlinkId {
            id: term::int(1),
            from: local.clone(),
            to: remote_pid(1),
        }
    );
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::UnlinkId {
            id: term::int(2),
            from: local.clone(),
            to: remote_pid(1),
        }
    );

    // ack is consumed without a local event
    peer.send_control(&ControlMessage::UnlinkIdAck {
        id: term::int(1),
        from: remote_pid(1),
        to: local.clone(),
    })
    .await;
    peer.send_control(&ControlMessage::Send {
        to: local.clone(),
        message: term::atom("after"),
    })
    .await;
    assert_eq!(
        client.next_local().await,
        LocalEvent::Message {
            to: Recipient::Pid(local),
            message: term::atom("after"),
        }
    );
}

#[tokio::test]
async fn test_inbound_unlink_id_is_acked() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.link(local.clone(), remote_pid(4)).unwrap();
    let mut peer = client
        .accept()
        .await
        .with_flags(PEER_FLAGS | DistributionFlags::UNLINK_ID);
    peer.handshake().await;
    peer.recv_control().await;

    peer.send_control(&ControlMessage::UnlinkId {
        id: term::int(77),
        from: remote_pid(4),
        to: local.clone(),
    })
    .await;

    assert_eq!(
        peer.recv_control().await,
        ControlMessage::UnlinkIdAck {
            id: term::int(77),
            from: local.clone(),
            to: remote_pid(4),
        }
    );
    assert_eq!(
        client.next_local().await,
        LocalEvent::Unlinked {
            local,
            remote: remote_pid(4),
        }
    );
}

#[tokio::test]
async fn test_legacy_unlink_without_flag() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.send(remote_pid(1), term::atom("hi")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    peer.recv_control().await;
    assert!(matches!(client.next_event().await, NodeEvent::Up { .. }));

    client.node.unlink(local.clone(), remote_pid(1)).unwrap();
    assert_eq!(
        peer.recv_control().await,
        ControlMessage::Unlink {
            from: local,
            to: remote_pid(1),
        }
    );
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_flushes_and_closes() {
    let mut client = TestClient::start();
    let local = client.node.make_pid();
    client.node.send(remote_pid(1), term::atom("first")).unwrap();
    let mut peer = client.accept().await;
    peer.handshake().await;
    assert!(matches!(client.next_event().await, NodeEvent::Up { .. }));

    client
        .node
        .exit2(local, remote_pid(1), term::atom("shutdown"))
        .unwrap();
    tokio::time::timeout(STEP, client.node.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();

    assert!(matches!(
        peer.recv_control().await,
        ControlMessage::Send { .. }
    ));
    assert!(matches!(
        peer.recv_control().await,
        ControlMessage::Exit2 { .. }
    ));
    peer.expect_closed().await;

    assert!(client.node.send(remote_pid(1), term::atom("late")).is_err());
}

#[tokio::test]
async fn test_invalid_pid_node_rejected() {
    let client = TestClient::start();
    let bad = eetf::Pid::new("not-a-node", 1, 0, 0);
    assert!(client.node.send(bad, term::atom("x")).is_err());
}
