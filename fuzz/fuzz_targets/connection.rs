//! Fuzz target for a connection fed arbitrary reads
//!
//! Drives the sans-IO connection with arbitrary chunks before and after
//! authentication. Teardown must be idempotent and report node-down once.

#![no_main]

use arbitrary::Arbitrary;
use beamlink_core::{
    Connection, ConnectionError, ConnectionId, Cookie, DistConfig, Effect, Framer, NodeId,
};
use beamlink_crypto::gen_digest;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
struct Input {
    authenticate: bool,
    chunks: Vec<Vec<u8>>,
}

fn frame(payload: &[u8]) -> Vec<u8> {
    Framer::new().frame(payload).unwrap().to_vec()
}

fuzz_target!(|input: Input| {
    let config = DistConfig::new(
        "fuzz@localhost".parse().unwrap(),
        Cookie::new("fuzz-cookie").unwrap(),
    );
    let own_challenge = config.own_challenge;
    let node: NodeId = "peer@localhost".parse().unwrap();
    let mut conn = Connection::new(node, ConnectionId(1), Arc::new(config));
    let mut effects = conn.on_connected();

    if input.authenticate {
        effects.extend(conn.on_data(&frame(b"sok")));
        let mut challenge = vec![b'N'];
        challenge.extend_from_slice(&[0u8; 8]);
        challenge.extend_from_slice(&1u32.to_be_bytes());
        challenge.extend_from_slice(&1u32.to_be_bytes());
        challenge.extend_from_slice(b"peer@localhost");
        effects.extend(conn.on_data(&frame(&challenge)));
        let mut ack = vec![b'a'];
        ack.extend_from_slice(&gen_digest(b"fuzz-cookie", own_challenge));
        effects.extend(conn.on_data(&frame(&ack)));
        assert!(conn.is_alive());
    }

    for chunk in &input.chunks {
        effects.extend(conn.on_data(chunk));
    }
    effects.extend(conn.on_closed());
    effects.extend(conn.disconnect(ConnectionError::TransportClosed));

    let downs = effects
        .iter()
        .filter(|e| matches!(e, Effect::NodeDown { .. }))
        .count();
    assert_eq!(downs, 1);
});
