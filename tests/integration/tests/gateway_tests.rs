//! Gateway Integration Tests
//!
//! Each test starts its own listener on an ephemeral port; no external
//! services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use gwsim_gateway::frame::FrameOpcode;
use gwsim_gateway::handshake::accept_key;
use integration_tests::{masked_frame, test_config, ServerEvent, TestServer, SAMPLE_KEY};
use serde_json::{json, Value};

const JSON_QUERY: &str = "v=10&encoding=json";

fn identify(shard: [u32; 2]) -> Value {
    json!({
        "op": 2,
        "d": {
            "token": "Bot integration",
            "intents": 513,
            "shard": shard,
            "properties": {"os": "linux", "browser": "it", "device": "it"}
        }
    })
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[test]
fn test_upgrade_returns_accept_key() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.open().unwrap();

    let response = client.upgrade(JSON_QUERY).unwrap();

    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains(&format!("Sec-WebSocket-Accept: {}\r\n", accept_key(SAMPLE_KEY))));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
}

#[test]
fn test_non_upgrade_request_gets_400() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.open().unwrap();

    client.send_raw(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let response = client.read_http_response().unwrap();

    assert!(response.starts_with("HTTP/1.1 400"));
    client.expect_eof().unwrap();
}

#[test]
fn test_invalid_api_version_closes_with_4012() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect("v=9&encoding=json").unwrap();

    assert_eq!(client.expect_close().unwrap(), 4012);
    client.expect_eof().unwrap();
}

#[test]
fn test_unknown_encoding_closes_with_4002() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect("v=10&encoding=xml").unwrap();

    assert_eq!(client.expect_close().unwrap(), 4002);
}

// ============================================================================
// Session Tests
// ============================================================================

#[test]
fn test_hello_ready_and_guild_stream() {
    let server = TestServer::start_tls(test_config(4)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();

    let hello = client.next_message().unwrap();
    assert_eq!(hello["op"], 10);
    assert_eq!(hello["d"]["heartbeat_interval"], 41_250);
    assert_eq!(hello["s"], Value::Null);
    assert_eq!(hello["t"], Value::Null);

    client.send_json(&identify([0, 1])).unwrap();

    let ready = client.next_message().unwrap();
    assert_eq!(ready["op"], 0);
    assert_eq!(ready["t"], "READY");
    assert_eq!(ready["s"], 1);
    assert_eq!(ready["d"]["v"], 10);
    assert_eq!(ready["d"]["shard"], json!([0, 1]));
    assert_eq!(ready["d"]["user"]["bot"], true);
    assert!(ready["d"]["resume_gateway_url"]
        .as_str()
        .unwrap()
        .starts_with("wss://"));
    assert_eq!(ready["d"]["session_id"].as_str().unwrap().len(), 36);

    let announced: Vec<Value> = ready["d"]["guilds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].clone())
        .collect();
    assert_eq!(announced.len(), 4);

    let mut last_seq = 1;
    for id in &announced {
        let guild = client.next_message().unwrap();
        assert_eq!(guild["t"], "GUILD_CREATE");
        let seq = guild["s"].as_u64().unwrap();
        assert_eq!(seq, last_seq + 1);
        last_seq = seq;

        assert_eq!(&guild["d"]["id"], id);
        assert!(!guild["d"]["roles"].as_array().unwrap().is_empty());
        assert!(!guild["d"]["members"].as_array().unwrap().is_empty());
    }

    // Quota reached: nothing unsolicited follows
    assert_eq!(client.poll_event(Duration::from_millis(300)).unwrap(), None);
}

#[test]
fn test_heartbeat_ack_carries_last_sequence() {
    let server = TestServer::start_tls(test_config(2)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client.send_json(&json!({"op": 1, "d": null})).unwrap();
    let ack = client.next_message().unwrap();
    assert_eq!(ack["op"], 11);
    assert_eq!(ack["s"], 0);

    client.send_json(&identify([0, 1])).unwrap();
    for _ in 0..3 {
        client.next_message().unwrap();
    }

    client.send_json(&json!({"op": 1, "d": 3})).unwrap();
    let ack = client.next_message().unwrap();
    assert_eq!(ack["op"], 11);
    assert_eq!(ack["s"], 3);
}

#[test]
fn test_etf_session() {
    let server = TestServer::start_tls(test_config(1)).expect("Failed to start server");
    let mut client = server.connect("v=10&encoding=etf").unwrap();

    let (opcode, _) = client.next_frame().unwrap();
    assert_eq!(opcode, FrameOpcode::Binary);

    client.send_etf(&identify([0, 1])).unwrap();

    let ready = client.next_message().unwrap();
    assert_eq!(ready["t"], "READY");
    assert_eq!(ready["s"], 1);

    let guild = client.next_message().unwrap();
    assert_eq!(guild["t"], "GUILD_CREATE");
    assert_eq!(guild["s"], 2);
    assert_eq!(guild["d"]["id"], ready["d"]["guilds"][0]["id"]);
}

#[test]
fn test_fragmented_identify_is_reassembled() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    let payload = serde_json::to_vec(&identify([0, 1])).unwrap();
    let (head, tail) = payload.split_at(payload.len() / 2);
    client.send_raw(&masked_frame(FrameOpcode::Text, head, false)).unwrap();
    client.send_raw(&masked_frame(FrameOpcode::Ping, b"", true)).unwrap();
    client.send_raw(&masked_frame(FrameOpcode::Continuation, tail, true)).unwrap();

    assert_eq!(client.next_message().unwrap()["t"], "READY");
}

#[test]
fn test_shard_receives_its_share_of_guilds() {
    let mut config = test_config(10);
    config.agents.shard_count = 3;
    let server = TestServer::start_tls(config).expect("Failed to start server");

    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();
    client.send_json(&identify([1, 3])).unwrap();

    let ready = client.next_message().unwrap();
    assert_eq!(ready["d"]["shard"], json!([1, 3]));
    assert_eq!(ready["d"]["guilds"].as_array().unwrap().len(), 3);
}

#[test]
fn test_identify_without_shard_uses_configured_count() {
    let mut config = test_config(6);
    config.agents.shard_count = 2;
    let server = TestServer::start_tls(config).expect("Failed to start server");

    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();
    client.send_json(&json!({"op": 2, "d": {"intents": 0}})).unwrap();

    let ready = client.next_message().unwrap();
    assert_eq!(ready["d"]["shard"], json!([0, 2]));
    assert_eq!(ready["d"]["guilds"].as_array().unwrap().len(), 3);
}

#[test]
fn test_sessions_spread_across_agents() {
    let server = TestServer::start_tls(test_config(1)).expect("Failed to start server");

    let mut clients: Vec<_> = (0..4).map(|_| server.connect(JSON_QUERY).unwrap()).collect();
    for client in &mut clients {
        assert_eq!(client.next_message().unwrap()["op"], 10);
        client.send_json(&identify([0, 1])).unwrap();
    }

    let mut session_ids = Vec::new();
    for client in &mut clients {
        let ready = client.next_message().unwrap();
        assert_eq!(ready["s"], 1);
        session_ids.push(ready["d"]["session_id"].as_str().unwrap().to_string());
        assert_eq!(client.next_message().unwrap()["s"], 2);
    }

    session_ids.sort();
    session_ids.dedup();
    assert_eq!(session_ids.len(), 4);
}

// ============================================================================
// Close Code Tests
// ============================================================================

#[test]
fn test_sharding_required_closes_with_4011_after_ready() {
    let mut config = test_config(5);
    config.protocol.max_guilds_per_shard = 2;
    let server = TestServer::start_tls(config).expect("Failed to start server");

    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();
    client.send_json(&identify([0, 1])).unwrap();

    assert_eq!(client.next_message().unwrap()["t"], "READY");
    assert_eq!(client.expect_close().unwrap(), 4011);
    client.expect_eof().unwrap();
}

#[test]
fn test_invalid_shard_closes_with_4010() {
    let server = TestServer::start_tls(test_config(1)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client.send_json(&identify([2, 2])).unwrap();
    assert_eq!(client.expect_close().unwrap(), 4010);
}

#[test]
fn test_mismatched_shard_total_closes_with_4010() {
    let server = TestServer::start_tls(test_config(4)).expect("Failed to start server");

    let mut first = server.connect(JSON_QUERY).unwrap();
    first.next_message().unwrap();
    first.send_json(&identify([0, 2])).unwrap();
    assert_eq!(first.next_message().unwrap()["t"], "READY");

    let mut second = server.connect(JSON_QUERY).unwrap();
    second.next_message().unwrap();
    second.send_json(&identify([1, 4])).unwrap();
    assert_eq!(second.expect_close().unwrap(), 4010);
}

#[test]
fn test_identify_twice_closes_with_4005() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client.send_json(&identify([0, 1])).unwrap();
    assert_eq!(client.next_message().unwrap()["t"], "READY");

    client.send_json(&identify([0, 1])).unwrap();
    assert_eq!(client.expect_close().unwrap(), 4005);
}

#[test]
fn test_unknown_op_closes_with_4001() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client.send_json(&json!({"op": 42, "d": null})).unwrap();
    assert_eq!(client.expect_close().unwrap(), 4001);
}

#[test]
fn test_invalid_intents_close_with_4013() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client
        .send_json(&json!({"op": 2, "d": {"intents": 1u64 << 40}}))
        .unwrap();
    assert_eq!(client.expect_close().unwrap(), 4013);
}

#[test]
fn test_resume_before_identify_closes_with_4003() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client
        .send_json(&json!({"op": 6, "d": {"token": "t", "session_id": "s", "seq": 4}}))
        .unwrap();
    assert_eq!(client.expect_close().unwrap(), 4003);
}

#[test]
fn test_resume_after_identify_is_acknowledged() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();
    client.send_json(&identify([0, 1])).unwrap();
    client.next_message().unwrap();

    client
        .send_json(&json!({"op": 6, "d": {"token": "t", "session_id": "s", "seq": 1}}))
        .unwrap();
    let resumed = client.next_message().unwrap();
    assert_eq!(resumed["t"], "RESUMED");
    assert_eq!(resumed["s"], 2);
}

#[test]
fn test_client_close_ends_session() {
    let server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();

    client
        .send_frame(FrameOpcode::Close, &1000u16.to_be_bytes())
        .unwrap();
    client.expect_eof().unwrap();
}

// ============================================================================
// Transport Tests
// ============================================================================

#[test]
fn test_plain_tcp_session() {
    let server = TestServer::start_plain(test_config(2)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();

    assert_eq!(client.next_message().unwrap()["op"], 10);
    client.send_json(&identify([0, 1])).unwrap();

    let ready = client.next_message().unwrap();
    assert!(ready["d"]["resume_gateway_url"]
        .as_str()
        .unwrap()
        .starts_with("ws://"));
    assert_eq!(client.next_message().unwrap()["s"], 2);
    assert_eq!(client.next_message().unwrap()["s"], 3);
}

#[test]
fn test_shutdown_asks_identified_clients_to_reconnect() {
    let mut server = TestServer::start_tls(test_config(0)).expect("Failed to start server");
    let mut client = server.connect(JSON_QUERY).unwrap();
    client.next_message().unwrap();
    client.send_json(&identify([0, 1])).unwrap();
    client.next_message().unwrap();

    server.cancel();

    let reconnect = client.next_message().unwrap();
    assert_eq!(reconnect["op"], 7);
    match client.poll_event(Duration::from_secs(5)).unwrap() {
        Some(ServerEvent::Frame(FrameOpcode::Close, _) | ServerEvent::Eof) | None => {}
        Some(other) => panic!("unexpected event after reconnect: {other:?}"),
    }

    server.shutdown().unwrap();
}
