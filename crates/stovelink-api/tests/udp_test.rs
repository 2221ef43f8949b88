//! UDP queries against a live socket on localhost.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use stovelink_api::udp::serve_udp;
use stovelink_api::Bridge;
use stovelink_core::{BridgeConfig, Engine, EventBroadcaster, SimulatedStove};
use tokio::net::UdpSocket;

async fn query(payload: &str) -> Value {
    let engine = Engine::new(
        BridgeConfig::default(),
        SimulatedStove::new(),
        EventBroadcaster::new(),
        None,
    );
    let (bridge, handle) = Bridge::new(engine);
    tokio::spawn(bridge.run());

    let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(serve_udp(server, handle));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(payload.as_bytes(), server_addr).await.unwrap();

    let mut buf = vec![0u8; 8192];
    let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, server_addr);
    serde_json::from_slice(&buf[..len]).unwrap()
}

#[tokio::test]
async fn test_bridge_query_returns_static_data() {
    let doc = query("plzbridge?").await;
    assert_eq!(doc["INFO"]["CMD"], "GET STDT");
    assert_eq!(doc["SUCCESS"], true);
    assert!(doc["DATA"].get("LABEL").is_some());
}

#[tokio::test]
async fn test_all_status_query() {
    let doc = query("plzbridge?GET ALLS").await;
    assert_eq!(doc["INFO"]["CMD"], "GET ALLS");
    assert_eq!(doc["SUCCESS"], true);
}

#[tokio::test]
async fn test_unrecognized_query_is_unknown() {
    let doc = query("hello").await;
    assert_eq!(doc["INFO"]["CMD"], "UNKNOWN");
    assert_eq!(doc["SUCCESS"], false);
}
