//! Gossip discovery and peer directory behavior across real nodes.

use std::time::{Duration, Instant};

use snownode::config::RuntimeConfig;
use snownode::consensus_service::pb::consensus_service_client::ConsensusServiceClient;
use snownode::consensus_service::pb::GetPreferenceRequest;
use snownode::error::NodeError;
use snownode::message_service::pb::{MessageRequest, MessageType};
use snownode::p2p::peer::{PeerDirectory, PeerState};
use snownode::server::Node;

fn node_addr(base_port: u16, i: u16) -> String {
    format!("127.0.0.1:{}", base_port + i)
}

fn test_config(addr: String, bootstrap: Vec<String>) -> RuntimeConfig {
    RuntimeConfig {
        addr,
        metrics_addr: String::new(),
        bootstrap,
        discover_interval_ms: 200,
        call_timeout_ms: 1000,
        ..RuntimeConfig::default()
    }
}

async fn wait_listening(addr: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while tokio::net::TcpStream::connect(addr).await.is_err() {
        if Instant::now() > deadline {
            panic!("server at {} did not start", addr);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn start_chained_nodes(base_port: u16, num_nodes: u16) -> Vec<Node> {
    let mut nodes = Vec::new();
    for i in 0..num_nodes {
        let bootstrap = if i == 0 {
            Vec::new()
        } else {
            vec![node_addr(base_port, i - 1)]
        };
        let mut node = Node::new(test_config(node_addr(base_port, i), bootstrap));
        node.start().await.unwrap();
        nodes.push(node);
    }
    for i in 0..num_nodes {
        wait_listening(&node_addr(base_port, i)).await;
    }
    nodes
}

/// Nodes with no bootstrap addresses and discovery stopped, so no gossip
/// interferes with the direct directory operations under test.
async fn start_isolated_nodes(base_port: u16, num_nodes: u16) -> Vec<Node> {
    let mut nodes = Vec::new();
    for i in 0..num_nodes {
        let mut node = Node::new(test_config(node_addr(base_port, i), Vec::new()));
        node.start().await.unwrap();
        nodes.push(node);
    }
    for i in 0..num_nodes {
        wait_listening(&node_addr(base_port, i)).await;
    }
    for node in &nodes {
        node.peer_manager.stop_discover_peers().await;
    }
    nodes
}

/// Node i bootstraps only from node i-1; gossip still reaches a full mesh.
#[tokio::test(flavor = "multi_thread")]
async fn test_chained_bootstrap_reaches_full_mesh() {
    let num_nodes = 5;
    let mut nodes = start_chained_nodes(19650, num_nodes).await;

    let want = num_nodes as usize - 1;
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let mut sizes = Vec::new();
        for node in &nodes {
            sizes.push(node.peer_manager.get_peers_num().await);
        }
        if sizes.iter().all(|size| *size == want) {
            break;
        }
        if Instant::now() > deadline {
            panic!("directories did not reach full mesh, sizes: {:?}", sizes);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    for node in &mut nodes {
        node.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remove_peer_closes_connection_and_forgets_it() {
    let mut nodes = start_isolated_nodes(19660, 2).await;
    let remote = nodes[1].addr().to_string();

    // Implicit add and dial.
    nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Ready
    );

    nodes[0].peer_manager.remove_peer(&remote).await.unwrap();
    assert!(!nodes[0].peer_manager.get_peers().await.contains(&remote));
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Unknown
    );

    match nodes[0].peer_manager.remove_peer(&remote).await {
        Err(NodeError::UnknownPeer(addr)) => assert_eq!(addr, remote),
        other => panic!("expected UnknownPeer, got {:?}", other.err()),
    }

    for node in &mut nodes {
        node.stop().await;
    }
}

/// Re-adding a known address never replaces an established connection.
#[tokio::test(flavor = "multi_thread")]
async fn test_add_peers_keeps_established_connection() {
    let mut nodes = start_isolated_nodes(19670, 2).await;
    let remote = nodes[1].addr().to_string();

    nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    nodes[0].peer_manager.add_peers(&[remote.clone()]).await;

    assert_eq!(nodes[0].peer_manager.get_peers_num().await, 1);
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Ready
    );

    for node in &mut nodes {
        node.stop().await;
    }
}

/// A reported call failure marks the cached channel degraded; the next
/// lookup replaces it with a fresh dial instead of handing it out again.
#[tokio::test(flavor = "multi_thread")]
async fn test_reported_failure_degrades_until_redial() {
    let mut nodes = start_isolated_nodes(19710, 2).await;
    let remote = nodes[1].addr().to_string();

    nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Ready
    );

    nodes[0].peer_manager.report_failure(&remote).await;
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Degraded
    );

    let conn = nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Ready
    );

    // The replacement channel serves calls.
    nodes[1].consensus.update_preference(9);
    let mut client = ConsensusServiceClient::new(conn);
    let response = client.get_preference(GetPreferenceRequest {}).await.unwrap();
    assert_eq!(response.into_inner().preference, 9);

    for node in &mut nodes {
        node.stop().await;
    }
}

/// Disconnect closes the connection but keeps the membership entry.
#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_keeps_membership_entry() {
    let mut nodes = start_isolated_nodes(19720, 2).await;
    let remote = nodes[1].addr().to_string();

    nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    nodes[0].peer_manager.disconnect(&remote).await.unwrap();

    assert!(nodes[0].peer_manager.get_peers().await.contains(&remote));
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Unknown
    );

    // Still a member, so a later lookup just dials again.
    nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    assert_eq!(
        nodes[0].peer_manager.get_peer_state(&remote).await,
        PeerState::Ready
    );

    match nodes[0].peer_manager.disconnect("127.0.0.1:1").await {
        Err(NodeError::UnknownPeer(addr)) => assert_eq!(addr, "127.0.0.1:1"),
        other => panic!("expected UnknownPeer, got {:?}", other.err()),
    }

    for node in &mut nodes {
        node.stop().await;
    }
}

/// Stop returns only once the listener has shut down.
#[tokio::test(flavor = "multi_thread")]
async fn test_stop_waits_for_server_shutdown() {
    let addr = node_addr(19700, 0);
    let mut node = Node::new(test_config(addr.clone(), Vec::new()));
    node.start().await.unwrap();
    wait_listening(&addr).await;

    node.stop().await;

    assert!(tokio::net::TcpStream::connect(addr.as_str()).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_are_delivered_and_logged() {
    let mut nodes = start_isolated_nodes(19680, 2).await;
    let remote = nodes[1].addr().to_string();

    let conn = nodes[0].peer_manager.get_connection(&remote).await.unwrap();
    nodes[0]
        .message_manager
        .send_message(
            conn,
            &remote,
            MessageRequest {
                r#type: MessageType::Query as i32,
                value: b"hello".to_vec(),
                sender: nodes[0].addr().to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(nodes[0].message_manager.log_count(), 1);
    assert_eq!(nodes[1].message_manager.log_count(), 1);

    for node in &mut nodes {
        node.stop().await;
    }
}
