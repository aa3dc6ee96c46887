//! Peer directory and gossip discovery
//!
//! This module owns the bounded membership set of a node, the cached client
//! connections to other peers, and the background task that periodically
//! exchanges known-peer lists with them.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

use crate::config::RuntimeConfig;
use crate::error::NodeError;
use crate::peer_service::pb::peer_service_client::PeerServiceClient;
use crate::peer_service::pb::GetNeighbourRequest;

/// Connectivity state of a tracked peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No record, or no established connection.
    Unknown,
    /// A dial is in flight.
    Connecting,
    /// A cached connection is available for use.
    Ready,
    /// The cached connection failed a call and will be replaced on next use.
    Degraded,
}

/// Directory contract consumed by the consensus engine. One production
/// implementation exists; tests substitute fakes for the sampling path.
#[tonic::async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Adds addresses to the directory. Idempotent, never dials.
    async fn add_peers(&self, addrs: &[String]);

    /// Closes the connection to a peer, then removes it from the directory.
    async fn remove_peer(&self, addr: &str) -> Result<(), NodeError>;

    /// Removes every known peer with the same close-then-delete discipline.
    /// Aborts on the first close failure, leaving the remaining peers
    /// untouched.
    async fn remove_all_peers(&self) -> Result<(), NodeError>;

    /// Closes the connection to a peer without removing the membership entry.
    async fn disconnect(&self, addr: &str) -> Result<(), NodeError>;

    /// Returns a point-in-time snapshot of known addresses, unordered.
    async fn get_peers(&self) -> Vec<String>;

    /// Returns the connectivity state of a peer address.
    async fn get_peer_state(&self, addr: &str) -> PeerState;

    /// Returns a reusable connection to a peer, dialing if none is cached.
    /// An address not previously known is implicitly added.
    async fn get_connection(&self, addr: &str) -> Result<Channel, NodeError>;

    /// Returns the number of peers in the directory.
    async fn get_peers_num(&self) -> usize;

    /// Samples up to `k` distinct addresses uniformly without replacement.
    /// Returns every known address when the directory holds fewer than `k`.
    async fn sample_peers(&self, k: usize) -> Vec<String>;

    /// Returns the known addresses and only afterward adds the requester, so
    /// a node is never reported back to itself.
    async fn neighbours(&self, requester: &str) -> Vec<String>;

    /// Marks a peer's cached connection as failed so the next
    /// `get_connection` dials a fresh one.
    async fn report_failure(&self, addr: &str);
}

/// A remote node the local node can connect to.
struct PeerRecord {
    address: String,
    conn: Option<Channel>,
    state: PeerState,
}

impl PeerRecord {
    fn new(address: String) -> Self {
        PeerRecord {
            address,
            conn: None,
            state: PeerState::Unknown,
        }
    }

    /// Closes the owned connection. Dropping the cached channel closes it,
    /// so this cannot currently fail; the Result keeps the close-then-delete
    /// discipline explicit at the call sites.
    fn close(&mut self) -> Result<(), NodeError> {
        self.conn.take();
        self.state = PeerState::Unknown;
        Ok(())
    }
}

/// Manages the peers that a local node knows.
pub struct PeerManager {
    /// Network address of the local node. Never tracked in its own directory.
    addr: String,
    max_peer_num: usize,
    discover_interval: Duration,
    call_timeout: Duration,

    peers: RwLock<HashMap<String, PeerRecord>>,

    stop_discover: Notify,
    discover_task: StdMutex<Option<JoinHandle<()>>>,
}

impl PeerManager {
    pub fn new(config: &RuntimeConfig) -> Self {
        PeerManager {
            addr: config.addr.clone(),
            max_peer_num: config.max_peer_num,
            discover_interval: config.discover_interval(),
            call_timeout: config.call_timeout(),
            peers: RwLock::new(HashMap::new()),
            stop_discover: Notify::new(),
            discover_task: StdMutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Seeds the directory with bootstrap addresses, then launches the
    /// long-lived gossip task. The task repeats
    /// `{scan membership, gossip each known peer while below the bound,
    /// wait-or-stop}` until `stop_discover_peers` is called.
    pub async fn start_discover_peers(self: std::sync::Arc<Self>, bootstraps: &[String]) {
        self.add_peers(bootstraps).await;

        let mut task = self.discover_task.lock().unwrap();
        if task.is_some() {
            log::warn!("{}: peer discovery already running", self.addr);
            return;
        }

        let pm = self.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                if pm.get_peers_num().await < pm.max_peer_num {
                    for addr in pm.get_peers().await {
                        pm.discover_peers(&addr).await;
                        if pm.get_peers_num().await >= pm.max_peer_num {
                            break;
                        }
                    }
                }

                tokio::select! {
                    _ = pm.stop_discover.notified() => {
                        log::info!("{}: peer discovery stopped", pm.addr);
                        return;
                    }
                    _ = tokio::time::sleep(pm.discover_interval) => {}
                }
            }
        }));
    }

    /// Signals the discovery task to stop and waits until it has exited.
    pub async fn stop_discover_peers(&self) {
        let task = self.discover_task.lock().unwrap().take();
        if let Some(task) = task {
            self.stop_discover.notify_one();
            let _ = task.await;
        }
    }

    /// Asks one peer for its neighbours and merges them into the directory.
    /// Failures are swallowed; an unreachable peer contributes nothing to
    /// this pass and is retried on the next one.
    async fn discover_peers(&self, addr: &str) {
        let conn = match self.get_connection(addr).await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("{} failed to connect to peer {}: {}", self.addr, addr, e);
                return;
            }
        };

        let mut client = PeerServiceClient::new(conn);
        let request = GetNeighbourRequest {
            address: self.addr.clone(),
        };
        match client.get_neighbours(request).await {
            Ok(response) => {
                self.add_peers(&response.into_inner().peers).await;
            }
            Err(e) => {
                log::warn!(
                    "{} failed to get neighbours of peer {}: {}",
                    self.addr,
                    addr,
                    e
                );
                self.report_failure(addr).await;
            }
        }
    }

    /// Dials a peer. The per-call timeout configured on the endpoint bounds
    /// every request issued on the returned channel.
    async fn dial(&self, addr: &str) -> Result<Channel, NodeError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))?
            .connect_timeout(self.call_timeout)
            .timeout(self.call_timeout);
        Ok(endpoint.connect().await?)
    }
}

#[tonic::async_trait]
impl PeerDirectory for PeerManager {
    async fn add_peers(&self, addrs: &[String]) {
        let mut peers = self.peers.write().await;
        for addr in addrs {
            if addr == &self.addr || peers.contains_key(addr) {
                continue;
            }
            peers.insert(addr.clone(), PeerRecord::new(addr.clone()));
        }
    }

    async fn remove_peer(&self, addr: &str) -> Result<(), NodeError> {
        let mut peers = self.peers.write().await;
        match peers.get_mut(addr) {
            Some(record) => {
                record.close()?;
                peers.remove(addr);
                Ok(())
            }
            None => Err(NodeError::UnknownPeer(addr.to_string())),
        }
    }

    async fn remove_all_peers(&self) -> Result<(), NodeError> {
        let mut peers = self.peers.write().await;
        let addrs: Vec<String> = peers.keys().cloned().collect();
        for addr in addrs {
            if let Some(record) = peers.get_mut(&addr) {
                record.close()?;
                peers.remove(&addr);
            }
        }
        Ok(())
    }

    async fn disconnect(&self, addr: &str) -> Result<(), NodeError> {
        let mut peers = self.peers.write().await;
        match peers.get_mut(addr) {
            Some(record) => record.close(),
            None => Err(NodeError::UnknownPeer(addr.to_string())),
        }
    }

    async fn get_peers(&self) -> Vec<String> {
        let peers = self.peers.read().await;
        peers.values().map(|p| p.address.clone()).collect()
    }

    async fn get_peer_state(&self, addr: &str) -> PeerState {
        let peers = self.peers.read().await;
        match peers.get(addr) {
            Some(record) if record.conn.is_some() => record.state,
            _ => PeerState::Unknown,
        }
    }

    async fn get_connection(&self, addr: &str) -> Result<Channel, NodeError> {
        // Establishing the connection happens under the write lock, so an
        // address holds at most one live connection at a time.
        let mut peers = self.peers.write().await;

        if addr != self.addr && !peers.contains_key(addr) {
            peers.insert(addr.to_string(), PeerRecord::new(addr.to_string()));
        }
        let record = peers
            .get_mut(addr)
            .ok_or_else(|| NodeError::UnknownPeer(addr.to_string()))?;

        if let Some(conn) = &record.conn {
            if record.state != PeerState::Degraded {
                return Ok(conn.clone());
            }
        }

        record.state = PeerState::Connecting;
        match self.dial(addr).await {
            Ok(conn) => {
                record.conn = Some(conn.clone());
                record.state = PeerState::Ready;
                Ok(conn)
            }
            Err(e) => {
                record.conn = None;
                record.state = PeerState::Unknown;
                Err(e)
            }
        }
    }

    async fn get_peers_num(&self) -> usize {
        let peers = self.peers.read().await;
        peers.len()
    }

    async fn sample_peers(&self, k: usize) -> Vec<String> {
        let peers = self.peers.read().await;
        let addrs: Vec<&String> = peers.keys().collect();
        addrs
            .choose_multiple(&mut rand::thread_rng(), k)
            .map(|addr| (*addr).clone())
            .collect()
    }

    async fn neighbours(&self, requester: &str) -> Vec<String> {
        let known = self.get_peers().await;
        self.add_peers(&[requester.to_string()]).await;
        known
    }

    async fn report_failure(&self, addr: &str) {
        let mut peers = self.peers.write().await;
        if let Some(record) = peers.get_mut(addr) {
            if record.conn.is_some() {
                record.state = PeerState::Degraded;
            }
        }
    }
}
