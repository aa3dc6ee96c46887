//! Peer service implementation
//!
//! Inbound gossip endpoint: answers neighbour queries from other nodes.

use std::sync::Arc;

use pb::peer_service_server::PeerService;
use pb::{GetNeighbourRequest, GetNeighbourResponse};

use crate::metrics;
use crate::p2p::peer::{PeerDirectory, PeerManager};

/// Protocol buffer definitions for the peer service
#[allow(clippy::module_inception)]
pub mod pb {
    tonic::include_proto!("peer");
}

pub struct PeerServiceSVC {
    peers: Arc<PeerManager>,
}

impl PeerServiceSVC {
    pub fn new(peers: Arc<PeerManager>) -> Self {
        PeerServiceSVC { peers }
    }
}

#[tonic::async_trait]
impl PeerService for PeerServiceSVC {
    /// Returns the known peers, then adds the requester to the directory so
    /// it becomes discoverable by subsequent third-party queries.
    async fn get_neighbours(
        &self,
        request: tonic::Request<GetNeighbourRequest>,
    ) -> Result<tonic::Response<GetNeighbourResponse>, tonic::Status> {
        metrics::record_metrics("get_neighbours", || async {
            let requester = request.into_inner().address;
            let peers = self.peers.neighbours(&requester).await;
            Ok(tonic::Response::new(GetNeighbourResponse { peers }))
        })
        .await
    }
}
