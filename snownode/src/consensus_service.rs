//! Consensus service implementation
//!
//! Inbound consensus endpoint: answers preference queries from other nodes.

use std::sync::Arc;

use pb::consensus_service_server::ConsensusService;
use pb::{GetPreferenceRequest, GetPreferenceResponse};

use crate::consensus::snow::Snow;
use crate::metrics;

/// Protocol buffer definitions for the consensus service
#[allow(clippy::module_inception)]
pub mod pb {
    tonic::include_proto!("consensus");
}

pub struct ConsensusServiceSVC {
    snow: Arc<Snow>,
}

impl ConsensusServiceSVC {
    pub fn new(snow: Arc<Snow>) -> Self {
        ConsensusServiceSVC { snow }
    }
}

#[tonic::async_trait]
impl ConsensusService for ConsensusServiceSVC {
    async fn get_preference(
        &self,
        _request: tonic::Request<GetPreferenceRequest>,
    ) -> Result<tonic::Response<GetPreferenceResponse>, tonic::Status> {
        metrics::record_metrics("get_preference", || async {
            Ok(tonic::Response::new(GetPreferenceResponse {
                preference: self.snow.preference(),
            }))
        })
        .await
    }
}
