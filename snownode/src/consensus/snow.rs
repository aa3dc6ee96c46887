//! Snowball consensus engine
//!
//! Repeatedly samples the peer directory and queries the sampled peers for
//! their preference until the local preference collects enough consecutive
//! agreeing rounds to be accepted, or the round budget runs out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_derive::Deserialize;

use crate::consensus_service::pb::consensus_service_client::ConsensusServiceClient;
use crate::consensus_service::pb::GetPreferenceRequest;
use crate::error::NodeError;
use crate::metrics;
use crate::p2p::peer::PeerDirectory;

use super::tally::tally;

/// Snowball parameters. Supplied at construction, never mutated.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SnowParams {
    /// Sample size of each round of query. K < number of peers.
    pub k: usize,
    /// Quorum size. A <= K.
    pub a: usize,
    /// Decision threshold: consecutive agreeing rounds needed to accept.
    pub b: u64,
    /// Maximum number of rounds per convergence run.
    pub max_step: u64,
}

impl Default for SnowParams {
    fn default() -> Self {
        SnowParams {
            k: 3,
            a: 2,
            b: 10,
            max_step: 100,
        }
    }
}

/// Local consensus state. All fields are mutated together under one lock,
/// held only for the tally-and-update step, never across a network call.
struct SnowState {
    preference: i64,
    confidence: u64,
    accepted: bool,
}

pub struct Snow {
    params: SnowParams,
    peers: Arc<dyn PeerDirectory>,
    state: Mutex<SnowState>,
    /// Guard allowing at most one in-flight convergence run per node.
    running: AtomicBool,
}

impl Snow {
    pub fn new(params: SnowParams, peers: Arc<dyn PeerDirectory>) -> Self {
        Snow {
            params,
            peers,
            state: Mutex::new(SnowState {
                preference: 0,
                confidence: 0,
                accepted: false,
            }),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the preference the node currently favors.
    pub fn preference(&self) -> i64 {
        self.state.lock().unwrap().preference
    }

    /// Overwrites the preference. Seeds the initial opinion before any round
    /// runs; leaves confidence and acceptance untouched.
    pub fn update_preference(&self, preference: i64) {
        self.state.lock().unwrap().preference = preference;
    }

    pub fn accepted(&self) -> bool {
        self.state.lock().unwrap().accepted
    }

    /// Runs rounds of sampling until the preference is accepted or the round
    /// budget is exhausted. A second call while a run is in flight is a
    /// no-op. Exhaustion is reported, not fatal; the caller may sync again.
    pub async fn sync(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.confidence = 1;
            state.accepted = false;
        }

        let mut step = 0u64;
        loop {
            step += 1;
            if step > self.params.max_step {
                log::warn!(
                    "consensus run exhausted {} rounds without accepting, preference {}",
                    self.params.max_step,
                    self.preference()
                );
                break;
            }
            if self.step().await {
                log::info!(
                    "consensus accepted preference {} after {} rounds",
                    self.preference(),
                    step
                );
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// One round: sample up to K peers, query each for its preference, tally
    /// the responses and fold the plurality into the local state. Returns
    /// true once the preference is accepted.
    async fn step(&self) -> bool {
        metrics::ROUND_COUNTER.inc();

        let sampled = self.peers.sample_peers(self.params.k).await;

        // A peer that cannot be reached contributes nothing to this round.
        let mut responses = Vec::with_capacity(sampled.len());
        for addr in &sampled {
            match self.query_preference(addr).await {
                Ok(preference) => responses.push(preference),
                Err(e) => {
                    log::warn!("preference query to {} failed: {}", addr, e);
                    self.peers.report_failure(addr).await;
                }
            }
        }

        let (winning_value, count) = tally(&responses);
        self.apply_round(winning_value, count)
    }

    /// Folds one round's tally into preference, confidence and acceptance.
    fn apply_round(&self, winning_value: i64, count: usize) -> bool {
        let mut state = self.state.lock().unwrap();

        if count >= self.params.a {
            let old_preference = state.preference;
            state.preference = winning_value;

            if old_preference != state.preference {
                // First agreeing round for the newly adopted value.
                state.confidence = 1;
            } else {
                state.confidence += 1;
                if state.confidence >= self.params.b {
                    state.accepted = true;
                }
            }
        } else {
            // A missed quorum discards all accumulated confidence.
            state.confidence = 0;
        }

        state.accepted
    }

    async fn query_preference(&self, addr: &str) -> Result<i64, NodeError> {
        let conn = self.peers.get_connection(addr).await?;
        let mut client = ConsensusServiceClient::new(conn);
        let response = client.get_preference(GetPreferenceRequest {}).await?;
        Ok(response.into_inner().preference)
    }
}
