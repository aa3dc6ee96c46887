//! A p2p node that converges a dynamically-joining set of nodes on one shared
//! integer value with Snowball-style metastable consensus, discovering its
//! membership through periodic gossip.

pub mod config;
pub mod consensus;
pub mod consensus_service;
pub mod error;
pub mod message_service;
pub mod metrics;
pub mod p2p;
pub mod peer_service;
pub mod server;
