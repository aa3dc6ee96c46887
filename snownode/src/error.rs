//! Error types shared by the peer directory and the consensus engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    /// Dialing or connection establishment failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A remote call returned an error or exceeded its timeout.
    #[error("remote call failed: {0}")]
    RemoteCall(#[from] tonic::Status),

    /// An operation referenced an address the directory does not track.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}
