//! P2P Module
//!
//! This module contains the networking components of a node:
//! - `peer`: membership directory, connection cache and gossip discovery
//! - `message`: pass-through messaging with a hashed message log

pub mod message;
pub mod peer;
