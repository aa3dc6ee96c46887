//! Consensus Module
//!
//! This module contains the metastable consensus components:
//! - `snow`: Snowball engine driving sampling rounds against the peer directory
//! - `tally`: plurality vote over one round of responses

pub mod snow;
pub mod tally;
