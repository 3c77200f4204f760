//! Cryptographic operations for Parley.
//!
//! - `token`: AES-256-GCM session token minter

pub mod token;
