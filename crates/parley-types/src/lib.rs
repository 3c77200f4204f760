//! Shared domain types for Parley.
//!
//! This crate contains the types shared across the Parley workspace:
//! sessions, turns and their parts, the backend wire payloads, configuration,
//! and the error taxonomy surfaced by the conversation engine.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror, base64.

pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod media;
pub mod serde_base64;
