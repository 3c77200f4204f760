//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: SQLite
//! conversation storage, the Gemini HTTP backend client, and the AES-256-GCM
//! session token minter, plus configuration loading.

pub mod config;
pub mod crypto;
pub mod gemini;
pub mod sqlite;
