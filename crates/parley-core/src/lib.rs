//! Conversation engine and port trait definitions for Parley.
//!
//! This crate defines the "ports" (store, backend, token minter) that the
//! infrastructure layer implements, plus the logic built on them: history
//! reconstruction, the streaming relay, and the transactional turn writer.
//! It depends only on `parley-types` -- never on `parley-infra` or any
//! database/IO crate.

pub mod backend;
pub mod chat;
pub mod token;
