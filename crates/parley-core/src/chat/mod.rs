//! Conversation persistence and reconstruction.
//!
//! `repository` defines the store ports, `history` rebuilds turns from flat
//! rows, `relay` forwards backend output while accumulating it, `writer`
//! runs the retried write cycle, and `service` is the facade used by the
//! API layer.

pub mod history;
pub mod payload;
pub mod relay;
pub mod repository;
pub mod service;
pub mod title;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
