//! HTTP request handlers.

pub mod chat;
pub mod model;
pub mod session;
