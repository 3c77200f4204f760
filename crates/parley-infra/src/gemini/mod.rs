//! Gemini REST backend client.

pub mod client;

pub use client::GeminiClient;
