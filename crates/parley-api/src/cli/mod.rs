//! CLI command definitions and dispatch for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conversation persistence and relay for a Gemini backend.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `[server].port`).
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind (defaults to `[server].host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// List sessions that have messages, most recent first.
    #[command(alias = "ls")]
    Sessions,

    /// Print the turns of a session in order.
    History {
        /// Session id.
        id: i64,
    },

    /// Delete a session and all of its turns.
    #[command(alias = "rm")]
    Delete {
        /// Session id.
        id: i64,
    },

    /// Set a session's title.
    Rename {
        /// Session id.
        id: i64,
        /// New title.
        title: String,
    },

    /// Mark a session as limited; it will refuse new turns.
    Lock {
        /// Session id.
        id: i64,
    },

    /// Send one message and print the streamed reply.
    Chat {
        /// Message text.
        message: String,
        /// Continue this session instead of starting a new one.
        #[arg(short, long)]
        session: Option<i64>,
        /// Resubmit from this turn, discarding it and everything after it.
        #[arg(long, requires = "session")]
        edit_from: Option<i64>,
        /// Attach a file (repeatable). The media type follows the extension.
        #[arg(short, long)]
        attach: Vec<PathBuf>,
        /// Backend model alias to use for this message.
        #[arg(short, long)]
        model: Option<String>,
    },
}
