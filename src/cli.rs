//! Command-line interface definition for chatquota
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// chatquota - usage-quota aware chat client
///
/// Tracks the monthly message allowance of your plan, keeps conversations in
/// a local cache, and mirrors your subscription from the billing backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatquota")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// User id to act as (overrides config)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Path to the local store database (overrides config)
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show quota usage and subscription
    Status,

    /// Send a message and print the reply
    Send {
        /// Message text
        message: String,

        /// Continue this conversation (id or unique id prefix)
        #[arg(short = 'C', long)]
        conversation: Option<String>,
    },

    /// Re-pull subscription state and roll the quota period if due
    Refresh,

    /// Start a checkout for a plan
    Checkout {
        /// Plan id to upgrade to
        plan: String,
    },

    /// Manage cached conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Conversation cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List cached conversations, most recent first
    List,

    /// Print one conversation
    Show {
        /// Conversation id or unique id prefix
        id: String,
    },

    /// Delete a conversation from the cache
    Delete {
        /// Conversation id or unique id prefix
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
