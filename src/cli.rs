use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adjutant")]
#[command(about = "Personal Discord assistant bridging chat to LLM tool calling", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the Discord bridge loop.
    Run {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Answer a single request and print the reply.
    Ask {
        /// The request text; read from stdin when omitted.
        input: Option<String>,
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Output a JSON envelope instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Print the registered tool schemas as JSON.
    Tools {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Resolve a loose reference against the live directory.
    Resolve {
        /// The reference: @handle, #channel, or a bare guild name.
        handle: String,
        /// What to resolve against: member, dm, channel, or guild.
        #[arg(long, default_value = "member")]
        kind: String,
    },

    /// Operate the memory store directly.
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum MemoryCommand {
    /// Store a value under a key.
    Set {
        key: String,
        value: String,
        /// Append to an existing value instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Similarity-ranked contextual retrieval.
    Get { query: String },

    /// Whole-document recall with scores.
    Recall {
        query: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Remove documents by key, type, age, or tag.
    Forget {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        /// Remove documents created before this unix timestamp (ms).
        #[arg(long)]
        before_ms: Option<i64>,
        /// Tag to match (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Print store statistics.
    Stats,
}
