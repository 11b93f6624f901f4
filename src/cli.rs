use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framevault")]
#[command(author, version, about = "Key-value persistence and range queries for demultiplexed media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a media spec and print the range as JSON
    Spec {
        /// Spec such as `42`, `42f`, `2nd-3rd`, `1.5s-3s` or `42+10d`
        #[arg(allow_hyphen_values = true)]
        spec: String,
    },

    /// Store a format JSON document
    Import {
        /// File holding the format record
        #[arg(required = true)]
        file: PathBuf,

        /// Fail instead of replacing an existing format
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Print a stored format and its streams
    Format {
        /// URL the format was stored under
        url: String,
    },

    /// Print one stored stream
    Stream {
        /// URL the format was stored under
        url: String,

        /// Stream index
        index: u32,
    },

    /// Print the packets or frames of a stream selected by a media spec
    Media {
        /// URL the format was stored under
        url: String,

        /// Stream index
        stream: u32,

        /// Media spec selecting the elements
        #[arg(allow_hyphen_values = true)]
        spec: String,

        /// Matched elements to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum number of elements to print
        #[arg(long)]
        limit: Option<usize>,

        /// Skip payloads
        #[arg(long)]
        metadata_only: bool,
    },

    /// List stored formats, most recent first
    List {
        /// Entries to skip
        #[arg(long, default_value = "0")]
        start: usize,

        /// Maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
