use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start nota as a service.
    Daemon {},

    /// Register a device and print its user id and bearer token.
    /// Re-registering the same device rotates the token.
    Register {
        /// Unique device identifier the client keeps
        device_id: String,
    },

    /// Add a note
    Add {
        /// Owner user id
        #[clap(short, long)]
        user: u64,

        /// Note text; blank lines separate paragraphs
        text: String,

        /// Note title
        #[clap(short, long)]
        title: Option<String>,

        /// Where the content came from (URL or file reference)
        #[clap(long)]
        source_uri: Option<String>,
    },

    /// Append a text block to a note
    Append {
        /// Owner user id
        #[clap(short, long)]
        user: u64,

        /// Note id
        id: u64,

        /// Block text
        text: String,
    },

    /// Semantic search over a user's notes
    Search {
        /// Owner user id
        #[clap(short, long)]
        user: u64,

        /// Free-text query
        query: String,

        /// Maximum nearest chunks fetched
        #[clap(short, long)]
        limit: Option<usize>,

        /// Cosine-distance cutoff override [0.0, 1.0]
        #[clap(short, long)]
        threshold: Option<f32>,
    },

    /// List a user's notes, most recently updated first
    List {
        /// Owner user id
        #[clap(short, long)]
        user: u64,
    },

    /// Delete a note and its indexed chunks
    Delete {
        /// Owner user id
        #[clap(short, long)]
        user: u64,

        /// Note id
        id: u64,
    },

    /// Rebuild the whole vector index from the note store
    Reindex {},
}
