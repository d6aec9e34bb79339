use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lsp-facilitator", version, about = "LEGO Serious Play session facilitator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enter the interactive facilitation REPL for a session
    Chat {
        /// The UUID of the session to connect to
        #[arg(short, long)]
        session: Uuid,
    },

    /// Manage facilitation sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Mark messages as insights
    Insight {
        #[command(subcommand)]
        action: InsightAction,
    },

    /// Manage photos of built models
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// List the six methodology phases
    Phases,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a new session
    Create {
        #[arg(short, long)]
        name: String,
    },

    /// List all sessions
    List,

    /// Show a session's phase and messages
    Show { id: Uuid },

    /// Rename a session
    Rename {
        id: Uuid,
        #[arg(short, long)]
        name: String,
    },

    /// Delete a session with its messages and images
    Delete { id: Uuid },

    /// Export a session to a .txt transcript
    Export {
        /// The UUID of the session to export
        id: Uuid,
        /// The path to the output file (optional)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Import a session from a .txt transcript
    Import {
        /// The path to the .txt file to import
        #[arg(short, long)]
        path: String,
    },
}

#[derive(Subcommand)]
pub enum InsightAction {
    /// Flip the insight flag on a message
    Toggle { message_id: Uuid },

    /// List a session's insight messages
    List { session_id: Uuid },
}

#[derive(Subcommand)]
pub enum ImageAction {
    /// Attach an image file to a session
    Add {
        #[arg(short, long)]
        session: Uuid,
        #[arg(short, long)]
        path: String,
        /// Defaults to the file name
        #[arg(short, long)]
        title: Option<String>,
        /// Tie the image to a specific message
        #[arg(short, long)]
        message: Option<Uuid>,
    },

    /// List a session's images, newest first
    List { session_id: Uuid },

    /// Delete an image
    Delete { id: Uuid },
}
