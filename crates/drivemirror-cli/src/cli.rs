use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use drivemirror_core::{CleanupMode, ConflictStrategy};

#[derive(Parser)]
#[command(name = "drivemirror")]
#[command(about = "Keep a local SQLite mirror in step with a remote file tree")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the mirror database file
    #[arg(long, value_name = "PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to an engine config file (JSON)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync a subtree from a remote listing export into the mirror
    Sync {
        /// Remote root node ID
        root_id: String,
        /// JSON file with the remote nodes of the subtree
        #[arg(long, value_name = "FILE")]
        listing: PathBuf,
        /// Conflict strategy for nodes already in the mirror
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// What to do with rows whose remote node is gone
        #[arg(long, value_enum)]
        cleanup: Option<CleanupArg>,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Allow `--cleanup hard` to permanently remove rows
        #[arg(long)]
        confirm_hard_delete: bool,
        /// Rows per write batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum folder depth below the root
        #[arg(long)]
        max_depth: Option<usize>,
        /// Only sync direct children of the root
        #[arg(long)]
        no_recursive: bool,
        /// Print the session record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent sync sessions, newest first
    History {
        /// Only sessions for this root
        #[arg(long)]
        root: Option<String>,
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored checkpoint of a root
    Checkpoint {
        /// Remote root node ID
        root_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List mirror rows of a root ordered by path
    List {
        /// Remote root node ID
        root_id: String,
        /// Include soft-deleted rows
        #[arg(long)]
        include_deleted: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    Skip,
    Overwrite,
    Merge,
    Newer,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Skip => Self::Skip,
            StrategyArg::Overwrite => Self::Overwrite,
            StrategyArg::Merge => Self::Merge,
            StrategyArg::Newer => Self::Newer,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CleanupArg {
    Soft,
    Hard,
    None,
}

impl From<CleanupArg> for CleanupMode {
    fn from(value: CleanupArg) -> Self {
        match value {
            CleanupArg::Soft => Self::Soft,
            CleanupArg::Hard => Self::Hard,
            CleanupArg::None => Self::None,
        }
    }
}
