//! Command definitions and handlers.

pub mod tree;

use camino::Utf8PathBuf;
use clap::{Args, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display the revisions of an Aqua tree
    Log {
        /// Path to the Aqua tree (.aqua.json)
        file: Utf8PathBuf,
    },
    /// Verify an Aqua tree and print its verification graph
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Path to the Aqua tree (.aqua.json)
    pub file: Utf8PathBuf,
    /// Revision to verify up to (default: the latest revision)
    #[arg(long)]
    pub hash: Option<String>,
    /// Verify every branch of every root instead of a single chain
    #[arg(long, conflicts_with = "hash")]
    pub all: bool,
    /// Directory holding the files named in `file_index` (default: the tree's directory)
    #[arg(long)]
    pub files: Option<Utf8PathBuf>,
    /// Aqua trees that link revisions may refer to
    #[arg(long, num_args = 1..)]
    pub linked: Vec<Utf8PathBuf>,
    /// Verifier configuration (TOML)
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,
    /// Check witness proofs locally without confirming anchors
    #[arg(long)]
    pub offline: bool,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
