//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// doctool document generation CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build all documents from the manifest
    Build {
        /// Project directory containing the manifest
        directory: Option<PathBuf>,

        /// Path to the manifest, relative to the project directory
        #[arg(short, long, default_value = "doctool.yaml")]
        config: PathBuf,
    },

    /// Build, then watch for changes and rebuild affected documents
    Watch {
        /// Project directory containing the manifest
        directory: Option<PathBuf>,

        /// Path to the manifest, relative to the project directory
        #[arg(short, long, default_value = "doctool.yaml")]
        config: PathBuf,
    },
}
