//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// bunkatsu - Deterministic chunking bundler
#[derive(Parser)]
#[command(name = "bunkatsu")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable the build cache
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Build the project into chunks
    Build {
        /// Project root (defaults to the config file's directory)
        root: Option<PathBuf>,

        /// Output directory (defaults to output.dir under the root)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Plan the chunks without writing any file
        #[arg(long)]
        dry_run: bool,

        /// Exit with status 1 if the build produced warnings
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate a manifest and show its chunks
    Inspect {
        /// Path to manifest.json
        manifest: PathBuf,

        /// Show the chunk owning this module (id or source path)
        #[arg(long)]
        module: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the assets to precache for a manifest
    Precache {
        /// Path to manifest.json
        manifest: PathBuf,

        /// Fetch every asset from this origin and verify its fingerprint
        #[arg(long, value_name = "URL")]
        verify: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}
