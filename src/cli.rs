use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Terminal,
    /// Machine-readable JSON
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "mendmap")]
#[command(about = "Risk-aware atomic change engine for source trees", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a tree and report components, risk, and critical paths
    Analyze {
        /// Path to analyze
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a repair plan against a tree
    Repair {
        /// Path to the tree to repair
        path: PathBuf,

        /// JSON repair plan
        #[arg(short, long)]
        plan: PathBuf,

        /// Validate and order units without applying anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Report the blast radius of changing one component
    Impact {
        /// Path to analyze
        path: PathBuf,

        /// Component id (e.g. src.graph.builder)
        component: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,
    },

    /// List every textual occurrence of a name across the tree
    Usages {
        /// Path to search
        path: PathBuf,

        /// Name to look for
        name: String,
    },
}
