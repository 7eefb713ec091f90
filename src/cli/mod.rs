//! CLI module for ecsform
//!
//! Subcommands:
//! - `ecsform validate` - Check a manifest and print the normalized services
//! - `ecsform plan` - Compose every resource of a manifest without creating anything

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "ecsform")]
#[command(about = "Validate and plan ECS/Fargate clusters and services")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a .env file loaded before the manifest is read
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a manifest and show the normalized services
    Validate(ValidateArgs),

    /// Compose the resources of a manifest in creation order
    Plan(PlanArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the manifest (JSON, JSONC or YAML)
    pub file: PathBuf,

    /// Print the normalized services as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Path to the manifest (JSON, JSONC or YAML)
    pub file: PathBuf,

    /// State file with deployed layout versions (default: ~/.ecsform/state.yaml)
    #[arg(long, env = "ECSFORM_STATE")]
    pub state: Option<String>,

    /// Print the resource calls as JSON
    #[arg(long)]
    pub json: bool,

    /// Record the layout version in the state file after a successful plan
    #[arg(long)]
    pub commit: bool,
}
