//! CLI command definitions and handlers.

pub mod check;
pub mod templates;

use clap::{Parser, Subcommand};

/// Printcheck - trading card alignment and ROI extraction
#[derive(Parser)]
#[command(name = "printcheck")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Shared check arguments (inputs, ROI, thresholds, flags).
    #[command(flatten)]
    pub check: check::CheckArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Align cards and extract the region of interest
    Check(check::CheckArgs),
    /// Inspect reference template sets
    Templates(templates::TemplatesArgs),
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every card processed with verdict `ok`.
    Success = 0,
    /// At least one card skipped or not `ok`.
    IssuesFound = 1,
    /// Bad arguments or a fatal setup error.
    Error = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}
