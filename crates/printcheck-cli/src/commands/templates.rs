//! Templates command - inspect reference template sets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use printcheck_adapters::templates::{list_templates, CARD_FILE, ROI_FILE};

use crate::config::AppConfig;

/// Arguments for the templates command
#[derive(Args)]
pub struct TemplatesArgs {
    /// Custom templates directory (overrides default and config)
    #[arg(long, value_name = "DIR", global = true)]
    pub templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: TemplatesCommand,
}

/// Templates subcommands
#[derive(Subcommand)]
pub enum TemplatesCommand {
    /// List template sets and their files
    List,
    /// Print templates directory path
    Path,
}

/// Run the templates command.
#[allow(clippy::unnecessary_wraps)]
pub fn run(args: &TemplatesArgs, config: &AppConfig) -> Result<()> {
    let dir = args
        .templates_dir
        .clone()
        .or_else(|| config.templates.dir.clone())
        .unwrap_or_else(printcheck_adapters::default_templates_dir);
    match args.command {
        TemplatesCommand::List => {
            list(&dir);
            Ok(())
        }
        TemplatesCommand::Path => {
            println!("{}", dir.display());
            Ok(())
        }
    }
}

fn list(dir: &std::path::Path) {
    let sets = list_templates(dir);
    if sets.is_empty() {
        println!("No template sets in {}", dir.display());
        return;
    }
    println!("Template sets in {}:", dir.display());
    for (name, has_roi, has_card) in sets {
        let roi = if has_roi { ROI_FILE } else { "missing roi.png" };
        let card = if has_card { CARD_FILE } else { "-" };
        println!("  {name:<24} {roi:<16} {card}");
    }
}
