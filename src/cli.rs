//! CLI argument parsing for the b2b-import-worker binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::{ImportMode, TemplateFormat};

#[derive(Parser)]
#[command(name = "b2b-import-worker", about = "B2B order Excel import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Options shared by the client subcommands
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// JWT to send with requests; minted from JWT_SECRET when omitted
    #[arg(long)]
    pub token: Option<String>,

    /// Import mode: create_customers or customer_id
    #[arg(long, default_value = "create_customers", value_parser = parse_mode)]
    pub mode: ImportMode,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Download an import template
    Template {
        /// xlsx or csv
        #[arg(long, default_value = "xlsx", value_parser = parse_format)]
        format: TemplateFormat,
        /// Directory to save the template into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Validate a spreadsheet without importing anything
    Preview {
        file: PathBuf,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Preview, then import the valid rows of a spreadsheet
    Import {
        file: PathBuf,
        /// Import valid rows even when some rows are invalid
        #[arg(long)]
        skip_invalid: bool,
        /// Create customers that do not exist yet
        #[arg(long)]
        create_customers: bool,
        #[command(flatten)]
        client: ClientArgs,
    },
}

fn parse_mode(s: &str) -> Result<ImportMode, String> {
    ImportMode::parse(s).ok_or_else(|| format!("unknown import mode '{}'", s))
}

fn parse_format(s: &str) -> Result<TemplateFormat, String> {
    TemplateFormat::parse(s).ok_or_else(|| format!("unknown template format '{}'", s))
}
