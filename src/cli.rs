use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisio")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Install, update and remove units transactionally, with rollback", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a transaction file against a profile
    Apply(ApplyArgs),

    /// Inspect and create profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Show the standard phases and their weights
    Phases,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Transaction file (TOML, or JSON with a .json extension)
    pub file: PathBuf,

    /// Profile to apply to (overrides the file)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without running it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List stored profiles
    List,

    /// Show a profile's properties and installed units
    Show {
        /// Profile id
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an empty profile
    Create {
        /// Profile id
        id: String,

        /// Parent profile to inherit properties from
        #[arg(long)]
        parent: Option<String>,

        /// Property to set (KEY=VALUE, repeatable)
        #[arg(short = 'P', long = "property", value_parser = parse_key_value)]
        properties: Vec<(String, String)>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
