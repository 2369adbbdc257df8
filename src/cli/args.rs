//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    caso::CasoCommands, colegio::ColegioCommands, completions::CompletionsArgs, init::InitArgs,
    plazos::PlazosArgs, sla::SlaCommands,
};

#[derive(Parser)]
#[command(name = "convive")]
#[command(author, version, about = "Convive - casos de convivencia escolar")]
#[command(
    long_about = "Motor de casos de convivencia escolar: ciclo de vida del caso, plazos por etapa en días hábiles y seguimiento del debido proceso."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Workspace root (default: auto-detect by finding .convive/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new Convive workspace
    Init(InitArgs),

    /// School (tenant) onboarding
    #[command(subcommand)]
    Colegio(ColegioCommands),

    /// Case management
    #[command(subcommand)]
    Caso(CasoCommands),

    /// Stage SLA administration
    #[command(subcommand)]
    Sla(SlaCommands),

    /// Deadline overview for open cases
    Plazos(PlazosArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for list/show commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Ids only, one per line
    Id,
}
