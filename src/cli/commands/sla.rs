//! `convive sla` command - stage SLA administration

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{open_gateway, resolve_tenant};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Config, SlaRegistry};

#[derive(Subcommand, Debug)]
pub enum SlaCommands {
    /// List the stage SLAs of a school
    List(ListArgs),

    /// Create or replace the SLA for a stage
    Set(SetArgs),

    /// Remove the SLA for a stage
    Rm(RmArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "auto")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Process stage key
    pub etapa: String,

    /// Business days allowed for the stage
    pub dias: u32,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Process stage key
    pub etapa: String,
}

pub fn run(cmd: SlaCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SlaCommands::List(args) => run_list(args, global),
        SlaCommands::Set(args) => run_set(args, global),
        SlaCommands::Rm(args) => run_rm(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;

    let registry = SlaRegistry::new(&gateway);
    let stages = registry.list_stages(&tenant).into_diagnostic()?;

    if stages.is_empty() {
        println!(
            "Sin SLAs configurados. Use {} para incorporar el colegio.",
            style("convive colegio add").cyan()
        );
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&stages).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&stages).into_diagnostic()?;
            print!("{}", yaml);
        }
        _ => {
            println!(
                "{:<16} {:>12}",
                style("ETAPA").bold(),
                style("DÍAS HÁBILES").bold()
            );
            println!("{}", "-".repeat(30));
            for entry in &stages {
                println!("{:<16} {:>12}", entry.stage_key, entry.days_to_due);
            }
        }
    }

    Ok(())
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;

    let registry = SlaRegistry::new(&gateway);
    registry
        .upsert_stage(&tenant, &args.etapa, args.dias)
        .into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} SLA de {} fijado en {} día(s) hábil(es); solo afecta etapas futuras",
            style("✓").green(),
            style(&args.etapa).cyan(),
            style(args.dias).cyan()
        );
    }

    Ok(())
}

fn run_rm(args: RmArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;

    let registry = SlaRegistry::new(&gateway);
    let removed = registry
        .delete_stage(&tenant, &args.etapa)
        .into_diagnostic()?;

    if global.quiet {
        return Ok(());
    }

    if removed {
        println!(
            "{} SLA de {} eliminado",
            style("✓").green(),
            style(&args.etapa).cyan()
        );
    } else {
        println!(
            "{} No había SLA para {}",
            style("·").dim(),
            style(&args.etapa).cyan()
        );
    }

    Ok(())
}
