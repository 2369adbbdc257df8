//! `convive colegio` command - school (tenant) onboarding

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::open_gateway;
use crate::cli::GlobalOpts;
use crate::core::identity::TenantId;
use crate::core::SlaRegistry;

#[derive(Subcommand, Debug)]
pub enum ColegioCommands {
    /// Onboard a school: seeds the default stage SLAs
    Add(AddArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Tenant id of the school
    pub colegio: String,
}

pub fn run(cmd: ColegioCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ColegioCommands::Add(args) => run_add(args, global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let tenant = TenantId::new(args.colegio).into_diagnostic()?;

    let registry = SlaRegistry::new(&gateway);
    let created = registry.seed_defaults(&tenant).into_diagnostic()?;

    if global.quiet {
        return Ok(());
    }

    if created > 0 {
        println!(
            "{} Colegio {} incorporado: {} etapa(s) con SLA por defecto",
            style("✓").green(),
            style(tenant.as_str()).cyan(),
            style(created).cyan()
        );
    } else {
        println!(
            "{} Colegio {} ya estaba incorporado; SLAs existentes intactos",
            style("·").dim(),
            style(tenant.as_str()).cyan()
        );
    }

    Ok(())
}
