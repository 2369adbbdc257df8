//! `convive plazos` command - deadline overview for open cases

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{
    format_short_id, open_gateway, resolve_tenant, style_urgency, truncate_str,
};
use crate::cli::GlobalOpts;
use crate::core::urgency::UrgencyResult;
use crate::core::{CasesQuery, Config};
use crate::entities::case::CaseStatus;

#[derive(clap::Args, Debug)]
pub struct PlazosArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Page number (1-indexed)
    #[arg(long, short = 'p', default_value_t = 1)]
    pub page: u32,

    /// Rows per page
    #[arg(long, default_value_t = 50)]
    pub page_size: u32,
}

pub fn run(args: PlazosArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;

    let query = CasesQuery::new(tenant.clone())
        .exclude_status(CaseStatus::Cerrado)
        .page(args.page)
        .page_size(args.page_size);
    let page = gateway.cases_page(&query).into_diagnostic()?;

    if page.rows.is_empty() {
        println!("No hay casos abiertos.");
        return Ok(());
    }

    let ids: Vec<_> = page.rows.iter().map(|c| c.id.clone()).collect();
    let plazos = gateway
        .plazos_resumen_many(&tenant, &ids)
        .into_diagnostic()?;

    println!(
        "{:<17} {:<24} {:<15} {:<12} {:>6}",
        style("ID").bold(),
        style("ESTUDIANTE").bold(),
        style("ESTADO").bold(),
        style("ALERTA").bold(),
        style("DÍAS").bold()
    );
    println!("{}", "-".repeat(78));

    for case in &page.rows {
        let plazo = plazos
            .get(&case.id.to_string())
            .cloned()
            .unwrap_or(UrgencyResult {
                alerta_urgencia: "SIN PLAZO".to_string(),
                dias_restantes: None,
            });
        println!(
            "{:<17} {:<24} {:<15} {:<12} {:>6}",
            format_short_id(&case.id),
            truncate_str(&case.student, 22),
            case.status,
            style_urgency(&plazo),
            plazo
                .dias_restantes
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    if !global.quiet {
        println!();
        println!(
            "{} de {} caso(s) abierto(s)",
            style(page.rows.len()).cyan(),
            style(page.total).cyan()
        );
    }

    Ok(())
}
