//! `convive caso` command - case lifecycle management

use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::helpers::{
    escape_csv, format_short_id, open_gateway, resolve_tenant, style_urgency, truncate_str,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::urgency::UrgencyResult;
use crate::core::workflow::{CaseClosure, CaseWorkflow, NewCase, StageDetails, StageResolution};
use crate::core::{CasesQuery, Config};
use crate::entities::case::{Case, CaseStatus, ConductGravity};
use crate::entities::followup::Followup;

#[derive(Subcommand, Debug)]
pub enum CasoCommands {
    /// List cases with filtering and pagination
    List(ListArgs),

    /// Create a new case
    New(NewArgs),

    /// Show a case with its stage history
    Show(ShowArgs),

    /// Start (or resume) the due-process seguimiento of a case
    Seguimiento(SeguimientoArgs),

    /// Open the next due-process stage of a case
    Etapa(EtapaArgs),

    /// Resolve the case's open stage
    Done(DoneArgs),

    /// Close a case
    Close(CloseArgs),
}

/// Case status filter
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Reportado,
    Seguimiento,
    Cerrado,
    All,
}

impl StatusFilter {
    fn as_status(self) -> Option<CaseStatus> {
        match self {
            StatusFilter::Reportado => Some(CaseStatus::Reportado),
            StatusFilter::Seguimiento => Some(CaseStatus::EnSeguimiento),
            StatusFilter::Cerrado => Some(CaseStatus::Cerrado),
            StatusFilter::All => None,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Filter by status
    #[arg(long, short = 's', default_value = "all")]
    pub status: StatusFilter,

    /// Exclude a status (e.g. cerrado for the active worklist)
    #[arg(long)]
    pub exclude_status: Option<StatusFilter>,

    /// Search in student, course and conduct
    #[arg(long)]
    pub search: Option<String>,

    /// Page number (1-indexed)
    #[arg(long, short = 'p', default_value_t = 1)]
    pub page: u32,

    /// Rows per page
    #[arg(long, default_value_t = 20)]
    pub page_size: u32,

    /// Show only the filtered total
    #[arg(long)]
    pub count: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "auto")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Tenant (school) scope
    #[arg(long, short = 'c')]
    pub colegio: Option<String>,

    /// Student the case concerns
    #[arg(long, short = 'e')]
    pub estudiante: Option<String>,

    /// Incident date (default: today)
    #[arg(long)]
    pub fecha: Option<NaiveDate>,

    /// Incident time (HH:MM:SS)
    #[arg(long)]
    pub hora: Option<NaiveTime>,

    /// Course/section
    #[arg(long)]
    pub curso: Option<String>,

    /// Conduct gravity (leve, grave, gravisima)
    #[arg(long, short = 'g')]
    pub gravedad: Option<ConductGravity>,

    /// Incident description
    #[arg(long, short = 'd')]
    pub descripcion: Option<String>,

    /// Immediately start the due-process seguimiento
    #[arg(long)]
    pub seguimiento: bool,

    /// Interactive mode (prompt for fields)
    #[arg(long, short = 'i')]
    pub interactive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Case id (CASO-...)
    pub id: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "yaml")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct SeguimientoArgs {
    /// Case id (CASO-...)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct EtapaArgs {
    /// Case id (CASO-...)
    pub id: String,

    /// Process stage key (indagacion, citacion, descargos, ...)
    #[arg(long, short = 'e')]
    pub etapa: String,

    /// Kind of action taken
    #[arg(long)]
    pub tipo: Option<String>,

    /// Action date (default: today)
    #[arg(long)]
    pub fecha: Option<NaiveDate>,

    /// Responsible person (default: configured responsible)
    #[arg(long, short = 'r')]
    pub responsable: Option<String>,

    /// Observations
    #[arg(long)]
    pub obs: Option<String>,

    /// Additional detail
    #[arg(long)]
    pub detalle: Option<String>,

    /// Evidence reference (repeatable)
    #[arg(long = "evidencia")]
    pub evidencias: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct DoneArgs {
    /// Case id (CASO-...)
    pub id: String,

    /// Resolve acknowledging the stage ran past its deadline
    #[arg(long)]
    pub vencida: bool,
}

#[derive(clap::Args, Debug)]
pub struct CloseArgs {
    /// Case id (CASO-...)
    pub id: String,

    /// Closure resolution text
    #[arg(long)]
    pub resolucion: Option<String>,

    /// Disciplinary measure applied
    #[arg(long)]
    pub medida: Option<String>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Case detail for structured output
#[derive(Serialize)]
struct CaseDetail {
    #[serde(flatten)]
    case: Case,
    plazo: UrgencyResult,
    seguimientos: Vec<Followup>,
}

/// Run a caso subcommand
pub fn run(cmd: CasoCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CasoCommands::List(args) => run_list(args, global),
        CasoCommands::New(args) => run_new(args, global),
        CasoCommands::Show(args) => run_show(args, global),
        CasoCommands::Seguimiento(args) => run_seguimiento(args, global),
        CasoCommands::Etapa(args) => run_etapa(args, global),
        CasoCommands::Done(args) => run_done(args, global),
        CasoCommands::Close(args) => run_close(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;

    let mut query = CasesQuery::new(tenant.clone())
        .page(args.page)
        .page_size(args.page_size);
    if let Some(status) = args.status.as_status() {
        query = query.status(status);
    }
    if let Some(excluded) = args.exclude_status.and_then(StatusFilter::as_status) {
        query = query.exclude_status(excluded);
    }
    if let Some(ref search) = args.search {
        query = query.search(search.clone());
    }

    let page = gateway.cases_page(&query).into_diagnostic()?;

    if args.count {
        println!("{}", page.total);
        return Ok(());
    }

    if page.rows.is_empty() {
        println!("No hay casos.");
        return Ok(());
    }

    let ids: Vec<_> = page.rows.iter().map(|c| c.id.clone()).collect();
    let plazos = gateway
        .plazos_resumen_many(&tenant, &ids)
        .into_diagnostic()?;
    let plazo_of = |case: &Case| {
        plazos
            .get(&case.id.to_string())
            .cloned()
            .unwrap_or(UrgencyResult {
                alerta_urgencia: "SIN PLAZO".to_string(),
                dias_restantes: None,
            })
    };

    let format = if args.format == OutputFormat::Auto {
        OutputFormat::Tsv
    } else {
        args.format
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&page.rows).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&page.rows).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Csv => {
            println!("id,estudiante,curso,gravedad,estado,alerta,dias_restantes");
            for case in &page.rows {
                let plazo = plazo_of(case);
                println!(
                    "{},{},{},{},{},{},{}",
                    case.id,
                    escape_csv(&case.student),
                    escape_csv(case.course.as_deref().unwrap_or("")),
                    case.conduct.map(|g| g.to_string()).unwrap_or_default(),
                    case.status,
                    escape_csv(&plazo.alerta_urgencia),
                    plazo
                        .dias_restantes
                        .map(|d| d.to_string())
                        .unwrap_or_default()
                );
            }
        }
        OutputFormat::Id => {
            for case in &page.rows {
                println!("{}", case.id);
            }
        }
        OutputFormat::Tsv | OutputFormat::Auto => {
            println!(
                "{:<17} {:<24} {:<8} {:<10} {:<15} {:<12}",
                style("ID").bold(),
                style("ESTUDIANTE").bold(),
                style("CURSO").bold(),
                style("GRAVEDAD").bold(),
                style("ESTADO").bold(),
                style("PLAZO").bold()
            );
            println!("{}", "-".repeat(92));

            for case in &page.rows {
                let plazo = plazo_of(case);
                println!(
                    "{:<17} {:<24} {:<8} {:<10} {:<15} {:<12}",
                    format_short_id(&case.id),
                    truncate_str(&case.student, 22),
                    case.course.as_deref().unwrap_or("-"),
                    case.conduct.map(|g| g.to_string()).unwrap_or_default(),
                    case.status,
                    style_urgency(&plazo)
                );
            }

            if !global.quiet {
                println!();
                println!(
                    "{} de {} caso(s), página {}",
                    style(page.rows.len()).cyan(),
                    style(page.total).cyan(),
                    args.page
                );
            }
        }
    }

    Ok(())
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let tenant = resolve_tenant(&args.colegio, &config)?;
    let workflow = CaseWorkflow::new(&gateway);

    let (student, gravedad, descripcion) = if args.interactive || args.estudiante.is_none() {
        use dialoguer::{Input, Select};

        let student: String = Input::new()
            .with_prompt("Estudiante")
            .interact_text()
            .into_diagnostic()?;

        let gravity_options = ["leve", "grave", "gravisima"];
        let gravity_idx = Select::new()
            .with_prompt("Gravedad de la conducta")
            .items(&gravity_options)
            .default(0)
            .interact()
            .into_diagnostic()?;
        let gravedad: ConductGravity = gravity_options[gravity_idx].parse().unwrap_or_default();

        let descripcion: String = Input::new()
            .with_prompt("Descripción")
            .allow_empty(true)
            .interact_text()
            .into_diagnostic()?;

        (
            Some(student),
            Some(gravedad),
            Some(descripcion).filter(|d: &String| !d.is_empty()),
        )
    } else {
        (args.estudiante, args.gravedad, args.descripcion)
    };

    let payload = NewCase {
        tenant_id: Some(tenant),
        student,
        incident_date: Some(args.fecha.unwrap_or_else(|| Local::now().date_naive())),
        incident_time: args.hora,
        course: args.curso,
        conduct: gravedad,
        description: descripcion,
        status: None,
    };

    let case = workflow.create_case(payload).into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Caso creado {}",
            style("✓").green(),
            style(&case.id).cyan()
        );
    }

    if args.seguimiento {
        workflow
            .start_seguimiento(&case.id.to_string())
            .into_diagnostic()?;
        if !global.quiet {
            println!(
                "{} Seguimiento iniciado (etapa indagación)",
                style("✓").green()
            );
        }
    }

    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let workflow = CaseWorkflow::new(&gateway);

    let case = workflow.get_case(&args.id).into_diagnostic()?;
    let seguimientos = workflow.stage_history(&args.id).into_diagnostic()?;
    let plazos = gateway
        .plazos_resumen_many(&case.tenant_id, std::slice::from_ref(&case.id))
        .into_diagnostic()?;
    let plazo = plazos
        .get(&case.id.to_string())
        .cloned()
        .unwrap_or(UrgencyResult {
            alerta_urgencia: "SIN PLAZO".to_string(),
            dias_restantes: None,
        });

    let detail = CaseDetail {
        case,
        plazo,
        seguimientos,
    };

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&detail).into_diagnostic()?;
            println!("{}", json);
        }
        _ => {
            let yaml = serde_yml::to_string(&detail).into_diagnostic()?;
            print!("{}", yaml);
        }
    }

    Ok(())
}

fn run_seguimiento(args: SeguimientoArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let workflow = CaseWorkflow::new(&gateway);

    let started = workflow.start_seguimiento(&args.id).into_diagnostic()?;

    if global.quiet {
        return Ok(());
    }

    if started {
        println!(
            "{} Seguimiento activo para {}",
            style("✓").green(),
            style(&args.id).cyan()
        );
    } else {
        println!(
            "{} El caso {} no admite seguimiento (inexistente o cerrado)",
            style("·").dim(),
            style(&args.id).cyan()
        );
    }

    Ok(())
}

fn run_etapa(args: EtapaArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let config = Config::load();
    let workflow = CaseWorkflow::new(&gateway);

    let details = StageDetails {
        action_type: args.tipo,
        action_date: args.fecha,
        responsible: args.responsable.or_else(|| Some(config.responsible())),
        observations: args.obs,
        detail: args.detalle,
        evidence_refs: args.evidencias,
    };

    let followup = workflow
        .advance_stage(&args.id, &args.etapa, details)
        .into_diagnostic()?;

    if !global.quiet {
        let due = followup
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} Etapa {} abierta, vence el {}",
            style("✓").green(),
            style(&followup.process_stage).cyan(),
            style(due).cyan()
        );
    }

    Ok(())
}

fn run_done(args: DoneArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let workflow = CaseWorkflow::new(&gateway);

    let resolution = if args.vencida {
        StageResolution::OverdueAcknowledged
    } else {
        StageResolution::Done
    };

    let followup = workflow
        .complete_stage(&args.id, resolution)
        .into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Etapa {} resuelta ({})",
            style("✓").green(),
            style(&followup.process_stage).cyan(),
            followup.stage_status
        );
    }

    Ok(())
}

fn run_close(args: CloseArgs, global: &GlobalOpts) -> Result<()> {
    let (_, gateway) = open_gateway(global)?;
    let workflow = CaseWorkflow::new(&gateway);

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("¿Cerrar el caso {}?", args.id))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Cierre cancelado.");
            return Ok(());
        }
    }

    let closure = CaseClosure {
        resolution: args.resolucion,
        measure: args.medida,
    };
    let case = workflow.close_case(&args.id, closure).into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Caso {} cerrado el {}",
            style("✓").green(),
            style(&case.id).cyan(),
            case.closed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        );
    }

    Ok(())
}
