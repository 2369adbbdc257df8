//! `convive init` command - Initialize a new Convive workspace

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::core::{CaseGateway, Project};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    let project = Project::init(&path).into_diagnostic()?;

    // open once so the store file and schema exist from the start
    CaseGateway::open(&project.store_path()).into_diagnostic()?;

    println!(
        "{} Espacio Convive creado en {}",
        style("✓").green(),
        style(project.root().display()).cyan()
    );
    println!(
        "  Siguiente paso: {} para incorporar un colegio",
        style("convive colegio add <id>").cyan()
    );

    Ok(())
}
