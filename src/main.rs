use clap::Parser;
use convive::cli::{Cli, Commands};
use miette::Result;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }

    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    match cli.command {
        Commands::Init(args) => convive::cli::commands::init::run(args),
        Commands::Colegio(cmd) => convive::cli::commands::colegio::run(cmd, &global),
        Commands::Caso(cmd) => convive::cli::commands::caso::run(cmd, &global),
        Commands::Sla(cmd) => convive::cli::commands::sla::run(cmd, &global),
        Commands::Plazos(args) => convive::cli::commands::plazos::run(args, &global),
        Commands::Completions(args) => convive::cli::commands::completions::run(args),
    }
}
