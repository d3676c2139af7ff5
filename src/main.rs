//! cmdhist CLI entry point.

use clap::Parser;
use cmdhist::cli::{commands, Cli, Commands};
use cmdhist::config::ConfigStore;
use cmdhist::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The daemon owns its own file-backed subscriber.
    if !matches!(cli.command, Commands::Daemon(_)) {
        init_tracing(cli.verbose, cli.quiet);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use the verbosity flag.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("cmdhist=info"),
            2 => EnvFilter::new("cmdhist=debug"),
            _ => EnvFilter::new("cmdhist=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let conf = ConfigStore::resolve(cli.base_dir.as_deref())?;
    match &cli.command {
        Commands::Init(args) => commands::init::execute(&conf, args),
        Commands::Record(args) => commands::record::execute(&conf, args),
        Commands::Daemon(args) => commands::daemon::execute(&conf, args),
        Commands::Index(args) => commands::index::execute(&conf, args),
        Commands::Search(args) => commands::search::execute(&conf, args),
        Commands::Show(args) => commands::show::execute(&conf, args),
        Commands::Isearch(args) => commands::isearch::execute(&conf, args),
        Commands::Locate { target } => commands::locate::execute(&conf, *target),
        Commands::Version => commands::version::execute(),
        Commands::Completions { shell } => commands::completions::execute(*shell),
    }
}
