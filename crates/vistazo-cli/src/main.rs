//! Vistazo CLI
//!
//! ## Usage
//!
//! ```bash
//! vistazo base-url --set port=8080          # Base URL tests would open
//! vistazo config --format yaml              # Resolved runner configuration
//! vistazo diff shot.png baseline.png --fail # Compare against a baseline
//! ```

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vistazo_cli::{
    handlers::{run_base_url, run_config, run_diff},
    Cli, CliConfig, CliResult, Commands, Verbosity,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::new().with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose));
    init_logging(config.verbosity);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, config: &CliConfig) -> CliResult<()> {
    match cli.command {
        Commands::BaseUrl(args) => {
            match run_base_url(&args)? {
                Some(url) => println!("{url}"),
                None if !config.verbosity.is_quiet() => eprintln!("base URL suppressed"),
                None => {}
            }
            Ok(())
        }
        Commands::Config(args) => {
            println!("{}", run_config(&args)?);
            Ok(())
        }
        Commands::Diff(args) => {
            let outcome = run_diff(&args)?;
            if !config.verbosity.is_quiet() {
                println!("{}", outcome.summary(args.max_deviation));
                if config.verbosity.is_verbose() {
                    println!(
                        "compared {} against {} (color threshold {})",
                        args.actual.display(),
                        args.baseline.display(),
                        args.color_threshold
                    );
                }
                if let Some(path) = &outcome.diff_path {
                    println!("diff image: {}", path.display());
                }
            }
            Ok(())
        }
    }
}
