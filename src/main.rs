use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser};
use proflow::{Config, ProfileCommand, ProflowError, ToolOverrides, profile_command};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

mod cli_logger;

use cli_logger::CliLogger;

#[derive(Debug, Parser)]
#[command(name = "proflow", version, about = "Build a local program and profile it with perf or cachegrind")]
struct Cli {
    /// Working directory holding the project and all profiling artifacts.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    workdir: PathBuf,

    /// Config file (default: <workdir>/proflow.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    tools: ToolOverrides,

    #[command(subcommand)]
    command: ProfileCommand,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let logger = CliLogger::new(cli.json, cli.no_color);

    match run(&cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            let code = err
                .downcast_ref::<ProflowError>()
                .map(ProflowError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli, logger: &CliLogger) -> Result<()> {
    let workdir = std::fs::canonicalize(&cli.workdir)
        .with_context(|| format!("working directory {}", cli.workdir.display()))?;
    let mut config = Config::for_working_dir(&workdir, cli.config.as_deref());
    cli.tools.apply(&mut config)?;

    // The running child gets the terminal's SIGINT itself; we only record it
    // so that no further stage starts.
    let interrupt = config.interrupt.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::debug!("received Ctrl+C, aborting pipeline");
        interrupt.request();
    }) {
        logger.print_warning(&format!("cannot install Ctrl+C handler: {err}"));
    }

    let output = profile_command(&config, &cli.command)?;
    logger.print_output(&output)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
