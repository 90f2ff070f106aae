#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "baily")]
#[command(author, version, about = "A dev-environment bootstrap for single-page apps", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Start the development server
    Start {
        /// Port to listen on (overrides the PORT environment variable)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides the HOST environment variable)
        #[arg(long)]
        host: Option<String>,

        /// Mode used for .env loading and the injected NODE_ENV
        #[arg(long, default_value = "development")]
        mode: String,

        /// Resolve the full configuration and print it without binding
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Start {
            port,
            host,
            mode,
            dry_run,
        }) => {
            // --json requires exactly one output object; a running server
            // streams output, so only the dry run may combine with it.
            if cli.json && !dry_run {
                eprintln!("error: --json and start cannot be combined without --dry-run");
                eprintln!("hint: use --dry-run to print the resolved configuration as JSON");
                std::process::exit(2);
            }

            let action = commands::start::StartAction {
                cwd,
                port,
                host,
                mode,
                dry_run,
                json: cli.json,
            };

            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(commands::start::run(action))
        }
    }
}
