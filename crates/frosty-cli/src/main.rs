#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

mod commands;
mod logging;

use clap::Parser;
use frosty_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "frosty")]
#[command(author, version, about = "An npm-compatible package installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(short = 'C', long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Install the dependencies listed in package.json
    Install(commands::install::InstallArgs),

    /// Show which published version a range selects
    Resolve {
        /// Package name (e.g. "react" or "@types/node")
        name: String,

        /// Version range (defaults to the newest release)
        range: Option<String>,
    },

    /// Inspect the module cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// List every indexed (name, specifier) and the directory it points to
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::from_env(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) => commands::version::run(cli.json),
        Some(Commands::Install(args)) => commands::install::run(config, args, cli.json),
        Some(Commands::Resolve { name, range }) => {
            commands::resolve::run(&config, &name, range.as_deref(), cli.json)
        }
        Some(Commands::Cache {
            action: CacheCommands::List,
        }) => commands::cache::list(&config, cli.json),
        None => {
            println!("frosty {}", frosty_core::VERSION);
            println!("Run 'frosty --help' for usage information.");
            Ok(())
        }
    }
}
