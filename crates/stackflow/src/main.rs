mod commands;
mod exit;
mod report;
mod workspace;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use report::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "Declarative, idempotent provisioning of cloud stacks and resources", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Blueprint file (default: stackflow.yaml discovered from the current directory)
    #[arg(long, global = true)]
    pub blueprint: Option<PathBuf>,

    /// OpenStack cloud name from clouds.yaml
    #[arg(long, global = true)]
    pub cloud: Option<String>,

    /// Name prefix for managed resources
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update resources until they match the blueprint
    Apply {
        /// Resources to reconcile, with everything they depend on (default: all)
        roots: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Show what apply would do without changing anything
    Plan {
        /// Resources to plan, with everything they depend on (default: all)
        roots: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Delete resources, dependents first
    Destroy {
        /// Resources to delete, with everything they depend on (default: all)
        roots: Vec<String>,
        /// Actually delete; without it the resources are only listed
        #[arg(short, long)]
        yes: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Check the blueprint, its templates and the dependency graph
    Validate,
    /// Show version information
    Version,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancels `token` on Ctrl-C; the run stops before the next resource
///
/// A second Ctrl-C exits immediately.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            "Interrupted, stopping after the current resource (Ctrl-C again to abort)...".yellow()
        );
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Aborted".red());
            std::process::exit(i32::from(exit::CANCELLED));
        }
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let result = match cli.command {
        Commands::Apply { roots, output } => {
            commands::apply::handle(&cli.global, &roots, output, false, cancel).await
        }
        Commands::Plan { roots, output } => {
            commands::apply::handle(&cli.global, &roots, output, true, cancel).await
        }
        Commands::Destroy { roots, yes, output } => {
            commands::destroy::handle(&cli.global, &roots, yes, output, cancel).await
        }
        Commands::Validate => commands::validate::handle(&cli.global),
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            exit::code_for(&err)
        }
    }
}
