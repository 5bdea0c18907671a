use anyhow::Context;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pkgsift::commands::{self, CacheAction, CommandContext};
use pkgsift::perf::PERF_DIRECTIVE;
use pkgsift::PkgsiftSettings;

/// Search every package manager on this machine at once and pick results with fzf.
#[derive(Parser)]
#[clap(author, version = clap::crate_version!(), max_term_width = 100, about)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Comma-separated package managers to search (default: all detected)
    #[clap(short, long, global = true, value_name = "MANAGERS")]
    manager: Option<String>,

    /// Increase logging level
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick packages interactively and print the selected rows
    Search {
        /// Initial query; several words are joined with spaces
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Print ranked `manager<TAB>package<TAB>description` rows
    Feed {
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Replacement list for a live reload (run by fzf)
    #[clap(hide = true)]
    Reload {
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Push a live reload to the running fzf (run by fzf)
    #[clap(hide = true)]
    Notify {
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Inspect or reset the result cache
    #[clap(subcommand)]
    Cache(CacheCommands),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// List supported environment variables
    Env,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show entry counts and sizes
    Stats,
    /// Delete every cached entry
    Clear,
    /// Rebuild installed-package lists in the background and wait for them
    Refresh,
}

impl From<&CacheCommands> for CacheAction {
    fn from(value: &CacheCommands) -> Self {
        match value {
            CacheCommands::Stats => CacheAction::Stats,
            CacheCommands::Clear => CacheAction::Clear,
            CacheCommands::Refresh => CacheAction::Refresh,
        }
    }
}

fn init_tracing(verbose: u8, perf_trace: bool) -> Result<(), anyhow::Error> {
    let log_level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    if perf_trace {
        env_filter = env_filter.add_directive(PERF_DIRECTIVE.parse()?);
    }

    // stdout is the data channel fzf reads
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn joined(words: &[String]) -> String {
    words.join(" ")
}

pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        generate(*shell, &mut Cli::command(), "pkgsift", &mut std::io::stdout());
        return Ok(());
    }

    let settings = PkgsiftSettings::load()?;
    init_tracing(cli.verbose, settings.perf_trace)?;
    debug!("Argument parsing complete.");

    let ctx = CommandContext::system(settings);
    let managers = cli.manager.as_deref();

    match command {
        Commands::Search { query } => commands::search_command(&ctx, managers, &joined(query)).await?,
        Commands::Feed { query } => commands::feed_command(&ctx, managers, &joined(query)).await?,
        Commands::Reload { query } => commands::reload_command(&ctx, &joined(query)).await?,
        Commands::Notify { query } => commands::notify_command(&ctx, &joined(query)).await?,
        Commands::Cache(action) => commands::cache_command(&ctx, action.into(), managers).await?,
        Commands::Env => commands::env_command()?,
        Commands::Completions { .. } => unreachable!("Completions should be handled before this point"),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
