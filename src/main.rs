//! Trellis - streaming server-side templates
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trellis::cli::{commands, Cli, Commands};
use trellis::config::ConfigManager;
use trellis::error::{TrellisError, TrellisResult};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, json: bool) {
    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let default = match verbose {
        0 => "trellis=warn",
        1 => "trellis=info",
        _ => "trellis=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> TrellisResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions { shell } = &cli.command {
        return commands::completions(*shell);
    }

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| TrellisError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let mut config = manager.load_merged(local_config_path.as_deref()).await?;

    let verbose = cli.verbose.max(u8::from(config.general.verbose));
    init_logging(verbose, config.general.log_format == "json");

    if let Some(ref path) = local_config_path {
        debug!("Using local config: {}", path.display());
    }
    if let Some(root) = cli.root {
        config.project.root = root;
    }

    match cli.command {
        Commands::Completions { .. } => unreachable!("completions handled above"),
        Commands::Serve(args) => commands::serve(args, &config).await,
        Commands::Render(args) => commands::render(args, &config).await,
        Commands::Build(args) => commands::build(args, &config).await,
        Commands::Routes(args) => commands::routes(args, &config).await,
        Commands::Cache(args) => commands::cache(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &manager).await,
    }
}
