mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dockyard",
    about = "Clone, build, publish, and launch a multi-service container stack"
)]
#[command(version)]
struct Cli {
    /// Path to the config file (default: ./dockyard.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: source, recipes, publish, launch
    Up {
        /// Print a per-stage summary when the run ends
        #[arg(long)]
        narrate: bool,
    },
    /// Clone the source repository if it is not already present
    Source,
    /// Check every service for a Dockerfile, writing placeholders where missing
    Verify,
    /// Log in, then build, run, and push every service image
    Publish,
    /// Free the stack's ports, write the compose manifest, and start the stack
    Compose,
    /// Stop running containers that publish any of the given host ports
    FreePorts {
        /// Host ports to free
        #[arg(required = true)]
        ports: Vec<u16>,
    },
    /// Show the resolved configuration (the registry secret is never printed)
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that git, docker, and docker-compose are available
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        // arch-lint: allow(no-error-swallowing) reason=".env is optional; the process environment still applies"
        Err(e) if e.not_found() => tracing::debug!("no .env file"),
        // arch-lint: allow(no-error-swallowing) reason="an unreadable .env must not block commands that need no settings from it"
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Up { narrate } => commands::up(config, narrate).await?,
        Commands::Source => commands::source(config).await?,
        Commands::Verify => commands::verify(config)?,
        Commands::Publish => commands::publish(config).await?,
        Commands::Compose => commands::compose(config).await?,
        Commands::FreePorts { ports } => commands::free_ports(config, &ports).await?,
        Commands::Config { json } => commands::show_config(config, json)?,
        Commands::Doctor => commands::doctor(config).await?,
    }

    Ok(())
}
