//! personatest CLI - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use personatest_cli::client::WebClient;
use personatest_cli::commands::{persona, run};
use personatest_cli::output::{self, print_error, print_success};
use personatest_common::AppConfig;

/// personatest - synthetic personas and simulated website testing
#[derive(Parser)]
#[command(name = "personatest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "PERSONATEST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a URL can be tested
    Validate(persona::ValidateArgs),

    /// List offline placeholder personas
    Placeholders {
        /// Number of personas
        #[arg(short, long, default_value = "5")]
        count: usize,
    },

    /// Generate personas through the generate endpoint
    Generate(persona::GenerateArgs),

    /// Generate personas for a site and test it
    Run(run::RunArgs),

    /// Check web server status
    Status {
        /// Server address, defaults to the configured listen address
        #[arg(long)]
        server: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;
    config.apply_env()?;
    config.validate()?;

    match cli.command {
        Commands::Validate(args) => persona::validate(args, &config, cli.format).await?,
        Commands::Placeholders { count } => persona::placeholders(count, cli.format),
        Commands::Generate(args) => persona::generate(args, &config, cli.format).await?,
        Commands::Run(args) => run::execute(args, &config, cli.format).await?,
        Commands::Status { server } => {
            let addr = server.unwrap_or_else(|| config.server.listen.clone());
            let client = WebClient::new(&addr)?;
            match client.health().await {
                Ok(health) if cli.format.is_interactive() => print_success(&format!(
                    "{} is running at {} ({} sessions)",
                    health.service,
                    client.base_url(),
                    health.sessions.unwrap_or(0)
                )),
                Ok(health) => output::print_value(&health, &health.status, cli.format),
                Err(e) => {
                    print_error(&format!("Web server is not responding at {}: {:#}", client.base_url(), e));
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("personatest v{}", personatest_common::VERSION);
            println!("Synthetic personas and simulated website testing");
        }
    }

    Ok(())
}
