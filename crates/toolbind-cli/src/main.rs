//! `toolbind` — operational CLI for the binding lifecycle: generate or
//! refresh bindings, inspect their freshness, and smoke-test a host.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use toolbind_codegen::{BindingManager, Freshness};
use toolbind_core::HostsConfig;
use toolbind_mcp::ToolBridge;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolbind", about = "Toolbind — typed bindings for remote tool hosts")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "toolbind.toml")]
    config: PathBuf,

    /// Directory holding generated bindings
    #[arg(long, default_value = "bindings")]
    bindings_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or refresh bindings for all configured hosts
    Generate {
        /// Regenerate even when bindings are fresh
        #[arg(long)]
        force: bool,
        /// Timeout for the whole regeneration batch, in seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Show each host's binding freshness without connecting anywhere
    Status,
    /// Invoke one tool on one host and print the decoded result
    Call {
        /// Host name from the config
        host: String,
        /// Qualified tool name
        tool: String,
        /// JSON input for the tool
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = HostsConfig::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("failed to load '{}': {e}", cli.config.display()))?;

    match cli.command {
        Commands::Generate {
            force,
            timeout_secs,
        } => {
            info!(hosts = config.len(), force, "ensuring bindings");
            let manager = BindingManager::new(config, &cli.bindings_dir);
            let report = manager
                .ensure_bindings(force, Duration::from_secs(timeout_secs))
                .await;

            for host in &report.hosts {
                let state = match (host.ready, host.degraded) {
                    (true, false) => "ready",
                    (true, true) => "ready (degraded)",
                    _ => "FAILED",
                };
                println!("{:<20} {:<18} {} tool(s)", host.host, state, host.tool_count);
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            for error in &report.errors {
                println!("error: {error}");
            }

            if !report.success {
                anyhow::bail!("binding generation failed for {} host(s)", report.errors.len());
            }
        }
        Commands::Status => {
            if config.is_empty() {
                println!("No hosts configured.");
                println!("Configure hosts in toolbind.toml under [hosts.<name>]");
                return Ok(());
            }

            let manager = BindingManager::new(config.clone(), &cli.bindings_dir);
            let mut names: Vec<&str> = config.hosts().map(|h| h.name.as_str()).collect();
            names.sort_unstable();

            for name in names {
                match manager.classify(name).await {
                    Freshness::Missing => println!("{name:<20} missing"),
                    state => {
                        let metadata = manager.generator().read_metadata(name).await;
                        let label = match state {
                            Freshness::Fresh => "fresh",
                            _ => "stale",
                        };
                        match metadata {
                            Some(m) => println!(
                                "{name:<20} {label:<8} {} tool(s), generated {}",
                                m.tool_count,
                                m.generated_at.format("%Y-%m-%d %H:%M UTC")
                            ),
                            None => println!("{name:<20} {label}"),
                        }
                    }
                }
            }
        }
        Commands::Call { host, tool, input } => {
            let input: serde_json::Value = serde_json::from_str(&input)
                .map_err(|e| anyhow::anyhow!("--input is not valid JSON: {e}"))?;

            let bridge = ToolBridge::new(config);
            let output = bridge.invoke(&host, &tool, input).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
