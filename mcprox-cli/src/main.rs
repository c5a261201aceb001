//! Thin CLI entry point: parses arguments, wires an `AppContext` with the
//! store-backed default collaborators, and dispatches to a handful of
//! inspection/administration subcommands. No HTTP or stdio protocol surface
//! lives here — that binding is out of scope per spec.md §1.

mod cli;
mod unconfigured_transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mcprox_activity::Filter;
use mcprox_app::{AppContext, Collaborators, HealthSurface, LogManager};
use mcprox_config::ProxyConfig;
use tracing::info;

use cli::{ActivityCommands, Cli, Commands, ServerCommands};
use unconfigured_transport::UnconfiguredTransportFactory;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logs = LogManager::init(&cli.log_level);

    if let Commands::ConfigValidate { path } = &cli.command {
        let config = ProxyConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        println!("{} is valid: {:#?}", path.display(), config);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ProxyConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ProxyConfig::default(),
    };

    let ctx = AppContext::new(
        config,
        Collaborators {
            transport_factory: Arc::new(UnconfiguredTransportFactory),
            oauth: None,
            isolation: None,
            index: None,
        },
    )
    .context("constructing AppContext")?;

    let result = run_command(&ctx, cli.command).await;

    if let Err(e) = ctx.close().await {
        info!(error = %e, "AppContext close reported an error");
    }

    result
}

async fn run_command(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::ConfigValidate { .. } => unreachable!("handled before AppContext construction"),

        Commands::Server { command } => match command {
            ServerCommands::List => {
                for stat in ctx.upstream().get_stats().await {
                    println!(
                        "{:<24} state={:<12} tools={:<4} enabled={} quarantined={}",
                        stat.name, stat.state, stat.tool_count, stat.enabled, stat.quarantined
                    );
                }
                Ok(())
            }
            ServerCommands::SetEnabled { name, enabled } => {
                ctx.upstream()
                    .set_enabled(&name, enabled)
                    .await
                    .with_context(|| format!("setting enabled={enabled} on {name}"))?;
                println!("{name}: enabled={enabled}");
                Ok(())
            }
            ServerCommands::SetQuarantined { name, quarantined } => {
                ctx.upstream()
                    .set_quarantined(&name, quarantined)
                    .await
                    .with_context(|| format!("setting quarantined={quarantined} on {name}"))?;
                println!("{name}: quarantined={quarantined}");
                Ok(())
            }
        },

        Commands::Activity { command } => match command {
            ActivityCommands::List { limit, server } => {
                let mut filter = Filter::new();
                filter.limit = Some(limit);
                filter.server = server;
                let (records, total) = ctx.activity().list(&filter)?;
                for record in &records {
                    println!(
                        "{} {:?} server={:?} tool={:?} status={:?}",
                        record.timestamp, record.activity_type, record.server_name, record.tool_name, record.status
                    );
                }
                println!("({} of {} matching records shown)", records.len(), total);
                Ok(())
            }
        },

        Commands::Health => {
            let health_config = &ctx.config().health;
            let health = HealthSurface::new(
                ctx.queue().clone(),
                ctx.upstream().clone(),
                health_config.min_ready_fraction,
                Duration::from_millis(health_config.liveness_probe_timeout_ms),
            );
            let readiness = health.readiness().await;
            let liveness = health.liveness().await;
            println!("{readiness:?}");
            println!("{liveness:?}");
            Ok(())
        }
    }
}
