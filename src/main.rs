use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use creds::{
    ActiveCredentials, CredentialManagers, ManagerRegistry, VariableReference, Variables,
};
use struct_log::StructLogBuilder;

mod config;

use config::CredsConfig;

#[derive(Parser)]
#[command(name = "creds", version, about = "Resolve pipeline credentials from a secret backend")]
struct Cli {
    #[arg(short, long, value_name = "FILE", env = "CREDS_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve `name[.field...]` for a team and pipeline
    Get {
        variable: String,
        #[arg(long)]
        team: String,
        #[arg(long, default_value = "")]
        pipeline: String,
        #[arg(long)]
        allow_root_path: bool,
    },
    /// Probe the configured backend
    Health,
    /// List known managers and the redacted configuration of each configured one
    Managers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = StructLogBuilder::new("creds", env!("CARGO_PKG_VERSION"))
        .json_from_env()
        .default_filter("warn")
        .init()?;

    let config = CredsConfig::from_path(&cli.config).await?;
    let registry = ManagerRegistry::builtin();
    let managers = CredentialManagers::from_config(&registry, &config.managers)?;
    tracing::debug!(
        config = %cli.config.display(),
        managers = managers.iter().count(),
        "configuration loaded"
    );

    if let Command::Managers = cli.command {
        return print_managers(&registry, &managers);
    }

    let active = ActiveCredentials::start(managers.select()?, config.retry, config.cache)
        .await
        .context("failed to start credential manager")?;
    let result = run(&active, cli.command).await;
    active.close().await;
    result
}

async fn run(active: &ActiveCredentials, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get {
            variable,
            team,
            pipeline,
            allow_root_path,
        } => {
            let reference = VariableReference::parse(&variable)?;
            let vars = Variables::new(active.secrets(), team, pipeline, allow_root_path);
            match vars.get(&reference).await? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => bail!("variable {} not found", reference),
            }
        }
        Command::Health => match active.health().await? {
            Some(health) => {
                println!("{}", serde_json::to_string_pretty(&health)?);
                if let Some(error) = health.error {
                    bail!("{} is unhealthy: {}", active.manager_name().unwrap_or("manager"), error);
                }
            }
            None => println!("no credential manager configured"),
        },
        Command::Managers => {}
    }
    Ok(())
}

fn print_managers(registry: &ManagerRegistry, managers: &CredentialManagers) -> anyhow::Result<()> {
    let configured: serde_json::Map<String, serde_json::Value> = managers
        .iter()
        .map(|m| {
            let entry = serde_json::json!({
                "configured": m.is_configured(),
                "config": m.config(),
            });
            (m.name().to_string(), entry)
        })
        .collect();

    let report = serde_json::json!({
        "available": registry.names().collect::<Vec<_>>(),
        "managers": configured,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
