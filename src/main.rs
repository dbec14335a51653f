use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use log::{error, info};
use smithy_agent::{
    config::{ConfigReader, FileReader, ServerConfig},
    server, Agent,
};

#[derive(Parser, Debug)]
#[clap(
    name = "smithy-agent",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reconciles a database against declared models and exposes them to the dashboard"
)]
struct Cli {
    /// Agent configuration file (TOML).
    #[clap(long, default_value = "agent_config.toml")]
    config: PathBuf,
    /// Dashboard role permissions file (TOML).
    #[clap(long)]
    roles: Option<PathBuf>,
    /// Drop and recreate the restricted role even if it exists.
    #[clap(long)]
    force_create: bool,
    /// Exit after reconciliation instead of serving the exposure endpoint.
    #[clap(long)]
    no_serve: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut reader = FileReader::new(&cli.config);
    if let Some(roles) = &cli.roles {
        reader = reader.with_roles(roles);
    }

    let cfg = smithy_agent::new_config(&reader).await?;
    let permission = reader.read_roles()?;
    info!(
        "loaded {} models and {} dashboard roles from {}",
        cfg.model_list.len(),
        permission.roles.len(),
        cli.config.display()
    );

    {
        let agent = Agent::connect(cfg.clone()).await?;
        let outcome = agent.reconcile(cli.force_create).await?;
        if !outcome.migrated.is_empty() {
            info!("applied migration: {}", outcome.migrated);
        }
        if let Err(e) = outcome.user {
            error!("restricted role was not provisioned: {}", e);
        }
    }

    if cli.no_serve {
        return Ok(());
    }

    let server_cfg = ServerConfig::from_env()?;
    server::serve(server_cfg, Arc::new(cfg)).await?;
    Ok(())
}
