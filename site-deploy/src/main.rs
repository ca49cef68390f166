//! Site Deploy - Main entry point
//!
//! Deploys a local directory to a hosted site.

use anyhow::Result;
use clap::Parser;
use site_deploy::{config::Config, utils, DeployExecutor, DeployOptions, HttpDeployApi};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Site to deploy to
    site_id: String,

    /// Directory to deploy
    dir: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Deploy API base URL (overrides config)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Access token (overrides config)
    #[arg(long)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(url) = args.api_url {
        config.api.url = url;
    }
    if let Some(token) = args.token {
        config.api.token = token;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting site-deploy v{} (api: {})",
        env!("CARGO_PKG_VERSION"),
        config.api.url
    );

    let api = Arc::new(HttpDeployApi::from_config(&config.api)?);
    let executor = DeployExecutor::new(api, DeployOptions::from(&config));

    match executor.deploy_site(&args.site_id, &args.dir).await {
        Ok(deploy) => {
            tracing::info!("Deploy {} is {}", deploy.id, deploy.state);
            if let Some(url) = &deploy.deploy_url {
                println!("{url}");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Deploy failed: {}", e);
            Err(e.into())
        }
    }
}
