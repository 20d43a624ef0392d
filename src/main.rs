//! kube-deploy
//!
//! CI pipeline step that applies a templated manifest and waits for it to settle.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kube_deploy::config::PluginArgs;
use kube_deploy::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = PluginArgs::parse().validate()?;
    kube_deploy::run(settings).await?;
    Ok(())
}
