//! hearth-provider entry point.
//!
//! Logs go to stderr; stdout carries the VM record or status line.

use clap::Parser;
use hearth_core::LifecycleController;
use hearth_provider::{commands, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("hearth_provider=info".parse()?)
                .add_directive("hearth_core=info".parse()?)
                .add_directive("hearth_vm=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = commands::provider_config(&cli)?;
    tracing::debug!(?config, "Configuration loaded");

    let controller = LifecycleController::new(&config)?;
    commands::run(&controller, cli.command).await
}
