//! One function per subcommand.

use crate::cli::{Cli, Command};
use crate::state::StateFile;
use anyhow::{bail, Context};
use hearth_core::{CoreError, DeleteOutcome, LifecycleController, ProviderConfig, VmRecord};
use hearth_vm::{Component, VmConfig};
use std::path::Path;
use std::time::Duration;

/// Read a VM configuration document.
pub fn load_vm_config(path: &Path) -> anyhow::Result<VmConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read VM config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid VM config {}", path.display()))
}

/// Environment configuration with command-line overrides applied.
pub fn provider_config(cli: &Cli) -> anyhow::Result<ProviderConfig> {
    let mut config = ProviderConfig::from_env()?;
    if let Some(endpoint) = &cli.endpoint {
        config.transport.endpoint = endpoint.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.transport.request_timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = cli.max_retries {
        config.transport.max_retries = retries;
    }
    config.validate()?;
    Ok(config)
}

/// Dispatch `command` against `controller`.
pub async fn run(controller: &LifecycleController, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Create { config, state } => {
            create(controller, &load_vm_config(&config)?, &StateFile::new(state)).await
        }
        Command::Read { state } => read(controller, &StateFile::new(state)).await,
        Command::Update {
            config,
            state,
            replace,
        } => update(controller, load_vm_config(&config)?, &StateFile::new(state), replace).await,
        Command::Delete { state } => delete(controller, &StateFile::new(state)).await,
        Command::Lookup { id } => {
            let remote = controller.lookup(&id).await?;
            println!("{}", serde_json::to_string_pretty(&remote)?);
            Ok(())
        }
    }
}

async fn create(
    controller: &LifecycleController,
    config: &VmConfig,
    state: &StateFile,
) -> anyhow::Result<()> {
    if let Some(existing) = state.load()? {
        bail!(
            "{} already tracks VM {}, delete it first",
            state.path().display(),
            existing.id
        );
    }

    let record = controller
        .create(config.clone())
        .await
        .map_err(describe_failure)?;
    state.save(&record)?;
    print_record(&record)
}

async fn read(controller: &LifecycleController, state: &StateFile) -> anyhow::Result<()> {
    let record = require(state)?;
    match controller.read(&record).await? {
        Some(refreshed) => {
            state.save(&refreshed)?;
            print_record(&refreshed)
        }
        None => {
            state.remove()?;
            println!("VM {} is gone, state removed", record.id);
            Ok(())
        }
    }
}

async fn update(
    controller: &LifecycleController,
    desired: VmConfig,
    state: &StateFile,
    replace: bool,
) -> anyhow::Result<()> {
    let record = require(state)?;
    let updated = match controller.update(&record, desired.clone()).await {
        Ok(updated) => updated,
        Err(CoreError::ReplacementRequired { id, fields }) if replace => {
            tracing::info!(vm_id = %id, ?fields, "Replacing VM");
            controller.delete(&record).await;
            state.remove()?;
            controller
                .create(desired)
                .await
                .map_err(describe_failure)?
        }
        Err(e) => return Err(e.into()),
    };
    state.save(&updated)?;
    print_record(&updated)
}

async fn delete(controller: &LifecycleController, state: &StateFile) -> anyhow::Result<()> {
    let Some(record) = state.load()? else {
        println!("{} tracks no VM", state.path().display());
        return Ok(());
    };

    match controller.delete(&record).await {
        DeleteOutcome::ShutdownSent => println!("VM {} shutdown requested", record.id),
        DeleteOutcome::AlreadyGone => println!("VM {} already gone", record.id),
        DeleteOutcome::Unacknowledged { reason } => {
            println!("VM {} shutdown not acknowledged ({reason})", record.id)
        }
    }
    state.remove()?;
    Ok(())
}

fn require(state: &StateFile) -> anyhow::Result<VmRecord> {
    state
        .load()?
        .with_context(|| format!("{} tracks no VM", state.path().display()))
}

fn print_record(record: &VmRecord) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Spell out which components a failed creation left applied.
fn describe_failure(err: CoreError) -> anyhow::Error {
    match err {
        CoreError::Provision(failure) => {
            let applied = describe_components(&failure.applied);
            anyhow::Error::new(failure).context(format!("components already applied: {applied}"))
        }
        other => other.into(),
    }
}

fn describe_components(components: &[Component]) -> String {
    if components.is_empty() {
        return "none".to_string();
    }
    components
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
