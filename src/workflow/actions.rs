//! Wizard actions that need the backend: each one calls the gateway and
//! folds the result into the [`WorkflowStore`].

use crate::api::types::{ConnectionToken, DiscoveredDevice, ScanResult, StorageTarget};
use crate::api::MigrationApi;
use crate::error::{ClientError, Result};
use crate::error_codes::ERR_PASSWORD_REQUIRED;
use crate::input_validation::validate_host;
use crate::workflow::store::{DestinationPatch, WorkflowStep, WorkflowStore};

/// The cached scan while it is valid, otherwise a fresh one.
pub async fn load_scan<A>(api: &A, store: &mut WorkflowStore, force: bool) -> Result<ScanResult>
where
    A: MigrationApi + ?Sized,
{
    if !force {
        if let Some(scan) = store.cached_scan() {
            log::debug!("Using cached scan from {}", scan.scanned_at);
            return Ok(scan.clone());
        }
    }

    let scan = api.scan().await?;
    log::info!("Scanned {} volumes", scan.volumes.len());
    store.cache_scan(scan.clone());
    Ok(scan)
}

pub async fn discover_devices<A>(api: &A, store: &mut WorkflowStore) -> Result<Vec<DiscoveredDevice>>
where
    A: MigrationApi + ?Sized,
{
    let list = api.discover_devices().await?;
    log::info!("Discovered {} devices", list.devices.len());
    store.set_discovered_devices(list.devices.clone());
    Ok(list.devices)
}

fn require_credentials(store: &WorkflowStore) -> Result<()> {
    let destination = store.destination();
    validate_host(&destination.host)?;
    if destination.password.is_empty() {
        return Err(ClientError::validation(
            ERR_PASSWORD_REQUIRED,
            "Enter the destination password",
        ));
    }
    Ok(())
}

pub async fn test_connection<A>(api: &A, store: &WorkflowStore) -> Result<ConnectionToken>
where
    A: MigrationApi + ?Sized,
{
    require_credentials(store)?;
    api.test_connection(&store.destination().credentials()).await
}

/// Fetch the destination's storage targets. With nothing selected yet the
/// first healthy target is picked.
pub async fn refresh_storages<A>(api: &A, store: &mut WorkflowStore) -> Result<Vec<StorageTarget>>
where
    A: MigrationApi + ?Sized,
{
    require_credentials(store)?;
    let list = api.list_storages(&store.destination().credentials()).await?;
    store.set_storages(list.storages.clone());

    if store.selected_storage().is_none() {
        if let Some(first) = list.storages.iter().find(|s| s.is_healthy()) {
            log::info!("Auto-selected storage {} ({})", first.name, first.path);
            store.set_destination(DestinationPatch {
                storage: Some(Some(first.clone())),
                ..Default::default()
            })?;
        }
    }
    Ok(list.storages)
}

/// Create the migration on the server and move the wizard to monitoring.
pub async fn start_migration<A>(api: &A, store: &mut WorkflowStore) -> Result<String>
where
    A: MigrationApi + ?Sized,
{
    let request = store.migration_request()?;
    let created = api.create_migration(&request).await?;
    log::info!(
        "Started migration {} ({} folders -> {})",
        created.task_id,
        request.source_folders.len(),
        request.base_path
    );

    store.set_task_id(Some(created.task_id.clone()));
    store.advance(WorkflowStep::Monitor);
    Ok(created.task_id)
}
