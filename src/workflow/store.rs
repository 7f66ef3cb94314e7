use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{
    CreateMigrationRequest, Credentials, DiscoveredDevice, MigrationOptions, MigrationOptionsPatch,
    ScanResult, StorageTarget,
};
use crate::error::{ClientError, Result};
use crate::error_codes::{
    ERR_DESTINATION_INCOMPLETE, ERR_EMPTY_SELECTION, ERR_PASSWORD_REQUIRED, ERR_STORAGE_UNHEALTHY,
};
use crate::input_validation::validate_host;
use crate::workflow::path_resolver::{normalize_sub_path, resolve_base_path, validate_sub_path, PathError};
use crate::workflow::persistence::{SessionStorage, WORKFLOW_STORAGE_KEY};

pub const DEFAULT_BASE_PATH: &str = "/DATA";

/// How long a cached scan stays authoritative
pub const SCAN_CACHE_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStep {
    #[default]
    Select,
    Configure,
    Monitor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DestinationConfig {
    pub host: String,
    pub username: String,
    /// Held in memory only; never serialized.
    #[serde(skip)]
    pub password: String,
    pub base_path: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

impl DestinationConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Shallow update of the destination. `storage: Some(None)` clears the
/// selected target.
#[derive(Debug, Clone, Default)]
pub struct DestinationPatch {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_path: Option<String>,
    pub storage: Option<Option<StorageTarget>>,
    pub sub_path: Option<String>,
}

/// Everything that survives a reload. The password is excluded by
/// `DestinationConfig`'s serde attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowState {
    pub step: WorkflowStep,
    pub selection: BTreeSet<String>,
    pub task_id: Option<String>,
    pub scan: Option<ScanResult>,
    pub scan_cached_at: Option<DateTime<Utc>>,
    pub destination: DestinationConfig,
    pub discovered_devices: Vec<DiscoveredDevice>,
    pub selected_device: Option<DiscoveredDevice>,
    pub selected_storage: Option<StorageTarget>,
    /// Normalized (leading separator, no trailing one)
    pub sub_path: String,
    pub options: MigrationOptions,
}

/// Where the user is in the wizard and what they chose.
///
/// Every mutation writes the [`WorkflowState`] snapshot to session storage.
/// Persistence failures are logged and never abort the mutation.
pub struct WorkflowStore {
    state: WorkflowState,
    storages: Vec<StorageTarget>,
    scan_ttl: chrono::Duration,
    session: Arc<dyn SessionStorage>,
}

impl WorkflowStore {
    /// Fresh store with defaults. Nothing is written until the first mutation.
    pub fn new(session: Arc<dyn SessionStorage>) -> Self {
        Self {
            state: WorkflowState::default(),
            storages: Vec::new(),
            scan_ttl: chrono::Duration::seconds(SCAN_CACHE_TTL_SECS),
            session,
        }
    }

    /// Rehydrate from session storage; missing or unreadable state yields
    /// the defaults.
    pub fn restore(session: Arc<dyn SessionStorage>) -> Self {
        let mut store = Self::new(session);
        match store.session.load(WORKFLOW_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<WorkflowState>(&raw) {
                Ok(state) => store.state = state,
                Err(e) => log::warn!("Discarding unreadable workflow state: {e}"),
            },
            Ok(None) => {}
            Err(e) => log::warn!("Failed to load workflow state: {e}"),
        }
        store
    }

    pub fn with_scan_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.scan_ttl = ttl;
        self
    }

    /// Write the snapshot now, reporting failure to the caller.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string(&self.state).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.session.save(WORKFLOW_STORAGE_KEY, &json)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            log::warn!("Failed to persist workflow state: {e}");
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn step(&self) -> WorkflowStep {
        self.state.step
    }

    pub fn task_id(&self) -> Option<&str> {
        self.state.task_id.as_deref()
    }

    pub fn destination(&self) -> &DestinationConfig {
        &self.state.destination
    }

    pub fn options(&self) -> MigrationOptions {
        self.state.options
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.state.selection
    }

    pub fn storages(&self) -> &[StorageTarget] {
        &self.storages
    }

    pub fn selected_storage(&self) -> Option<&StorageTarget> {
        self.state.selected_storage.as_ref()
    }

    pub fn sub_path(&self) -> &str {
        &self.state.sub_path
    }

    // ---- steps ----

    /// Move to `step` if its precondition holds; otherwise nothing changes.
    pub fn advance(&mut self, step: WorkflowStep) -> bool {
        let allowed = match step {
            WorkflowStep::Select => true,
            WorkflowStep::Configure => !self.state.selection.is_empty(),
            WorkflowStep::Monitor => self.destination_ready() && self.state.task_id.is_some(),
        };
        if allowed {
            self.state.step = step;
            self.persist();
        }
        allowed
    }

    // ---- selection ----

    pub fn set_selection<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.selection = items.into_iter().map(Into::into).collect();
        self.persist();
    }

    /// Returns whether `item` is selected afterwards.
    pub fn toggle_selection(&mut self, item: &str) -> bool {
        let selected = if self.state.selection.remove(item) {
            false
        } else {
            self.state.selection.insert(item.to_string());
            true
        };
        self.persist();
        selected
    }

    pub fn add_selection(&mut self, item: &str) {
        if self.state.selection.insert(item.to_string()) {
            self.persist();
        }
    }

    pub fn remove_selection(&mut self, item: &str) {
        if self.state.selection.remove(item) {
            self.persist();
        }
    }

    pub fn clear_selection(&mut self) {
        self.state.selection.clear();
        self.persist();
    }

    // ---- destination ----

    /// Merge `patch` into the destination. Changing the storage target or
    /// the sub-path re-derives the base path in the same call, unless the
    /// sub-path is invalid, in which case the base path is left as it was.
    pub fn set_destination(&mut self, patch: DestinationPatch) -> Result<()> {
        if let Some(Some(target)) = &patch.storage {
            if !target.is_healthy() {
                return Err(ClientError::validation(
                    ERR_STORAGE_UNHEALTHY,
                    format!("Storage '{}' is not healthy", target.name),
                ));
            }
        }

        let destination = &mut self.state.destination;
        if let Some(host) = patch.host {
            destination.host = host.trim().to_string();
        }
        if let Some(username) = patch.username {
            destination.username = username;
        }
        if let Some(password) = patch.password {
            destination.password = password;
        }
        if let Some(base_path) = patch.base_path {
            destination.base_path = base_path;
        }

        let mut rederive = false;
        if let Some(storage) = patch.storage {
            self.state.selected_storage = storage;
            rederive = true;
        }
        if let Some(sub_path) = patch.sub_path {
            self.state.sub_path = normalize_sub_path(&sub_path);
            rederive = true;
        }
        if rederive {
            self.rederive_base_path();
        }

        self.persist();
        Ok(())
    }

    fn rederive_base_path(&mut self) {
        if validate_sub_path(&self.state.sub_path).is_err() {
            return;
        }
        self.state.destination.base_path =
            resolve_base_path(self.state.selected_storage.as_ref(), &self.state.sub_path);
    }

    /// Validation failure of the current sub-path, if any.
    pub fn destination_error(&self) -> Option<PathError> {
        validate_sub_path(&self.state.sub_path).err()
    }

    fn destination_ready(&self) -> bool {
        let destination = &self.state.destination;
        validate_host(&destination.host).is_ok()
            && !destination.username.is_empty()
            && !destination.base_path.is_empty()
            && self.destination_error().is_none()
    }

    pub fn clear_password(&mut self) {
        self.state.destination.password.clear();
        self.persist();
    }

    pub fn set_storages(&mut self, storages: Vec<StorageTarget>) {
        self.storages = storages;
    }

    pub fn set_discovered_devices(&mut self, devices: Vec<DiscoveredDevice>) {
        self.state.discovered_devices = devices;
        self.persist();
    }

    /// Remember the chosen device and point the destination host at it.
    pub fn select_device(&mut self, device: Option<DiscoveredDevice>) {
        if let Some(device) = &device {
            self.state.destination.host = device.host();
        }
        self.state.selected_device = device;
        self.persist();
    }

    pub fn set_options(&mut self, patch: MigrationOptionsPatch) {
        self.state.options.merge(patch);
        self.persist();
    }

    pub fn set_task_id(&mut self, task_id: Option<String>) {
        self.state.task_id = task_id;
        self.persist();
    }

    // ---- scan cache ----

    pub fn cache_scan(&mut self, result: ScanResult) {
        self.cache_scan_at(result, Utc::now());
    }

    pub fn cache_scan_at(&mut self, result: ScanResult, now: DateTime<Utc>) {
        self.state.scan = Some(result);
        self.state.scan_cached_at = Some(now);
        self.persist();
    }

    pub fn clear_scan(&mut self) {
        self.state.scan = None;
        self.state.scan_cached_at = None;
        self.persist();
    }

    pub fn is_scan_cache_valid(&self) -> bool {
        self.is_scan_cache_valid_at(Utc::now())
    }

    pub fn is_scan_cache_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.state.scan, self.state.scan_cached_at) {
            (Some(_), Some(cached_at)) => now - cached_at < self.scan_ttl,
            _ => false,
        }
    }

    /// The cached scan while it is still authoritative.
    pub fn cached_scan(&self) -> Option<&ScanResult> {
        if self.is_scan_cache_valid() {
            self.state.scan.as_ref()
        } else {
            None
        }
    }

    // ---- start ----

    /// Everything a migration needs before it is sent to the server.
    pub fn can_start(&self) -> Result<()> {
        if self.state.selection.is_empty() {
            return Err(ClientError::validation(
                ERR_EMPTY_SELECTION,
                "Select at least one source folder",
            ));
        }

        let destination = &self.state.destination;
        validate_host(&destination.host)?;
        if destination.username.is_empty() || destination.base_path.is_empty() {
            return Err(ClientError::validation(
                ERR_DESTINATION_INCOMPLETE,
                "Destination username and base path are required",
            ));
        }
        if let Some(e) = self.destination_error() {
            return Err(e.into());
        }
        if destination.password.is_empty() {
            return Err(ClientError::validation(
                ERR_PASSWORD_REQUIRED,
                "Enter the destination password",
            ));
        }
        Ok(())
    }

    pub fn migration_request(&self) -> Result<CreateMigrationRequest> {
        self.can_start()?;
        let destination = &self.state.destination;
        Ok(CreateMigrationRequest {
            source_folders: self.state.selection.iter().cloned().collect(),
            zimaos_host: destination.host.clone(),
            zimaos_username: destination.username.clone(),
            zimaos_password: destination.password.clone(),
            base_path: destination.base_path.clone(),
            options: self.state.options,
        })
    }

    /// Back to defaults, including password and task id.
    pub fn reset(&mut self) {
        self.state = WorkflowState::default();
        self.storages.clear();
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{StorageExtensions, StorageKind};
    use crate::error_codes::ERR_PATH_TRAVERSAL;
    use crate::workflow::persistence::MemorySessionStorage;

    fn storage(name: &str, path: &str, health: bool) -> StorageTarget {
        StorageTarget {
            name: name.to_string(),
            path: path.to_string(),
            kind: StorageKind::Hdd,
            extensions: StorageExtensions {
                health,
                size: 1000,
                used: 100,
            },
        }
    }

    fn empty_scan() -> ScanResult {
        ScanResult {
            volumes: Vec::new(),
            scanned_at: Utc::now(),
        }
    }

    fn configured_store(session: Arc<dyn SessionStorage>) -> WorkflowStore {
        let mut store = WorkflowStore::new(session);
        store.set_selection(["/vol1/media"]);
        store
            .set_destination(DestinationPatch {
                host: Some("http://10.0.0.2".to_string()),
                username: Some("admin".to_string()),
                password: Some("secret".to_string()),
                storage: Some(Some(storage("Disk", "/DATA", true))),
                sub_path: Some("backup".to_string()),
                ..Default::default()
            })
            .unwrap();
        store
    }

    #[test]
    fn test_empty_selection_blocks_configure() {
        let mut store = WorkflowStore::new(Arc::new(MemorySessionStorage::new()));
        assert!(!store.advance(WorkflowStep::Configure));
        assert_eq!(store.step(), WorkflowStep::Select);

        store.toggle_selection("/vol1/media");
        assert!(store.advance(WorkflowStep::Configure));
        assert_eq!(store.step(), WorkflowStep::Configure);
    }

    #[test]
    fn test_toggle_selection_is_a_set() {
        let mut store = WorkflowStore::new(Arc::new(MemorySessionStorage::new()));
        assert!(store.toggle_selection("/a"));
        store.add_selection("/a");
        assert_eq!(store.selection().len(), 1);
        assert!(!store.toggle_selection("/a"));
        assert!(store.selection().is_empty());
    }

    #[test]
    fn test_monitor_requires_destination_and_task() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        assert!(!store.advance(WorkflowStep::Monitor));

        store.set_task_id(Some("T1".to_string()));
        assert!(store.advance(WorkflowStep::Monitor));
    }

    #[test]
    fn test_storage_and_sub_path_rederive_base_path() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        assert_eq!(store.destination().base_path, "/DATA/backup");
        assert_eq!(store.sub_path(), "/backup");

        store
            .set_destination(DestinationPatch {
                storage: Some(Some(storage("USB", "/media/USB1/", true))),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.destination().base_path, "/media/USB1/backup");

        store
            .set_destination(DestinationPatch {
                sub_path: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.destination().base_path, "/media/USB1");
    }

    #[test]
    fn test_clearing_storage_falls_back_to_sub_path() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        store
            .set_destination(DestinationPatch {
                storage: Some(Some(storage("USB", "/media/USB1", true))),
                sub_path: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.destination().base_path, "/media/USB1");

        store
            .set_destination(DestinationPatch {
                storage: Some(None),
                ..Default::default()
            })
            .unwrap();
        assert!(store.selected_storage().is_none());
        assert_eq!(store.destination().base_path, "");
        assert_eq!(
            store.can_start().unwrap_err().code(),
            Some(ERR_DESTINATION_INCOMPLETE)
        );

        store
            .set_destination(DestinationPatch {
                sub_path: Some("DATA/manual".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.destination().base_path, "/DATA/manual");
        assert!(store.can_start().is_ok());
    }

    #[test]
    fn test_traversal_sub_path_keeps_base_path() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        store
            .set_destination(DestinationPatch {
                sub_path: Some("../../etc".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.destination_error(), Some(PathError::Traversal));
        assert_eq!(store.destination().base_path, "/DATA/backup");
        assert_eq!(store.can_start().unwrap_err().code(), Some(ERR_PATH_TRAVERSAL));
    }

    #[test]
    fn test_unhealthy_storage_rejected() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        let err = store
            .set_destination(DestinationPatch {
                storage: Some(Some(storage("Bad", "/media/bad", false))),
                host: Some("http://other".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ERR_STORAGE_UNHEALTHY));
        assert_eq!(store.selected_storage().unwrap().name, "Disk");
        assert_eq!(store.destination().host, "http://10.0.0.2");
    }

    #[test]
    fn test_manual_entry_without_storage() {
        let mut store = WorkflowStore::new(Arc::new(MemorySessionStorage::new()));
        store
            .set_destination(DestinationPatch {
                sub_path: Some("DATA/manual/".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.destination().base_path, "/DATA/manual");
    }

    #[test]
    fn test_scan_cache_ttl_window() {
        let mut store = WorkflowStore::new(Arc::new(MemorySessionStorage::new()));
        let t0 = Utc::now();
        assert!(!store.is_scan_cache_valid_at(t0));

        store.cache_scan_at(empty_scan(), t0);
        assert!(store.is_scan_cache_valid_at(t0));
        assert!(store.is_scan_cache_valid_at(t0 + chrono::Duration::seconds(299)));
        assert!(store.is_scan_cache_valid_at(t0 + chrono::Duration::milliseconds(299_999)));
        assert!(!store.is_scan_cache_valid_at(t0 + chrono::Duration::seconds(300)));
        assert!(!store.is_scan_cache_valid_at(t0 + chrono::Duration::hours(1)));

        store.clear_scan();
        assert!(!store.is_scan_cache_valid_at(t0));
    }

    #[test]
    fn test_password_never_persisted() {
        let session: Arc<dyn SessionStorage> = Arc::new(MemorySessionStorage::new());
        let store = configured_store(session.clone());
        assert_eq!(store.destination().password, "secret");

        let raw = session.load(WORKFLOW_STORAGE_KEY).unwrap().unwrap();
        assert!(!raw.contains("secret"));

        let reloaded = WorkflowStore::restore(session);
        assert_eq!(reloaded.destination().password, "");
        assert_eq!(reloaded.destination().host, "http://10.0.0.2");
        assert_eq!(reloaded.destination().base_path, "/DATA/backup");
        assert_eq!(reloaded.sub_path(), "/backup");
        assert_eq!(
            reloaded.can_start().unwrap_err().code(),
            Some(ERR_PASSWORD_REQUIRED)
        );
    }

    #[test]
    fn test_restore_survives_corrupt_state() {
        let session = Arc::new(MemorySessionStorage::new());
        session.save(WORKFLOW_STORAGE_KEY, "{not json").unwrap();
        let store = WorkflowStore::restore(session);
        assert_eq!(store.state(), &WorkflowState::default());
    }

    #[test]
    fn test_reset_clears_everything() {
        let session: Arc<dyn SessionStorage> = Arc::new(MemorySessionStorage::new());
        let mut store = configured_store(session.clone());
        store.set_task_id(Some("T1".to_string()));
        store.advance(WorkflowStep::Monitor);
        store.set_options(MigrationOptionsPatch {
            overwrite_existing: Some(true),
            ..Default::default()
        });

        store.reset();
        assert_eq!(store.state(), &WorkflowState::default());
        assert!(store.destination().password.is_empty());
        assert!(store.task_id().is_none());
        assert_eq!(store.destination().base_path, DEFAULT_BASE_PATH);

        let reloaded = WorkflowStore::restore(session);
        assert_eq!(reloaded.step(), WorkflowStep::Select);
    }

    #[test]
    fn test_migration_request_from_state() {
        let mut store = configured_store(Arc::new(MemorySessionStorage::new()));
        store.set_options(MigrationOptionsPatch {
            include_recycle: Some(true),
            ..Default::default()
        });
        let request = store.migration_request().unwrap();
        assert_eq!(request.source_folders, vec!["/vol1/media".to_string()]);
        assert_eq!(request.base_path, "/DATA/backup");
        assert_eq!(request.zimaos_password, "secret");
        assert!(request.options.include_recycle);
        assert!(request.options.skip_errors);
    }

    #[test]
    fn test_select_device_sets_host() {
        let mut store = WorkflowStore::new(Arc::new(MemorySessionStorage::new()));
        store.select_device(Some(DiscoveredDevice {
            ip: "192.168.1.50".to_string(),
            port: 80,
            ..Default::default()
        }));
        assert_eq!(store.destination().host, "http://192.168.1.50");
    }
}
