use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lists arrive as `null` when the server has nothing to report.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response wrapper shared by every endpoint. `code == 0` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderInfo {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub file_count: u64,
    pub modified_time: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<FolderInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeInfo {
    pub name: String,
    pub path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub folders: Vec<FolderInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub volumes: Vec<VolumeInfo>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    /// Every folder in the tree, depth first.
    pub fn folders(&self) -> Vec<&FolderInfo> {
        fn walk<'a>(folders: &'a [FolderInfo], out: &mut Vec<&'a FolderInfo>) {
            for folder in folders {
                out.push(folder);
                walk(&folder.children, out);
            }
        }

        let mut out = Vec::new();
        for volume in &self.volumes {
            walk(&volume.folders, &mut out);
        }
        out
    }

    pub fn find_folder(&self, path: &str) -> Option<&FolderInfo> {
        self.folders().into_iter().find(|f| f.path == path)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveredDevice {
    pub device_model: String,
    pub device_name: String,
    pub hash: String,
    pub initialized: bool,
    #[serde(deserialize_with = "null_as_empty")]
    pub lan_ipv4: Vec<String>,
    pub os_version: String,
    pub port: u16,
    pub request_ip: String,
    pub ip: String,
    pub image_url: String,
}

impl DiscoveredDevice {
    /// Host string suitable for `DestinationConfig::host`.
    pub fn host(&self) -> String {
        let ip = if self.ip.is_empty() {
            self.lan_ipv4.first().cloned().unwrap_or_default()
        } else {
            self.ip.clone()
        };
        match self.port {
            0 | 80 => format!("http://{ip}"),
            port => format!("http://{ip}:{port}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub devices: Vec<DiscoveredDevice>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageKind {
    System,
    Hdd,
    Ssd,
    Usb,
    Network,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageExtensions {
    pub health: bool,
    pub size: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageTarget {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default)]
    pub extensions: StorageExtensions,
}

impl StorageTarget {
    pub fn is_healthy(&self) -> bool {
        self.extensions.health
    }

    pub fn available_bytes(&self) -> u64 {
        self.extensions.size.saturating_sub(self.extensions.used)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub storages: Vec<StorageTarget>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionToken {
    pub token: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrationOptions {
    pub overwrite_existing: bool,
    pub skip_errors: bool,
    pub preserve_times: bool,
    pub include_recycle: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            skip_errors: true,
            preserve_times: true,
            include_recycle: false,
        }
    }
}

/// Partial update for [`MigrationOptions`]; `None` leaves a toggle as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptionsPatch {
    pub overwrite_existing: Option<bool>,
    pub skip_errors: Option<bool>,
    pub preserve_times: Option<bool>,
    pub include_recycle: Option<bool>,
}

impl MigrationOptions {
    pub fn merge(&mut self, patch: MigrationOptionsPatch) {
        if let Some(v) = patch.overwrite_existing {
            self.overwrite_existing = v;
        }
        if let Some(v) = patch.skip_errors {
            self.skip_errors = v;
        }
        if let Some(v) = patch.preserve_times {
            self.preserve_times = v;
        }
        if let Some(v) = patch.include_recycle {
            self.include_recycle = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateMigrationRequest {
    pub source_folders: Vec<String>,
    pub zimaos_host: String,
    pub zimaos_username: String,
    pub zimaos_password: String,
    pub base_path: String,
    pub options: MigrationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedTask {
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Verifying,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    /// Running or verifying: counters must only grow.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Verifying)
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Running => "Running",
            TaskState::Verifying => "Verifying",
            TaskState::Paused => "Paused",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
            TaskState::Cancelled => "Cancelled",
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "verifying" => Ok(TaskState::Verifying),
            "paused" => Ok(TaskState::Paused),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            "cancelled" => Ok(TaskState::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Live snapshot of a task as reported by the status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskStatus {
    pub task_id: String,
    pub status: TaskState,
    pub error: String,
    pub current_file: String,
    pub current_file_size: u64,
    pub current_file_transferred: u64,
    pub current_file_progress: f64,
    /// Bytes per second
    pub speed: u64,
    /// Seconds remaining
    pub eta: u64,
    pub processed_files: u64,
    pub total_files: u64,
    pub transferred_size: u64,
    pub total_size: u64,
    pub progress: f64,
    pub failed_files: u64,
    pub verifying_files: u64,
    pub verify_failed_files: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_empty")]
    pub source_folders: Vec<String>,
    pub zimaos_host: String,
    pub base_path: String,
}

impl TaskStatus {
    /// Hold progress counters at or above `previous` while both snapshots are
    /// active, and within their totals.
    pub fn enforce_monotonic(&mut self, previous: Option<&TaskStatus>) {
        if let Some(prev) = previous {
            if self.status.is_active() && !prev.status.is_terminal() {
                self.processed_files = self.processed_files.max(prev.processed_files);
                self.transferred_size = self.transferred_size.max(prev.transferred_size);
                self.verifying_files = self.verifying_files.max(prev.verifying_files);
            }
        }
        if self.total_files > 0 {
            self.processed_files = self.processed_files.min(self.total_files);
            self.verifying_files = self.verifying_files.min(self.total_files);
        }
        if self.total_size > 0 {
            self.transferred_size = self.transferred_size.min(self.total_size);
        }
    }
}

/// Historical task record. `source_folders` and `options` arrive as JSON
/// encoded strings, the way the server stores them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationTask {
    pub id: u64,
    pub task_id: String,
    pub status: TaskState,
    pub error: String,
    pub source_folders: String,
    pub zimaos_host: String,
    pub zimaos_username: String,
    pub base_path: String,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub total_size: u64,
    pub transferred_size: u64,
    pub progress: f64,
    pub options: String,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MigrationTask {
    pub fn source_folder_list(&self) -> Vec<String> {
        serde_json::from_str(&self.source_folders).unwrap_or_default()
    }

    pub fn migration_options(&self) -> Option<MigrationOptions> {
        serde_json::from_str(&self.options).ok()
    }

    /// Copy the denormalized fields of a live snapshot into this record.
    pub fn absorb(&mut self, status: &TaskStatus) {
        self.status = status.status;
        self.error = status.error.clone();
        self.total_files = status.total_files;
        self.processed_files = status.processed_files;
        self.failed_files = status.failed_files;
        self.total_size = status.total_size;
        self.transferred_size = status.transferred_size;
        self.progress = status.progress;
        if status.updated_at.is_some() {
            self.updated_at = status.updated_at;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskPage {
    #[serde(deserialize_with = "null_as_empty")]
    pub tasks: Vec<MigrationTask>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_decodes_server_payload() {
        let json = r#"{
            "task_id": "T1", "status": "verifying", "current_file": "/vol1/a.mkv",
            "current_file_size": 10, "current_file_transferred": 5, "current_file_progress": 50,
            "speed": 1024, "processed_files": 3, "total_files": 4, "transferred_size": 300,
            "total_size": 400, "progress": 75.0, "failed_files": 0, "verifying_files": 2,
            "verify_failed_files": 1, "started_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:05:00Z", "source_folders": ["/vol1/media"],
            "zimaos_host": "http://10.0.0.2", "base_path": "/DATA/backup", "error": ""
        }"#;
        let status: TaskStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, TaskState::Verifying);
        assert_eq!(status.eta, 0);
        assert_eq!(status.verify_failed_files, 1);
        assert_eq!(status.source_folders, vec!["/vol1/media".to_string()]);
    }

    #[test]
    fn test_enforce_monotonic_while_active() {
        let prev = TaskStatus {
            status: TaskState::Running,
            processed_files: 5,
            total_files: 10,
            transferred_size: 500,
            total_size: 1000,
            ..Default::default()
        };
        let mut next = TaskStatus {
            status: TaskState::Running,
            processed_files: 4,
            total_files: 10,
            transferred_size: 450,
            total_size: 1000,
            ..Default::default()
        };
        next.enforce_monotonic(Some(&prev));
        assert_eq!(next.processed_files, 5);
        assert_eq!(next.transferred_size, 500);
    }

    #[test]
    fn test_enforce_monotonic_caps_at_totals() {
        let mut status = TaskStatus {
            status: TaskState::Running,
            processed_files: 12,
            total_files: 10,
            transferred_size: 2000,
            total_size: 1000,
            ..Default::default()
        };
        status.enforce_monotonic(None);
        assert_eq!(status.processed_files, 10);
        assert_eq!(status.transferred_size, 1000);
    }

    #[test]
    fn test_storage_target_health_and_space() {
        let json = r#"{"name":"Disk 1","path":"/media/HDD1","type":"HDD",
            "extensions":{"health":true,"size":1000,"used":1200}}"#;
        let target: StorageTarget = serde_json::from_str(json).unwrap();
        assert_eq!(target.kind, StorageKind::Hdd);
        assert!(target.is_healthy());
        assert_eq!(target.available_bytes(), 0);
    }

    #[test]
    fn test_history_record_decodes_embedded_json() {
        let task = MigrationTask {
            source_folders: r#"["/vol1/media","/vol2/docs"]"#.to_string(),
            options: r#"{"overwrite_existing":true,"skip_errors":false,"preserve_times":true,"include_recycle":false}"#
                .to_string(),
            ..Default::default()
        };
        assert_eq!(task.source_folder_list().len(), 2);
        let options = task.migration_options().unwrap();
        assert!(options.overwrite_existing);
        assert!(!options.skip_errors);
    }

    #[test]
    fn test_scan_result_walks_nested_folders() {
        let json = r#"{"volumes":[{"name":"vol1","path":"/vol1","folders":[
            {"path":"/vol1/media","name":"media","size":10,"file_count":2,
             "modified_time":"2024-01-01T00:00:00Z","children":[
                {"path":"/vol1/media/tv","name":"tv","size":5,"file_count":1,
                 "modified_time":"2024-01-01T00:00:00Z"}]}]}],
            "scanned_at":"2024-01-01T00:00:00Z"}"#;
        let scan: ScanResult = serde_json::from_str(json).unwrap();
        assert_eq!(scan.folders().len(), 2);
        assert_eq!(scan.find_folder("/vol1/media/tv").unwrap().name, "tv");
    }

    #[test]
    fn test_device_host() {
        let device = DiscoveredDevice {
            ip: "10.0.0.2".to_string(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(device.host(), "http://10.0.0.2");

        let device = DiscoveredDevice {
            lan_ipv4: vec!["10.0.0.3".to_string()],
            port: 8080,
            ..Default::default()
        };
        assert_eq!(device.host(), "http://10.0.0.3:8080");
    }

    #[test]
    fn test_null_lists_decode_as_empty() {
        let json = r#"{"name":"volume1","path":"/volume1","folders":null}"#;
        let volume: VolumeInfo = serde_json::from_str(json).unwrap();
        assert!(volume.folders.is_empty());

        let json = r#"{"path":"/vol1/a","name":"a","size":1,"file_count":1,
            "modified_time":"2024-01-01T00:00:00Z","children":null}"#;
        let folder: FolderInfo = serde_json::from_str(json).unwrap();
        assert!(folder.children.is_empty());

        let json = r#"{"device_name":"nas","ip":"10.0.0.2","lan_ipv4":null,"port":80}"#;
        let device: DiscoveredDevice = serde_json::from_str(json).unwrap();
        assert!(device.lan_ipv4.is_empty());
        assert_eq!(device.host(), "http://10.0.0.2");

        let json = r#"{"task_id":"T1","status":"running","source_folders":null}"#;
        let status: TaskStatus = serde_json::from_str(json).unwrap();
        assert!(status.source_folders.is_empty());

        let list: DeviceList = serde_json::from_str(r#"{"devices":null,"count":0}"#).unwrap();
        assert!(list.devices.is_empty());
    }
}
