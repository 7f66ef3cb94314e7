//! Scripted in-memory backend shared by the async tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::api::types::{
    ConnectionToken, CreateMigrationRequest, CreatedTask, Credentials, DeviceList, FolderInfo,
    HealthStatus, MigrationTask, ScanResult, StorageList, TaskPage, TaskState, TaskStatus,
};
use crate::api::MigrationApi;
use crate::error::{ClientError, Result};

/// Status replies are served in order; once the script runs out the last
/// successful one repeats. While [`ScriptedApi::hold_statuses`] is in
/// effect, replies are taken from the script but not returned.
pub struct ScriptedApi {
    statuses: Mutex<VecDeque<Result<TaskStatus>>>,
    last: Mutex<Option<TaskStatus>>,
    cancel_error: Mutex<Option<String>>,
    commands: Mutex<Vec<String>>,
    created: Mutex<Vec<CreateMigrationRequest>>,
    history: Mutex<Vec<MigrationTask>>,
    status_calls: AtomicU32,
    held: watch::Sender<bool>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::default(),
            last: Mutex::default(),
            cancel_error: Mutex::default(),
            commands: Mutex::default(),
            created: Mutex::default(),
            history: Mutex::default(),
            status_calls: AtomicU32::new(0),
            held: watch::channel(false).0,
        }
    }

    pub fn hold_statuses(&self) {
        self.held.send_replace(true);
    }

    pub fn release_statuses(&self) {
        self.held.send_replace(false);
    }

    /// Scripted replies not yet taken.
    pub fn queued(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn push_status(&self, status: TaskStatus) {
        self.statuses.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_error(&self, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(ClientError::RequestFailed(message.to_string())));
    }

    pub fn fail_cancel(&self, message: &str) {
        *self.cancel_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_history(&self, tasks: Vec<MigrationTask>) {
        *self.history.lock().unwrap() = tasks;
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<CreateMigrationRequest> {
        self.created.lock().unwrap().clone()
    }

    fn next_status(&self) -> Result<TaskStatus> {
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => {
                *self.last.lock().unwrap() = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ClientError::RequestFailed("task not found".to_string())),
        }
    }

    fn command(&self, name: &str, task_id: &str) {
        self.commands.lock().unwrap().push(format!("{name}:{task_id}"));
    }
}

pub fn status(state: TaskState, processed: u64, transferred: u64) -> TaskStatus {
    TaskStatus {
        task_id: "T1".to_string(),
        status: state,
        processed_files: processed,
        total_files: 10,
        transferred_size: transferred,
        total_size: 1000,
        progress: transferred as f64 / 10.0,
        ..Default::default()
    }
}

#[async_trait]
impl MigrationApi for ScriptedApi {
    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".to_string(),
        })
    }

    async fn scan(&self) -> Result<ScanResult> {
        Ok(ScanResult {
            volumes: Vec::new(),
            scanned_at: Utc::now(),
        })
    }

    async fn discover_devices(&self) -> Result<DeviceList> {
        Ok(DeviceList {
            devices: Vec::new(),
            count: 0,
        })
    }

    async fn folder_details(&self, path: &str) -> Result<FolderInfo> {
        Err(ClientError::RequestFailed(format!("folder not found: {path}")))
    }

    async fn test_connection(&self, _credentials: &Credentials) -> Result<ConnectionToken> {
        Ok(ConnectionToken {
            token: "token".to_string(),
        })
    }

    async fn list_storages(&self, _credentials: &Credentials) -> Result<StorageList> {
        Ok(StorageList {
            storages: Vec::new(),
            count: 0,
        })
    }

    async fn create_migration(&self, request: &CreateMigrationRequest) -> Result<CreatedTask> {
        self.created.lock().unwrap().push(request.clone());
        Ok(CreatedTask {
            task_id: "T1".to_string(),
        })
    }

    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_status();
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;
        reply
    }

    async fn list_tasks(&self, limit: u32, offset: u32) -> Result<TaskPage> {
        let history = self.history.lock().unwrap();
        let tasks = history
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(TaskPage {
            tasks,
            total: history.len() as u64,
            limit,
            offset,
        })
    }

    async fn pause_task(&self, task_id: &str) -> Result<()> {
        self.command("pause", task_id);
        Ok(())
    }

    async fn resume_task(&self, task_id: &str) -> Result<()> {
        self.command("resume", task_id);
        Ok(())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.command("cancel", task_id);
        match self.cancel_error.lock().unwrap().clone() {
            Some(message) => Err(ClientError::RequestFailed(message)),
            None => Ok(()),
        }
    }
}
