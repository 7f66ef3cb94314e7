pub mod api;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod input_validation;
pub mod logging;
pub mod recovery;
pub mod tasks;
pub mod workflow;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

pub use api::{HttpGateway, MigrationApi};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use logging::ActivityLog;
pub use recovery::{monitor_route, MemoryNavigator, Navigator, RecoveryController};
pub use tasks::{PollCadence, ProgressView, SyncEvent, SyncState, TaskStore, TaskSynchronizer};
pub use workflow::{SessionStorage, WorkflowStep, WorkflowStore};

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Everything a client session owns, wired together.
///
/// Both stores are single-writer containers: the workflow behind a mutex,
/// the task store behind the lock the synchronizer writes through.
pub struct ClientState<A: MigrationApi + ?Sized + 'static> {
    pub config: ClientConfig,
    pub api: Arc<A>,
    pub workflow: Arc<Mutex<WorkflowStore>>,
    pub tasks: Arc<RwLock<TaskStore>>,
    pub activity: Arc<ActivityLog>,
    pub synchronizer: TaskSynchronizer<A>,
    pub recovery: RecoveryController,
}

impl<A: MigrationApi + ?Sized + 'static> ClientState<A> {
    /// Restore the workflow from `session` and build fresh task state.
    pub fn new(config: ClientConfig, api: Arc<A>, session: Arc<dyn SessionStorage>) -> Self {
        let workflow = WorkflowStore::restore(session).with_scan_ttl(config.scan_cache_ttl());
        let tasks = Arc::new(RwLock::new(TaskStore::with_page_size(config.history_page_size)));
        let activity = Arc::new(ActivityLog::default());
        let synchronizer =
            TaskSynchronizer::new(api.clone(), tasks.clone(), activity.clone()).with_config(&config);

        Self {
            config,
            api,
            workflow: Arc::new(Mutex::new(workflow)),
            tasks,
            activity,
            synchronizer,
            recovery: RecoveryController::new(),
        }
    }

    /// Startup recovery against the restored workflow. See
    /// [`RecoveryController::run_once`].
    pub async fn recover(&mut self, navigator: &mut dyn Navigator) -> Option<String> {
        let workflow = self.workflow.lock().await;
        self.recovery.run_once(workflow.state(), navigator)
    }

    /// Start over: stop every poll loop and return both stores to defaults.
    pub async fn reset(&self) {
        self.synchronizer.reset();
        self.workflow.lock().await.reset();
        self.tasks.write().await.reset();
    }
}

impl ClientState<HttpGateway> {
    pub fn connect(config: ClientConfig, session: Arc<dyn SessionStorage>) -> Self {
        let api = Arc::new(HttpGateway::new(&config));
        Self::new(config, api, session)
    }
}
