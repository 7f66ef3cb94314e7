//! Live status polling with optimistic cancel.
//!
//! One background loop per attached task fetches the status on a fixed
//! cadence and feeds the [`TaskStore`]. Every result passes through
//! [`reconcile`] against the task's [`SyncState`] before it is applied, so a
//! stale poll answer can never undo a cancel the user already issued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::types::{TaskState, TaskStatus};
use crate::api::MigrationApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::input_validation::validate_task_id;
use crate::logging::ActivityLog;
use crate::tasks::store::TaskStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Per-task reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Poll results are applied as they arrive.
    Syncing,
    /// Cancel was shown locally before the server confirmed it. `previous`
    /// is what to restore if the command fails (`None`: there was no
    /// snapshot yet).
    PendingCancel { previous: Option<TaskState> },
    /// A terminal status has been applied.
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Apply(SyncState),
    Discard,
}

/// Decide what to do with a poll result reporting `incoming`.
pub fn reconcile(state: SyncState, incoming: TaskState) -> Reconciliation {
    match state {
        SyncState::PendingCancel { .. } if incoming != TaskState::Cancelled => Reconciliation::Discard,
        SyncState::Settled if !incoming.is_terminal() => Reconciliation::Discard,
        _ if incoming.is_terminal() => Reconciliation::Apply(SyncState::Settled),
        _ => Reconciliation::Apply(SyncState::Syncing),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Applied { task_id: String, status: TaskState },
    Discarded { task_id: String, status: TaskState },
    PollFailed { task_id: String, message: String },
    CancelRolledBack {
        task_id: String,
        restored: Option<TaskState>,
        message: String,
    },
}

/// Which view is monitoring; the detail view polls less often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCadence {
    Wizard,
    Detail,
}

struct Shared<A: ?Sized> {
    api: Arc<A>,
    store: Arc<RwLock<TaskStore>>,
    states: Mutex<HashMap<String, SyncState>>,
    events: broadcast::Sender<SyncEvent>,
    activity: Arc<ActivityLog>,
}

impl<A: ?Sized> Shared<A> {
    fn states(&self) -> MutexGuard<'_, HashMap<String, SyncState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forget `task_id`'s sync state unless a cancel is still unconfirmed.
    fn release_state(&self, task_id: &str) {
        let mut states = self.states();
        if !matches!(states.get(task_id), Some(SyncState::PendingCancel { .. })) {
            states.remove(task_id);
        }
    }
}

impl<A: MigrationApi + ?Sized> Shared<A> {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn fetch(&self, task_id: &str, token: Option<&CancellationToken>) -> Result<()> {
        let status = self.api.task_status(task_id).await?;
        self.apply(task_id, status, token).await;
        Ok(())
    }

    /// Apply `status` unless the attachment is gone or reconciliation
    /// rejects it. The detach check happens under the store lock and the
    /// states lock, so a detached loop never recreates pruned state.
    async fn apply(&self, task_id: &str, status: TaskStatus, token: Option<&CancellationToken>) -> bool {
        let incoming = status.status;
        let mut store = self.store.write().await;

        let accepted = {
            let mut states = self.states();
            if token.is_some_and(|t| t.is_cancelled()) {
                false
            } else {
                let state = states
                    .entry(task_id.to_string())
                    .or_insert(SyncState::Syncing);
                match reconcile(*state, incoming) {
                    Reconciliation::Apply(next) => {
                        *state = next;
                        true
                    }
                    Reconciliation::Discard => false,
                }
            }
        };

        if accepted {
            let applied = store.apply_status(task_id, status);
            log::debug!(
                "[{task_id}] {} {}/{} files",
                applied.status.label(),
                applied.processed_files,
                applied.total_files
            );
            drop(store);
            if incoming.is_terminal() {
                self.activity
                    .info(&format!("Task {}", incoming.label().to_lowercase()), Some(task_id));
            }
            self.emit(SyncEvent::Applied {
                task_id: task_id.to_string(),
                status: incoming,
            });
        } else {
            drop(store);
            log::debug!("[{task_id}] discarded {} snapshot", incoming.label());
            self.emit(SyncEvent::Discarded {
                task_id: task_id.to_string(),
                status: incoming,
            });
        }
        accepted
    }

    async fn run(
        self: Arc<Self>,
        task_id: String,
        period: Duration,
        token: CancellationToken,
        first: oneshot::Sender<Result<()>>,
    ) {
        let _ = first.send(self.fetch(&task_id, Some(&token)).await);

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // The fetch is awaited in-loop; ticks missed meanwhile are dropped,
        // never queued.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.fetch(&task_id, Some(&token)).await {
                if token.is_cancelled() {
                    break;
                }
                self.activity
                    .warn(&format!("Status poll failed: {e}"), Some(&task_id));
                self.emit(SyncEvent::PollFailed {
                    task_id: task_id.clone(),
                    message: e.to_string(),
                });
            }
        }
        log::debug!("[{task_id}] polling stopped");
    }

    async fn roll_back_cancel(&self, task_id: &str, error: &ClientError) {
        let mut store = self.store.write().await;
        let restored = {
            let mut states = self.states();
            match states.get(task_id).copied() {
                Some(SyncState::PendingCancel { previous }) => {
                    let next = if previous.is_some_and(TaskState::is_terminal) {
                        SyncState::Settled
                    } else {
                        SyncState::Syncing
                    };
                    states.insert(task_id.to_string(), next);
                    previous
                }
                // A cancelled snapshot already arrived; nothing to undo.
                _ => return,
            }
        };

        match restored {
            Some(previous) => {
                store.override_state(task_id, previous);
            }
            None => {
                store.remove_live(task_id);
            }
        }
        drop(store);

        self.activity
            .error(&format!("Cancel failed: {error}"), Some(task_id));
        self.emit(SyncEvent::CancelRolledBack {
            task_id: task_id.to_string(),
            restored,
            message: error.to_string(),
        });
    }
}

/// A running poll loop. Dropping it stops the loop.
struct Attachment {
    cadence: PollCadence,
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Keeps live snapshots in the [`TaskStore`] current for every attached task.
pub struct TaskSynchronizer<A: ?Sized> {
    shared: Arc<Shared<A>>,
    attachments: Mutex<HashMap<String, Attachment>>,
    wizard_interval: Duration,
    detail_interval: Duration,
}

impl<A: MigrationApi + ?Sized + 'static> TaskSynchronizer<A> {
    pub fn new(api: Arc<A>, store: Arc<RwLock<TaskStore>>, activity: Arc<ActivityLog>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                states: Mutex::new(HashMap::new()),
                events,
                activity,
            }),
            attachments: Mutex::new(HashMap::new()),
            wizard_interval: Duration::from_secs(1),
            detail_interval: Duration::from_secs(2),
        }
    }

    pub fn with_intervals(mut self, wizard: Duration, detail: Duration) -> Self {
        self.wizard_interval = wizard;
        self.detail_interval = detail;
        self
    }

    pub fn with_config(self, config: &ClientConfig) -> Self {
        self.with_intervals(config.wizard_poll_interval(), config.detail_poll_interval())
    }

    pub fn store(&self) -> Arc<RwLock<TaskStore>> {
        self.shared.store.clone()
    }

    pub fn activity(&self) -> Arc<ActivityLog> {
        self.shared.activity.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    pub fn sync_state(&self, task_id: &str) -> Option<SyncState> {
        self.shared.states().get(task_id).copied()
    }

    pub fn interval_for(&self, cadence: PollCadence) -> Duration {
        match cadence {
            PollCadence::Wizard => self.wizard_interval,
            PollCadence::Detail => self.detail_interval,
        }
    }

    /// Start monitoring `task_id`: fetch once right away, then keep polling
    /// at the cadence's interval. Attaching an already attached task
    /// replaces its loop.
    ///
    /// The first fetch's error is returned, since there is no earlier
    /// snapshot to fall back on; the loop keeps running regardless. Later
    /// poll failures are only logged.
    pub async fn attach(&self, task_id: &str, cadence: PollCadence) -> Result<()> {
        validate_task_id(task_id)?;

        self.shared
            .states()
            .entry(task_id.to_string())
            .or_insert(SyncState::Syncing);

        let token = CancellationToken::new();
        let (first_tx, first_rx) = oneshot::channel();
        let handle = tokio::spawn(self.shared.clone().run(
            task_id.to_string(),
            self.interval_for(cadence),
            token.clone(),
            first_tx,
        ));

        let replaced = self
            .lock_attachments()
            .insert(
                task_id.to_string(),
                Attachment {
                    cadence,
                    token,
                    _handle: handle,
                },
            )
            .is_some();
        if replaced {
            log::debug!("[{task_id}] replaced existing poll loop");
        }
        self.shared
            .activity
            .info(&format!("Monitoring started ({cadence:?})"), Some(task_id));

        match first_rx.await {
            Ok(result) => {
                if let Err(e) = &result {
                    self.shared
                        .activity
                        .error(&format!("Failed to load task status: {e}"), Some(task_id));
                }
                result
            }
            // The loop ended before its first fetch completed.
            Err(_) => Ok(()),
        }
    }

    /// Fetch and apply once, outside any poll loop.
    pub async fn refresh(&self, task_id: &str) -> Result<()> {
        validate_task_id(task_id)?;
        self.shared.fetch(task_id, None).await
    }

    /// Show the task as cancelled immediately, then ask the server. Until a
    /// cancelled snapshot arrives every other poll result is discarded; if
    /// the command fails the previous state comes back.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        validate_task_id(task_id)?;

        {
            let mut store = self.shared.store.write().await;
            let overridden = store.override_state(task_id, TaskState::Cancelled);
            let mut states = self.shared.states();
            let previous = match states.get(task_id) {
                Some(SyncState::PendingCancel { previous }) => *previous,
                _ => overridden,
            };
            states.insert(task_id.to_string(), SyncState::PendingCancel { previous });
        }
        self.shared.activity.info("Cancel requested", Some(task_id));

        match self.shared.api.cancel_task(task_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.roll_back_cancel(task_id, &e).await;
                Err(e)
            }
        }
    }

    /// Pause is observed through the next poll; nothing changes locally.
    pub async fn pause(&self, task_id: &str) -> Result<()> {
        match self.shared.api.pause_task(task_id).await {
            Ok(()) => {
                self.shared.activity.info("Pause requested", Some(task_id));
                Ok(())
            }
            Err(e) => {
                self.shared
                    .activity
                    .error(&format!("Pause failed: {e}"), Some(task_id));
                Err(e)
            }
        }
    }

    pub async fn resume(&self, task_id: &str) -> Result<()> {
        match self.shared.api.resume_task(task_id).await {
            Ok(()) => {
                self.shared.activity.info("Resume requested", Some(task_id));
                Ok(())
            }
            Err(e) => {
                self.shared
                    .activity
                    .error(&format!("Resume failed: {e}"), Some(task_id));
                Err(e)
            }
        }
    }
}

impl<A: ?Sized> TaskSynchronizer<A> {
    fn lock_attachments(&self) -> MutexGuard<'_, HashMap<String, Attachment>> {
        self.attachments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop monitoring `task_id`. A request already in flight completes but
    /// its result is discarded. An unconfirmed cancel keeps its state so a
    /// failed command can still roll back.
    pub fn detach(&self, task_id: &str) -> bool {
        let removed = self.lock_attachments().remove(task_id);
        let detached = removed.is_some();
        // Cancels the loop's token before its state is pruned.
        drop(removed);
        self.shared.release_state(task_id);
        if detached {
            log::debug!("[{task_id}] detached");
        }
        detached
    }

    pub fn detach_all(&self) {
        let removed: Vec<String> = self
            .lock_attachments()
            .drain()
            .map(|(task_id, _)| task_id)
            .collect();
        for task_id in removed {
            self.shared.release_state(&task_id);
        }
    }

    /// Stop every loop and forget all sync state, pending cancels included.
    pub fn reset(&self) {
        self.lock_attachments().clear();
        self.shared.states().clear();
    }

    pub fn is_attached(&self, task_id: &str) -> bool {
        self.lock_attachments().contains_key(task_id)
    }

    pub fn cadence(&self, task_id: &str) -> Option<PollCadence> {
        self.lock_attachments().get(task_id).map(|a| a.cadence)
    }

    pub fn attached_tasks(&self) -> Vec<String> {
        self.lock_attachments().keys().cloned().collect()
    }
}

impl<A: ?Sized> Drop for TaskSynchronizer<A> {
    fn drop(&mut self) {
        self.lock_attachments().clear();
    }
}
