use std::collections::HashMap;

use serde::Serialize;

use crate::api::types::{MigrationTask, TaskPage, TaskState, TaskStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Number of pages needed for `total` items at `limit` per page.
pub fn total_pages(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(u64::from(limit)).min(u64::from(u32::MAX)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Zero-based
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    fn new(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size,
            total: 0,
            total_pages: 0,
        }
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_mul(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }
}

/// Server-owned task data as last seen by this client: one page of history
/// plus the latest live snapshot per task id. Never persisted.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: Vec<MigrationTask>,
    live: HashMap<String, TaskStatus>,
    filter: Option<TaskState>,
    pagination: Pagination,
    loading: bool,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            tasks: Vec::new(),
            live: HashMap::new(),
            filter: None,
            pagination: Pagination::new(page_size.max(1)),
            loading: false,
        }
    }

    pub fn tasks(&self) -> &[MigrationTask] {
        &self.tasks
    }

    /// History records matching the status filter.
    pub fn filtered_tasks(&self) -> Vec<&MigrationTask> {
        self.tasks
            .iter()
            .filter(|t| self.filter.map_or(true, |state| t.status == state))
            .collect()
    }

    pub fn filter(&self) -> Option<TaskState> {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Option<TaskState>) {
        self.filter = filter;
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Replace the history with one fetched page. Records with a newer live
    /// snapshot keep the live counters.
    pub fn set_page(&mut self, page: u32, result: TaskPage) {
        let limit = if result.limit > 0 {
            result.limit
        } else {
            self.pagination.page_size
        };

        self.tasks = result.tasks;
        for task in &mut self.tasks {
            if let Some(status) = self.live.get(&task.task_id) {
                task.absorb(status);
            }
        }

        self.pagination = Pagination {
            page,
            page_size: limit,
            total: result.total,
            total_pages: total_pages(result.total, limit),
        };
    }

    pub fn live_status(&self, task_id: &str) -> Option<&TaskStatus> {
        self.live.get(task_id)
    }

    pub fn live_statuses(&self) -> &HashMap<String, TaskStatus> {
        &self.live
    }

    /// Store a poll result as the task's snapshot. Counters never fall below
    /// the previous active snapshot and never exceed their totals.
    pub fn apply_status(&mut self, task_id: &str, mut status: TaskStatus) -> &TaskStatus {
        if status.task_id.is_empty() {
            status.task_id = task_id.to_string();
        }
        status.enforce_monotonic(self.live.get(task_id));

        if let Some(record) = self.tasks.iter_mut().find(|t| t.task_id == task_id) {
            record.absorb(&status);
        }

        let slot = self.live.entry(task_id.to_string()).or_default();
        *slot = status;
        slot
    }

    /// Overwrite only the state field of a snapshot, creating a bare one if
    /// none exists. Returns the state it replaced.
    pub fn override_state(&mut self, task_id: &str, state: TaskState) -> Option<TaskState> {
        let previous = self.live.get(task_id).map(|s| s.status);
        let slot = self.live.entry(task_id.to_string()).or_insert_with(|| TaskStatus {
            task_id: task_id.to_string(),
            ..Default::default()
        });
        slot.status = state;

        if let Some(record) = self.tasks.iter_mut().find(|t| t.task_id == task_id) {
            record.status = state;
        }
        previous
    }

    pub fn remove_live(&mut self, task_id: &str) -> Option<TaskStatus> {
        self.live.remove(task_id)
    }

    pub fn reset(&mut self) {
        *self = Self::with_page_size(self.pagination.page_size);
    }
}
