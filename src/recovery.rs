//! Startup reconciliation between the persisted workflow and the visible
//! location.

use crate::workflow::store::{WorkflowState, WorkflowStep};

const MONITOR_ROUTE_PREFIX: &str = "/workflow/migration/";

pub fn monitor_route(task_id: &str) -> String {
    format!("{MONITOR_ROUTE_PREFIX}{task_id}")
}

/// Whatever owns the current location (a router, a CLI loop, a test).
pub trait Navigator {
    fn location(&self) -> String;
    /// Replace the current location without adding a history entry.
    fn replace(&mut self, route: &str);
}

/// Navigator that only remembers where it is.
#[derive(Debug, Clone, Default)]
pub struct MemoryNavigator {
    location: String,
    replacements: Vec<String>,
}

impl MemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            replacements: Vec::new(),
        }
    }

    pub fn replacements(&self) -> &[String] {
        &self.replacements
    }
}

impl Navigator for MemoryNavigator {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn replace(&mut self, route: &str) {
        self.location = route.to_string();
        self.replacements.push(route.to_string());
    }
}

fn same_route(location: &str, route: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/') == route
}

/// Sends a reloaded client back to the task it was monitoring.
///
/// Runs once per instance; later calls do nothing, so navigating away from
/// the monitor view afterwards is never overridden.
#[derive(Debug, Default)]
pub struct RecoveryController {
    has_run: bool,
}

impl RecoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Returns the route navigated to, if a redirect happened.
    pub fn run_once(&mut self, state: &WorkflowState, navigator: &mut dyn Navigator) -> Option<String> {
        if self.has_run {
            return None;
        }
        self.has_run = true;

        let task_id = state.task_id.as_deref()?;
        if state.step != WorkflowStep::Monitor {
            return None;
        }

        let route = monitor_route(task_id);
        if same_route(&navigator.location(), &route) {
            return None;
        }

        log::info!("Resuming task {task_id} at {route}");
        navigator.replace(&route);
        Some(route)
    }
}
