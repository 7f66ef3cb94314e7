//! Presentation-neutral view of a [`TaskStatus`].
//!
//! Transfer and verification are separate axes. The overall percentage is
//! whatever the server reported; nothing here recomputes it.

use serde::Serialize;

use crate::api::types::{TaskState, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressAxis {
    pub done: u64,
    pub total: u64,
}

impl ProgressAxis {
    pub fn new(done: u64, total: u64) -> Self {
        Self { done, total }
    }

    /// 0.0 to 1.0; an empty axis reads as 0.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentFile {
    pub path: String,
    pub transferred: u64,
    pub size: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub state: TaskState,
    pub percent: f64,
    pub files: ProgressAxis,
    pub bytes: ProgressAxis,
    /// Only while verifying
    pub verification: Option<ProgressAxis>,
    pub current_file: Option<CurrentFile>,
    pub failed_files: u64,
    pub verify_failed_files: u64,
    pub speed: u64,
    pub eta_secs: u64,
}

impl ProgressView {
    pub fn from_status(status: &TaskStatus) -> Self {
        let verification = (status.status == TaskState::Verifying)
            .then(|| ProgressAxis::new(status.verifying_files, status.total_files));

        let current_file = (!status.current_file.is_empty()).then(|| CurrentFile {
            path: status.current_file.clone(),
            transferred: status.current_file_transferred,
            size: status.current_file_size,
            percent: status.current_file_progress.clamp(0.0, 100.0),
        });

        Self {
            state: status.status,
            percent: status.progress.clamp(0.0, 100.0),
            files: ProgressAxis::new(status.processed_files, status.total_files),
            bytes: ProgressAxis::new(status.transferred_size, status.total_size),
            verification,
            current_file,
            failed_files: status.failed_files,
            verify_failed_files: status.verify_failed_files,
            speed: status.speed,
            eta_secs: status.eta,
        }
    }

    /// One line for terminals and logs.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {:.1}% | {}/{} files | {} / {}",
            self.state.label(),
            self.percent,
            self.files.done,
            self.files.total,
            format_bytes(self.bytes.done),
            format_bytes(self.bytes.total),
        );
        if let Some(verify) = &self.verification {
            line.push_str(&format!(" | verified {}/{}", verify.done, verify.total));
        }
        if self.state.is_active() && self.speed > 0 {
            line.push_str(&format!(
                " | {}/s, {} left",
                format_bytes(self.speed),
                format_duration(self.eta_secs)
            ));
        }
        if self.failed_files > 0 || self.verify_failed_files > 0 {
            line.push_str(&format!(
                " | failed {} (verify {})",
                self.failed_files, self.verify_failed_files
            ));
        }
        line
    }
}

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
