//! Structured task logging utilities.
//!
//! Consistent lifecycle logging for task processing, with the task ID and
//! kind attached to every line.

use tracing::{error, info, warn, Span};

use vindex_models::{TaskId, TaskKind};

/// Task logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    kind: String,
}

impl TaskLogger {
    /// Create a new logger for a task.
    pub fn new(task_id: &TaskId, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Log the start of task processing.
    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            kind = %self.kind,
            "Task started: {}", message
        );
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            kind = %self.kind,
            "Task progress: {}", message
        );
    }

    /// Log a warning.
    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            kind = %self.kind,
            "Task warning: {}", message
        );
    }

    /// Log an error.
    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            kind = %self.kind,
            "Task error: {}", message
        );
    }

    /// Log completion.
    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            kind = %self.kind,
            "Task completed: {}", message
        );
    }

    /// Create a tracing span for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            kind = %self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_carries_task_identity() {
        let task_id = TaskId::from("task-1");
        let logger = TaskLogger::new(&task_id, TaskKind::Ocr);
        assert_eq!(logger.task_id, "task-1");
        assert_eq!(logger.kind, "ocr");
    }
}
