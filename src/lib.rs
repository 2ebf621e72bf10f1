pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    create_task_impl, delete_task_impl, get_remote_stats_impl, get_stats_impl,
    list_remote_sessions_impl, list_sessions_impl, list_tasks_impl, log_session_impl,
    remote_session_client, timer_driver_impl, toggle_task_completion_impl, update_task_impl,
    AppState, SessionEntryResponse, TaskResponse,
};
pub use application::events::{SessionEvent, SessionEventBus, SessionSubscription};
pub use application::session_recorder::{LocalSessionSink, SessionRecorder};
pub use application::timer_driver::{
    RemoteSessionSink, SessionSink, TimerDriver, TimerDriverHandle,
};
pub use domain::models::{PeriodStats, Session, SessionStats, SessionWithTask, Task, TaskRef};
pub use domain::timer::{PomodoroTimer, TimerConfig, TimerPhase, TimerSnapshot};
pub use infrastructure::error::InfraError;

use application::bootstrap::bootstrap_workspace;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
}

/// Prepares the workspace at `root`, or the current directory when unset.
pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}
