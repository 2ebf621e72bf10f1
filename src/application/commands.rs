use crate::application::bootstrap::bootstrap_workspace;
use crate::application::events::SessionEventBus;
use crate::application::session_recorder::{LocalSessionSink, SessionRecorder};
use crate::application::timer_driver::{RemoteSessionSink, SessionSink, TimerDriver};
use crate::domain::models::{
    parse_due_date, NewTask, Session, SessionStats, SessionWithTask, Task, TaskUpdate,
};
use crate::domain::timer::PomodoroTimer;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::{
    read_api_settings, read_notification_kind, read_stats_calendar, read_timer_config,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification::player_for;
use crate::infrastructure::session_api_client::{
    sessions_or_empty, stats_or_zero, ReqwestSessionApiClient, SessionApiClient,
};
use crate::infrastructure::session_repository::SqliteSessionRepository;
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type LocalRecorder = SessionRecorder<SqliteSessionRepository, SqliteTaskRepository>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    log: Arc<CommandLog>,
    tasks: Arc<SqliteTaskRepository>,
    recorder: Arc<LocalRecorder>,
    events: SessionEventBus,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let log = Arc::new(CommandLog::new(&bootstrap.logs_dir));
        let calendar = read_stats_calendar(&bootstrap.config_dir)?;
        let tasks = Arc::new(SqliteTaskRepository::new(&bootstrap.database_path));
        let recorder = SessionRecorder::new(
            Arc::new(SqliteSessionRepository::new(&bootstrap.database_path)),
            Arc::clone(&tasks),
        )
        .with_calendar(calendar)
        .with_log(Arc::clone(&log));

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            log,
            tasks,
            recorder: Arc::new(recorder),
            events: SessionEventBus::new(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    pub fn command_log(&self) -> Arc<CommandLog> {
        Arc::clone(&self.log)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.log.info(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.log.error(command, message);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub is_overdue: bool,
}

impl TaskResponse {
    fn at(task: Task, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: task.is_overdue(now),
            task,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionEntryResponse {
    #[serde(flatten)]
    pub entry: SessionWithTask,
    pub formatted_duration: String,
}

fn require_non_empty<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(value)
}

fn parse_optional_due_date(due_date: Option<&str>) -> Result<Option<DateTime<Utc>>, InfraError> {
    match due_date.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_due_date(value)
            .map(Some)
            .map_err(InfraError::Validation),
        None => Ok(None),
    }
}

fn load_owned_task(state: &AppState, user_id: &str, task_id: &str) -> Result<Task, InfraError> {
    state
        .tasks
        .get(user_id, task_id)?
        .ok_or_else(|| InfraError::NotFound(format!("task not found: {task_id}")))
}

pub fn create_task_impl(
    state: &AppState,
    user_id: String,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    estimated_pomodoros: Option<u32>,
) -> Result<TaskResponse, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let now = Utc::now();
    let task = NewTask {
        title,
        description,
        due_date: parse_optional_due_date(due_date.as_deref())?,
        estimated_pomodoros,
    }
    .into_task(user_id, now)
    .map_err(InfraError::Validation)?;

    state.tasks.insert(&task)?;
    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(TaskResponse::at(task, now))
}

pub fn list_tasks_impl(state: &AppState, user_id: String) -> Result<Vec<TaskResponse>, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let now = Utc::now();
    let tasks = state.tasks.list_for_user(user_id)?;
    state.log_info("list_tasks", &format!("listed {} tasks", tasks.len()));
    Ok(tasks
        .into_iter()
        .map(|task| TaskResponse::at(task, now))
        .collect())
}

/// An empty `due_date` clears it; an `estimated_pomodoros` of zero clears the
/// estimate.
#[allow(clippy::too_many_arguments)]
pub fn update_task_impl(
    state: &AppState,
    user_id: String,
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
    estimated_pomodoros: Option<u32>,
    is_completed: Option<bool>,
) -> Result<TaskResponse, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let task_id = require_non_empty(&task_id, "task_id")?;
    let mut task = load_owned_task(state, user_id, task_id)?;

    let due_date = match due_date {
        Some(raw) => Some(parse_optional_due_date(Some(&raw))?),
        None => None,
    };
    let now = Utc::now();
    TaskUpdate {
        title,
        description,
        due_date,
        estimated_pomodoros,
        is_completed,
    }
    .apply_to(&mut task, now)
    .map_err(InfraError::Validation)?;

    if !state.tasks.update(&task)? {
        return Err(InfraError::NotFound(format!("task not found: {task_id}")));
    }
    // Re-read so a counter bumped by a concurrent session is reported.
    let task = load_owned_task(state, user_id, task_id)?;
    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(TaskResponse::at(task, now))
}

pub fn toggle_task_completion_impl(
    state: &AppState,
    user_id: String,
    task_id: String,
) -> Result<TaskResponse, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let task_id = require_non_empty(&task_id, "task_id")?;
    let current = load_owned_task(state, user_id, task_id)?;
    update_task_impl(
        state,
        user_id.to_string(),
        task_id.to_string(),
        None,
        None,
        None,
        None,
        Some(!current.is_completed),
    )
}

pub fn delete_task_impl(
    state: &AppState,
    user_id: String,
    task_id: String,
) -> Result<bool, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let task_id = require_non_empty(&task_id, "task_id")?;
    if !state.tasks.delete(user_id, task_id)? {
        return Err(InfraError::NotFound(format!("task not found: {task_id}")));
    }
    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

pub fn log_session_impl(
    state: &AppState,
    user_id: String,
    task_id: String,
    duration_seconds: u32,
) -> Result<Session, InfraError> {
    let session = state
        .recorder
        .log_session(&user_id, &task_id, duration_seconds)?;
    state.log_info(
        "log_session",
        &format!(
            "logged session_id={} task_id={} minutes={}",
            session.id, session.task_id, session.duration_minutes
        ),
    );
    Ok(session)
}

pub fn list_sessions_impl(
    state: &AppState,
    user_id: String,
) -> Result<Vec<SessionEntryResponse>, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let sessions = state.recorder.get_sessions(user_id)?;
    state.log_info("list_sessions", &format!("listed {} sessions", sessions.len()));
    Ok(sessions
        .into_iter()
        .map(|entry| SessionEntryResponse {
            formatted_duration: entry.session.formatted_duration(),
            entry,
        })
        .collect())
}

pub fn get_stats_impl(state: &AppState, user_id: String) -> Result<SessionStats, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let stats = state.recorder.get_stats(user_id)?;
    state.log_info(
        "get_stats",
        &format!(
            "daily={} weekly={}",
            stats.daily.sessions, stats.weekly.sessions
        ),
    );
    Ok(stats)
}

/// `None` when no session API base URL is configured.
pub fn remote_session_client(
    state: &AppState,
) -> Result<Option<ReqwestSessionApiClient>, InfraError> {
    let settings = read_api_settings(&state.config_dir)?;
    settings
        .base_url
        .map(|base_url| ReqwestSessionApiClient::new(&base_url, settings.token))
        .transpose()
}

/// Remote stats, or the empty state when the API is unset or unreachable.
pub async fn get_remote_stats_impl(state: &AppState) -> Result<SessionStats, InfraError> {
    let Some(client) = remote_session_client(state)? else {
        return Ok(SessionStats::default());
    };
    Ok(stats_or_zero(client.get_stats().await, &state.log))
}

/// Remote session history, or an empty list when the API is unset or
/// unreachable.
pub async fn list_remote_sessions_impl(
    state: &AppState,
) -> Result<Vec<SessionEntryResponse>, InfraError> {
    let Some(client) = remote_session_client(state)? else {
        return Ok(Vec::new());
    };
    let sessions = sessions_or_empty(client.list_sessions().await, &state.log);
    state.log_info(
        "list_remote_sessions",
        &format!("listed {} sessions", sessions.len()),
    );
    Ok(sessions
        .into_iter()
        .map(|entry| SessionEntryResponse {
            formatted_duration: entry.session.formatted_duration(),
            entry,
        })
        .collect())
}

/// Builds a driver that records finished sessions for `user_id`, through the
/// session API when one is configured and locally otherwise. The caller
/// spawns it.
pub fn timer_driver_impl(state: &AppState, user_id: String) -> Result<TimerDriver, InfraError> {
    let user_id = require_non_empty(&user_id, "user_id")?;
    let config = read_timer_config(&state.config_dir)?;
    let notification = read_notification_kind(&state.config_dir)?;

    let sink: Arc<dyn SessionSink> = match remote_session_client(state)? {
        Some(client) => Arc::new(RemoteSessionSink::new(Arc::new(client))),
        None => Arc::new(LocalSessionSink::new(Arc::clone(&state.recorder), user_id)),
    };
    state.log_info(
        "timer_driver",
        &format!(
            "work={}m break={}m notification={notification:?}",
            config.work_duration_minutes, config.break_duration_minutes
        ),
    );

    Ok(TimerDriver::new(
        PomodoroTimer::new(config),
        sink,
        Arc::from(player_for(notification)),
        state.events.clone(),
        Arc::clone(&state.log),
    ))
}
