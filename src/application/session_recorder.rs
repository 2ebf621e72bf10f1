use crate::application::timer_driver::SessionSink;
use crate::domain::models::{
    duration_minutes_from_seconds, next_id, Session, SessionStats, SessionWithTask, TaskDetails,
    MAX_SESSION_MINUTES,
};
use crate::domain::stats::StatsCalendar;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_repository::SessionRepository;
use crate::infrastructure::task_repository::TaskRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Records finished focus sessions against their task and aggregates them
/// into daily and weekly totals.
pub struct SessionRecorder<S, T>
where
    S: SessionRepository,
    T: TaskRepository,
{
    session_repository: Arc<S>,
    task_repository: Arc<T>,
    calendar: StatsCalendar,
    log: Option<Arc<CommandLog>>,
    now_provider: NowProvider,
}

impl<S, T> SessionRecorder<S, T>
where
    S: SessionRepository,
    T: TaskRepository,
{
    pub fn new(session_repository: Arc<S>, task_repository: Arc<T>) -> Self {
        Self {
            session_repository,
            task_repository,
            calendar: StatsCalendar::default(),
            log: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_calendar(mut self, calendar: StatsCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_log(mut self, log: Arc<CommandLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn calendar(&self) -> StatsCalendar {
        self.calendar
    }

    pub fn log_session(
        &self,
        user_id: &str,
        task_id: &str,
        duration_seconds: u32,
    ) -> Result<Session, InfraError> {
        let user_id = user_id.trim();
        let task_id = task_id.trim();
        if user_id.is_empty() {
            return Err(InfraError::Validation("user_id must not be empty".to_string()));
        }
        if task_id.is_empty() {
            return Err(InfraError::Validation("task_id must not be empty".to_string()));
        }
        if duration_seconds == 0 {
            return Err(InfraError::Validation(
                "duration must be greater than zero".to_string(),
            ));
        }
        let duration_minutes = duration_minutes_from_seconds(duration_seconds);
        if duration_minutes > MAX_SESSION_MINUTES {
            return Err(InfraError::Validation(format!(
                "duration of {duration_minutes} minutes exceeds {MAX_SESSION_MINUTES}"
            )));
        }
        if self.task_repository.get(user_id, task_id)?.is_none() {
            return Err(InfraError::Validation(format!("task not found: {task_id}")));
        }

        let now = (self.now_provider)();
        let session = Session {
            id: next_id("ses"),
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            duration_minutes,
            is_completed: true,
            completed_at: Some(now),
            created_at: now,
        };
        session.validate().map_err(InfraError::Validation)?;
        self.session_repository.insert(&session)?;

        // The session row stands even if the task vanished in between.
        if !self
            .task_repository
            .increment_completed_pomodoros(user_id, task_id)?
        {
            self.warn(&format!(
                "completed pomodoro counter not updated; task_id={task_id} no longer exists"
            ));
        }

        Ok(session)
    }

    pub fn get_sessions(&self, user_id: &str) -> Result<Vec<SessionWithTask>, InfraError> {
        let tasks = self
            .task_repository
            .list_for_user(user_id)?
            .into_iter()
            .map(|task| {
                (
                    task.id,
                    TaskDetails {
                        title: task.title,
                        description: task.description,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        Ok(self
            .session_repository
            .list_for_user(user_id)?
            .into_iter()
            .map(|session| {
                let task = tasks.get(&session.task_id).cloned();
                SessionWithTask { session, task }
            })
            .collect())
    }

    pub fn get_stats(&self, user_id: &str) -> Result<SessionStats, InfraError> {
        let windows = self.calendar.windows((self.now_provider)());
        Ok(SessionStats {
            daily: self
                .session_repository
                .aggregate_since(user_id, windows.day_start)?,
            weekly: self
                .session_repository
                .aggregate_since(user_id, windows.week_start)?,
        })
    }

    fn warn(&self, message: &str) {
        if let Some(log) = &self.log {
            log.warn("log_session", message);
        }
    }
}

/// Feeds sessions finished by the timer into the local recorder on behalf of
/// one user.
pub struct LocalSessionSink<S, T>
where
    S: SessionRepository,
    T: TaskRepository,
{
    recorder: Arc<SessionRecorder<S, T>>,
    user_id: String,
}

impl<S, T> LocalSessionSink<S, T>
where
    S: SessionRepository,
    T: TaskRepository,
{
    pub fn new(recorder: Arc<SessionRecorder<S, T>>, user_id: impl Into<String>) -> Self {
        Self {
            recorder,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl<S, T> SessionSink for LocalSessionSink<S, T>
where
    S: SessionRepository + 'static,
    T: TaskRepository + 'static,
{
    async fn submit_session(
        &self,
        task_id: &str,
        duration_seconds: u32,
    ) -> Result<Session, InfraError> {
        self.recorder
            .log_session(&self.user_id, task_id, duration_seconds)
    }
}
