use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub const TASK_TITLE_MAX_CHARS: usize = 100;
pub const TASK_DESCRIPTION_MAX_CHARS: usize = 1000;
pub const MIN_ESTIMATED_POMODOROS: u32 = 1;
pub const MAX_ESTIMATED_POMODOROS: u32 = 20;
pub const MIN_SESSION_MINUTES: u32 = 1;
pub const MAX_SESSION_MINUTES: u32 = 190;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_pomodoros: Option<u32>,
    pub completed_pomodoros: u32,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_title(&self.title)?;
        if let Some(description) = self.description.as_deref() {
            validate_description(description)?;
        }
        if let Some(estimated) = self.estimated_pomodoros {
            validate_estimated_pomodoros(estimated)?;
        }
        Ok(())
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due_date) => due_date < now && !self.is_completed,
            None => false,
        }
    }

    pub fn summary(&self) -> TaskRef {
        TaskRef {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// The task a running timer counts toward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_pomodoros: Option<u32>,
}

/// Partial task update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// `0` clears the estimate.
    pub estimated_pomodoros: Option<u32>,
    pub is_completed: Option<bool>,
}

impl TaskUpdate {
    pub fn apply_to(&self, task: &mut Task, now: DateTime<Utc>) -> Result<(), String> {
        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            validate_title(title)?;
            task.title = title.to_string();
        }
        if let Some(description) = self.description.as_deref() {
            task.description = normalize_description(Some(description))?;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(estimated) = self.estimated_pomodoros {
            task.estimated_pomodoros = if estimated == 0 {
                None
            } else {
                validate_estimated_pomodoros(estimated)?;
                Some(estimated)
            };
        }
        if let Some(is_completed) = self.is_completed {
            task.is_completed = is_completed;
        }
        task.updated_at = now;
        Ok(())
    }
}

impl NewTask {
    pub fn into_task(self, user_id: &str, now: DateTime<Utc>) -> Result<Task, String> {
        validate_non_empty(user_id, "user_id")?;
        let title = self.title.trim().to_string();
        validate_title(&title)?;
        let description = normalize_description(self.description.as_deref())?;
        let estimated_pomodoros = match self.estimated_pomodoros {
            Some(0) | None => None,
            Some(value) => {
                validate_estimated_pomodoros(value)?;
                Some(value)
            }
        };

        Ok(Task {
            id: next_id("tsk"),
            user_id: user_id.trim().to_string(),
            title,
            description,
            due_date: self.due_date,
            estimated_pomodoros,
            completed_pomodoros: 0,
            is_completed: false,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub duration_minutes: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        validate_non_empty(&self.user_id, "session.user_id")?;
        validate_non_empty(&self.task_id, "session.task_id")?;
        if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&self.duration_minutes) {
            return Err(format!(
                "session.duration_minutes must be between {MIN_SESSION_MINUTES} \
                 and {MAX_SESSION_MINUTES}"
            ));
        }
        if let Some(completed_at) = self.completed_at {
            if completed_at < self.created_at {
                return Err("session.completed_at must be >= session.created_at".to_string());
            }
        }
        Ok(())
    }

    /// Completion time, or creation time for rows recorded without one.
    pub fn effective_completed_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    pub fn formatted_duration(&self) -> String {
        let hours = self.duration_minutes / 60;
        let minutes = self.duration_minutes % 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDetails {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionWithTask {
    #[serde(flatten)]
    pub session: Session,
    pub task: Option<TaskDetails>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub sessions: u32,
    pub total_duration: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub daily: PeriodStats,
    pub weekly: PeriodStats,
}

/// Elapsed seconds to stored minutes: rounded half up, never below one minute.
pub fn duration_minutes_from_seconds(duration_seconds: u32) -> u32 {
    let rounded = (u64::from(duration_seconds) + 30) / 60;
    u32::try_from(rounded).unwrap_or(u32::MAX).max(MIN_SESSION_MINUTES)
}

pub fn parse_due_date(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| "due_date must be RFC3339 or YYYY-MM-DD".to_string())?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .ok_or_else(|| "due_date must be RFC3339 or YYYY-MM-DD".to_string())
}

fn normalize_description(description: Option<&str>) -> Result<Option<String>, String> {
    let Some(description) = description.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    validate_description(description)?;
    Ok(Some(description.to_string()))
}

fn validate_title(title: &str) -> Result<(), String> {
    validate_non_empty(title, "task.title")?;
    if title.chars().count() > TASK_TITLE_MAX_CHARS {
        return Err(format!(
            "task.title must be at most {TASK_TITLE_MAX_CHARS} characters"
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > TASK_DESCRIPTION_MAX_CHARS {
        return Err(format!(
            "task.description must be at most {TASK_DESCRIPTION_MAX_CHARS} characters"
        ));
    }
    Ok(())
}

fn validate_estimated_pomodoros(value: u32) -> Result<(), String> {
    if !(MIN_ESTIMATED_POMODOROS..=MAX_ESTIMATED_POMODOROS).contains(&value) {
        return Err(format!(
            "task.estimated_pomodoros must be between {MIN_ESTIMATED_POMODOROS} \
             and {MAX_ESTIMATED_POMODOROS}"
        ));
    }
    Ok(())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
