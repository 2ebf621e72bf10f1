use crate::domain::models::{PeriodStats, Session};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_timestamp, open_connection, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub trait SessionRepository: Send + Sync {
    fn insert(&self, session: &Session) -> Result<(), InfraError>;
    /// Newest completion first; rows without a completion time sort by
    /// creation time.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, InfraError>;
    /// Count and minute total of sessions completed at or after `since`.
    fn aggregate_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<PeriodStats, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSessionRepository {
    db_path: PathBuf,
}

impl SqliteSessionRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl SessionRepository for SqliteSessionRepository {
    fn insert(&self, session: &Session) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO sessions
               (id, user_id, task_id, duration_minutes, is_completed, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.user_id,
                session.task_id,
                session.duration_minutes,
                session.is_completed,
                session.completed_at.map(format_timestamp),
                format_timestamp(session.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, task_id, duration_minutes, is_completed, completed_at, created_at
             FROM sessions
             WHERE user_id = ?1
             ORDER BY COALESCE(completed_at, created_at) DESC, created_at DESC",
        )?;
        let rows = statement
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, user_id, task_id, duration_minutes, is_completed, completed_at, created_at)| {
                    Ok(Session {
                        id,
                        user_id,
                        task_id,
                        duration_minutes,
                        is_completed,
                        completed_at: completed_at
                            .as_deref()
                            .map(|value| parse_timestamp(value, "sessions.completed_at"))
                            .transpose()?,
                        created_at: parse_timestamp(&created_at, "sessions.created_at")?,
                    })
                },
            )
            .collect()
    }

    fn aggregate_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<PeriodStats, InfraError> {
        let connection = self.connect()?;
        let (count, total): (i64, i64) = connection.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_minutes), 0)
             FROM sessions
             WHERE user_id = ?1 AND COALESCE(completed_at, created_at) >= ?2",
            params![user_id, format_timestamp(since)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(PeriodStats {
            sessions: u32::try_from(count).unwrap_or(u32::MAX),
            total_duration: u32::try_from(total).unwrap_or(u32::MAX),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionRepository {
    fn lock(&self) -> Result<MutexGuard<'_, Vec<Session>>, InfraError> {
        self.sessions
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("session repository: {error}")))
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn insert(&self, session: &Session) -> Result<(), InfraError> {
        self.lock()?.push(session.clone());
        Ok(())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, InfraError> {
        let sessions = self.lock()?;
        let mut owned = sessions
            .iter()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| {
            right
                .effective_completed_at()
                .cmp(&left.effective_completed_at())
                .then_with(|| right.created_at.cmp(&left.created_at))
        });
        Ok(owned)
    }

    fn aggregate_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<PeriodStats, InfraError> {
        let sessions = self.lock()?;
        Ok(sessions
            .iter()
            .filter(|session| session.user_id == user_id)
            .filter(|session| session.effective_completed_at() >= since)
            .fold(PeriodStats::default(), |stats, session| PeriodStats {
                sessions: stats.sessions.saturating_add(1),
                total_duration: stats.total_duration.saturating_add(session.duration_minutes),
            }))
    }
}
