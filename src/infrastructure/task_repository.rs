use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_timestamp, open_connection, parse_timestamp};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Task storage. Every call is scoped to the owning user; a task id that
/// belongs to someone else behaves exactly like a missing one.
pub trait TaskRepository: Send + Sync {
    fn insert(&self, task: &Task) -> Result<(), InfraError>;
    fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, InfraError>;
    /// Newest first.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>, InfraError>;
    fn update(&self, task: &Task) -> Result<bool, InfraError>;
    fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, InfraError>;
    /// Atomic `+1` on the completed-pomodoro counter. Returns whether a row
    /// matched.
    fn increment_completed_pomodoros(&self, user_id: &str, task_id: &str)
        -> Result<bool, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

const TASK_COLUMNS: &str = "id, user_id, title, description, due_date, estimated_pomodoros, \
     completed_pomodoros, is_completed, created_at, updated_at";

struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    estimated_pomodoros: Option<u32>,
    completed_pomodoros: u32,
    is_completed: bool,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            due_date: row.get(4)?,
            estimated_pomodoros: row.get(5)?,
            completed_pomodoros: row.get(6)?,
            is_completed: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_task(self) -> Result<Task, InfraError> {
        let due_date = self
            .due_date
            .as_deref()
            .map(|value| parse_timestamp(value, "tasks.due_date"))
            .transpose()?;
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            due_date,
            estimated_pomodoros: self.estimated_pomodoros,
            completed_pomodoros: self.completed_pomodoros,
            is_completed: self.is_completed,
            created_at: parse_timestamp(&self.created_at, "tasks.created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "tasks.updated_at")?,
        })
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.due_date.map(format_timestamp),
                task.estimated_pomodoros,
                task.completed_pomodoros,
                task.is_completed,
                format_timestamp(task.created_at),
                format_timestamp(task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                params![task_id, user_id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = statement
            .query_map(params![user_id], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    fn update(&self, task: &Task) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET
               title = ?3,
               description = ?4,
               due_date = ?5,
               estimated_pomodoros = ?6,
               is_completed = ?7,
               updated_at = ?8
             WHERE id = ?1 AND user_id = ?2",
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.due_date.map(format_timestamp),
                task.estimated_pomodoros,
                task.is_completed,
                format_timestamp(task.updated_at),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn increment_completed_pomodoros(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET completed_pomodoros = completed_pomodoros + 1
             WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(changed > 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("task repository: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), InfraError> {
        let mut tasks = self.lock()?;
        if tasks.contains_key(&task.id) {
            return Err(InfraError::Validation(format!(
                "task already exists: {}",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, InfraError> {
        let tasks = self.lock()?;
        Ok(tasks
            .get(task_id)
            .filter(|task| task.user_id == user_id)
            .cloned())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>, InfraError> {
        let tasks = self.lock()?;
        let mut owned = tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(owned)
    }

    fn update(&self, task: &Task) -> Result<bool, InfraError> {
        let mut tasks = self.lock()?;
        let Some(stored) = tasks
            .get_mut(&task.id)
            .filter(|stored| stored.user_id == task.user_id)
        else {
            return Ok(false);
        };
        let completed_pomodoros = stored.completed_pomodoros;
        *stored = Task {
            completed_pomodoros,
            created_at: stored.created_at,
            ..task.clone()
        };
        Ok(true)
    }

    fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, InfraError> {
        let mut tasks = self.lock()?;
        let owned = tasks
            .get(task_id)
            .is_some_and(|task| task.user_id == user_id);
        if owned {
            tasks.remove(task_id);
        }
        Ok(owned)
    }

    fn increment_completed_pomodoros(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<bool, InfraError> {
        let mut tasks = self.lock()?;
        match tasks
            .get_mut(task_id)
            .filter(|task| task.user_id == user_id)
        {
            Some(task) => {
                task.completed_pomodoros = task.completed_pomodoros.saturating_add(1);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewTask;
    use crate::infrastructure::storage::initialize_database;
    use chrono::{DateTime, Utc};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "pomotask-task-repo-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("tasks.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn new_task(user_id: &str, title: &str, created_at: &str) -> Task {
        NewTask {
            title: title.to_string(),
            description: Some("details".to_string()),
            due_date: Some(fixed_time("2026-03-01T00:00:00Z")),
            estimated_pomodoros: Some(3),
        }
        .into_task(user_id, fixed_time(created_at))
        .expect("valid task")
    }

    fn exercise_repository(repository: &dyn TaskRepository) {
        let older = new_task("user-1", "Older", "2026-02-16T08:00:00Z");
        let newer = new_task("user-1", "Newer", "2026-02-16T09:00:00Z");
        let foreign = new_task("user-2", "Foreign", "2026-02-16T10:00:00Z");
        for task in [&older, &newer, &foreign] {
            repository.insert(task).expect("insert task");
        }

        let listed = repository.list_for_user("user-1").expect("list tasks");
        let titles = listed.iter().map(|task| task.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Newer", "Older"]);
        assert_eq!(listed[1], older);

        assert!(repository.get("user-1", &foreign.id).expect("get").is_none());
        assert!(!repository
            .increment_completed_pomodoros("user-1", &foreign.id)
            .expect("increment foreign"));
        assert!(repository
            .increment_completed_pomodoros("user-1", &older.id)
            .expect("increment own"));
        assert!(repository
            .increment_completed_pomodoros("user-1", &older.id)
            .expect("increment own again"));

        let mut edited = older.clone();
        edited.title = "Edited".to_string();
        edited.is_completed = true;
        assert!(repository.update(&edited).expect("update"));
        let stored = repository
            .get("user-1", &older.id)
            .expect("get")
            .expect("task exists");
        assert_eq!(stored.title, "Edited");
        assert!(stored.is_completed);
        assert_eq!(stored.completed_pomodoros, 2);

        let mut hijack = foreign.clone();
        hijack.user_id = "user-1".to_string();
        assert!(!repository.update(&hijack).expect("update foreign"));

        assert!(!repository.delete("user-1", &foreign.id).expect("delete foreign"));
        assert!(repository.delete("user-1", &older.id).expect("delete own"));
        assert!(repository.get("user-1", &older.id).expect("get").is_none());
    }

    #[test]
    fn sqlite_repository_scopes_everything_by_user() {
        let database = TempDatabase::new();
        let repository = SqliteTaskRepository::new(&database.path);
        exercise_repository(&repository);
    }

    #[test]
    fn in_memory_repository_scopes_everything_by_user() {
        let repository = InMemoryTaskRepository::default();
        exercise_repository(&repository);
    }

    #[test]
    fn sqlite_rejects_out_of_range_estimate() {
        let database = TempDatabase::new();
        let repository = SqliteTaskRepository::new(&database.path);
        let mut task = new_task("user-1", "Bad", "2026-02-16T08:00:00Z");
        task.estimated_pomodoros = Some(25);
        assert!(matches!(
            repository.insert(&task),
            Err(InfraError::Sqlite(_))
        ));
    }
}
