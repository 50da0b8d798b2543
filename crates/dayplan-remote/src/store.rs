use chrono::NaiveDate;
use postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use dayplan_core::task::{Subtask, Task};

use crate::error::StoreError;
use crate::types::{NewTask, SubtaskRow, TaskRow};

/// Storage operations behind the sync policy split. Implemented by the
/// hosted Postgres backend; tests substitute a failing stub.
pub trait StoreBackend {
    fn fetch_tasks(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<Task>, StoreError>;
    fn insert_task(&self, new: NewTask<'_>) -> Result<(), StoreError>;
    fn insert_subtask(&self, user_id: Uuid, subtask: &Subtask) -> Result<(), StoreError>;
    fn set_task_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError>;
    fn set_subtask_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError>;
    fn delete_task(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Hosted Postgres row store, pooled.
pub struct PostgresBackend {
    pool: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresBackend {
    #[instrument(skip(url))]
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let config: postgres::Config = url.parse()?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = r2d2::Pool::builder().max_size(4).build(manager)?;
        info!("connected to task store");
        Ok(Self { pool })
    }
}

impl StoreBackend for PostgresBackend {
    fn fetch_tasks(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.pool.get()?;

        let task_rows = conn.query(
            "SELECT id, name, description, duration_minutes, priority, \
                    is_completed, has_subtasks, can_be_interleaved \
             FROM tasks WHERE user_id = $1 AND date = $2 \
             ORDER BY priority ASC",
            &[&user_id, &date],
        )?;

        let mut tasks = Vec::with_capacity(task_rows.len());
        for row in task_rows {
            let task_row = TaskRow {
                id: row.get(0),
                name: row.get(1),
                description: row.get(2),
                duration_minutes: row.get::<_, i32>(3).max(0) as u32,
                priority: row.get::<_, i32>(4).clamp(1, 5) as u8,
                completed: row.get(5),
                has_subtasks: row.get(6),
                can_be_interleaved: row.get(7),
            };

            let subtask_rows = conn.query(
                "SELECT id, task_id, name, description, duration_minutes, is_completed \
                 FROM subtasks WHERE task_id = $1 ORDER BY created_at ASC",
                &[&task_row.id],
            )?;

            let subtasks = subtask_rows
                .into_iter()
                .map(|row| {
                    SubtaskRow {
                        id: row.get(0),
                        task_id: row.get(1),
                        name: row.get(2),
                        description: row.get(3),
                        duration_minutes: row.get::<_, i32>(4).max(0) as u32,
                        completed: row.get(5),
                    }
                    .into_subtask()
                })
                .collect();

            tasks.push(task_row.into_task(subtasks));
        }

        Ok(tasks)
    }

    fn insert_task(&self, new: NewTask<'_>) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO tasks \
                 (id, user_id, date, name, description, duration_minutes, \
                  priority, is_completed, has_subtasks, can_be_interleaved) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &new.task.id,
                &new.user_id,
                &new.planning_date,
                &new.task.name,
                &new.task.description,
                &(new.task.duration_minutes as i32),
                &i32::from(new.task.priority),
                &new.task.completed,
                &new.task.has_subtasks,
                &new.task.can_be_interleaved,
            ],
        )?;
        Ok(())
    }

    fn insert_subtask(&self, user_id: Uuid, subtask: &Subtask) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO subtasks \
                 (id, task_id, user_id, name, description, duration_minutes, is_completed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &subtask.id,
                &subtask.task_id,
                &user_id,
                &subtask.name,
                &subtask.description,
                &(subtask.duration_minutes as i32),
                &subtask.completed,
            ],
        )?;
        Ok(())
    }

    fn set_task_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE tasks SET is_completed = $2 WHERE id = $1",
            &[&id, &completed],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound { table: "tasks", id });
        }
        Ok(())
    }

    fn set_subtask_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE subtasks SET is_completed = $2 WHERE id = $1",
            &[&id, &completed],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                table: "subtasks",
                id,
            });
        }
        Ok(())
    }

    fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let mut tx = conn.transaction()?;
        // Subtask lifecycle is tied to the parent.
        tx.execute("DELETE FROM subtasks WHERE task_id = $1", &[&id])?;
        tx.execute("DELETE FROM tasks WHERE id = $1", &[&id])?;
        tx.commit()?;
        Ok(())
    }
}

/// Policy wrapper around a backend: reads degrade to empty, writes fail
/// loudly. The local cache stays usable when the store is down; nothing
/// written is allowed to vanish silently.
pub struct StoreClient<B> {
    backend: B,
}

impl<B: StoreBackend> StoreClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Today's tasks for the user. Any store failure is logged and
    /// rendered as an empty day rather than an error.
    #[instrument(skip(self))]
    pub fn fetch_today(&self, user_id: Uuid, date: NaiveDate) -> Vec<Task> {
        match self.backend.fetch_tasks(user_id, date) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "task store read failed; continuing with empty day");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, task))]
    pub fn push_task(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        task: &Task,
    ) -> Result<(), StoreError> {
        self.backend
            .insert_task(NewTask {
                task,
                user_id,
                planning_date: date,
            })
            .inspect_err(|err| error!(error = %err, task_id = %task.id, "task insert failed"))?;

        for subtask in &task.subtasks {
            self.backend
                .insert_subtask(user_id, subtask)
                .inspect_err(|err| {
                    error!(error = %err, subtask_id = %subtask.id, "subtask insert failed");
                })?;
        }

        Ok(())
    }

    #[instrument(skip(self, subtasks))]
    pub fn push_subtasks(&self, user_id: Uuid, subtasks: &[Subtask]) -> Result<(), StoreError> {
        for subtask in subtasks {
            self.backend
                .insert_subtask(user_id, subtask)
                .inspect_err(|err| {
                    error!(error = %err, subtask_id = %subtask.id, "subtask insert failed");
                })?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_task_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError> {
        self.backend
            .set_task_completed(id, completed)
            .inspect_err(|err| error!(error = %err, task_id = %id, "task update failed"))
    }

    #[instrument(skip(self))]
    pub fn set_subtask_completed(&self, id: Uuid, completed: bool) -> Result<(), StoreError> {
        self.backend
            .set_subtask_completed(id, completed)
            .inspect_err(|err| error!(error = %err, subtask_id = %id, "subtask update failed"))
    }

    #[instrument(skip(self))]
    pub fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        self.backend
            .delete_task(id)
            .inspect_err(|err| error!(error = %err, task_id = %id, "task delete failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl StoreBackend for FailingBackend {
        fn fetch_tasks(&self, _: Uuid, _: NaiveDate) -> Result<Vec<Task>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn insert_task(&self, _: NewTask<'_>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn insert_subtask(&self, _: Uuid, _: &Subtask) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn set_task_completed(&self, _: Uuid, _: bool) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn set_subtask_completed(&self, _: Uuid, _: bool) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn delete_task(&self, _: Uuid) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct EmptyBackend;

    impl StoreBackend for EmptyBackend {
        fn fetch_tasks(&self, _: Uuid, _: NaiveDate) -> Result<Vec<Task>, StoreError> {
            Ok(vec![])
        }

        fn insert_task(&self, _: NewTask<'_>) -> Result<(), StoreError> {
            Ok(())
        }

        fn insert_subtask(&self, _: Uuid, _: &Subtask) -> Result<(), StoreError> {
            Ok(())
        }

        fn set_task_completed(&self, _: Uuid, _: bool) -> Result<(), StoreError> {
            Ok(())
        }

        fn set_subtask_completed(&self, _: Uuid, _: bool) -> Result<(), StoreError> {
            Ok(())
        }

        fn delete_task(&self, _: Uuid) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn some_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date")
    }

    #[test]
    fn reads_degrade_to_empty_when_the_store_is_down() {
        let client = StoreClient::new(FailingBackend);
        let tasks = client.fetch_today(Uuid::new_v4(), some_date());
        assert!(tasks.is_empty());
    }

    #[test]
    fn writes_propagate_store_failures() {
        let client = StoreClient::new(FailingBackend);
        let task = Task::new("report".to_string(), String::new(), 30, 1);

        let err = client
            .push_task(Uuid::new_v4(), some_date(), &task)
            .expect_err("write should fail");
        assert!(matches!(err, StoreError::Unavailable(_)));

        assert!(client.set_task_completed(task.id, true).is_err());
        assert!(client.delete_task(task.id).is_err());
    }

    #[test]
    fn writes_succeed_against_a_healthy_backend() {
        let client = StoreClient::new(EmptyBackend);
        let mut task = Task::new("report".to_string(), String::new(), 30, 1);
        task.subtasks = vec![Subtask::new(
            task.id,
            "outline".to_string(),
            String::new(),
            10,
        )];

        client
            .push_task(Uuid::new_v4(), some_date(), &task)
            .expect("push task");
        client
            .set_subtask_completed(task.subtasks[0].id, true)
            .expect("update subtask");
    }
}
