use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dayplan_core::task::{Subtask, Task};

/// Task as the planning service describes it, before it gets an id or
/// any local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
    pub priority: u8,

    #[serde(default)]
    pub can_be_interleaved: bool,
}

impl TaskDescriptor {
    pub fn into_task(self) -> Task {
        let mut task = Task::new(
            self.name,
            self.description,
            self.duration_minutes,
            self.priority,
        );
        task.can_be_interleaved = self.can_be_interleaved;
        task
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskDescriptor {
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
}

impl SubtaskDescriptor {
    pub fn into_subtask(self, task_id: Uuid) -> Subtask {
        Subtask::new(task_id, self.name, self.description, self.duration_minutes)
    }
}

/// Refined estimates for one task: the legacy single-task breakdown
/// returns tightened duration and priority alongside the steps.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakdownFields {
    #[serde(default)]
    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub priority: Option<u8>,

    pub subtasks: Vec<SubtaskDescriptor>,
}

/// Row shape of the store's `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
    pub priority: u8,
    pub completed: bool,
    pub has_subtasks: bool,
    pub can_be_interleaved: bool,
}

impl TaskRow {
    pub fn into_task(self, subtasks: Vec<Subtask>) -> Task {
        let mut task = Task::new(
            self.name,
            self.description,
            self.duration_minutes,
            self.priority,
        );
        task.id = self.id;
        task.completed = self.completed;
        task.has_subtasks = self.has_subtasks;
        task.can_be_interleaved = self.can_be_interleaved;
        task.subtasks = subtasks;
        task
    }
}

/// Row shape of the store's `subtasks` table.
#[derive(Debug, Clone)]
pub struct SubtaskRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
    pub completed: bool,
}

impl SubtaskRow {
    pub fn into_subtask(self) -> Subtask {
        let mut subtask =
            Subtask::new(self.task_id, self.name, self.description, self.duration_minutes);
        subtask.id = self.id;
        subtask.completed = self.completed;
        subtask
    }
}

/// Insert payload for a task, scoped to a user and a planning day.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub task: &'a Task,
    pub user_id: Uuid,
    pub planning_date: NaiveDate,
}
