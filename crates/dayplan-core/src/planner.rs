use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::task::{Subtask, Task, TimerPhase};

/// The single globally-active countdown. At most one task or subtask is
/// counting down at any time; starting a new timer stops the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub task_id: Uuid,
    pub subtask_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub remaining_secs: u32,
    pub running: bool,
}

/// Emitted exactly once when a running timer reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDone {
    pub task_id: Uuid,
    pub subtask_id: Option<Uuid>,
}

/// Canonical in-memory state for the current day: the task list and the
/// one active countdown. All mutation goes through methods that take the
/// latest state, never a captured snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DayPlanner {
    tasks: Vec<Task>,
    timer: Option<TimerState>,

    /// Bumped on every wholesale replacement so callers can discard
    /// in-flight responses that raced with a newer plan.
    #[serde(default)]
    generation: u64,
}

impl DayPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(tasks: Vec<Task>, timer: Option<TimerState>) -> Self {
        Self {
            tasks,
            timer,
            generation: 0,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn timer(&self) -> Option<&TimerState> {
        self.timer.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Overwrite the task list wholesale after a successful plan. Any
    /// active timer is dropped with it.
    #[instrument(skip(self, tasks))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.timer = None;
        self.generation += 1;
        debug!(
            count = self.tasks.len(),
            generation = self.generation,
            "task list replaced"
        );
    }

    /// Merge a full task object by identifier. Unknown ids are dropped
    /// with a warning rather than appended.
    pub fn update(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => warn!(id = %task.id, "update for unknown task ignored"),
        }
    }

    /// Full replace of a task's subtasks; no merge with any prior list.
    #[instrument(skip(self, subtasks))]
    pub fn attach_subtasks(&mut self, task_id: Uuid, subtasks: Vec<Subtask>) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            warn!(%task_id, "attach_subtasks for unknown task ignored");
            return;
        };
        debug!(%task_id, count = subtasks.len(), "subtasks attached");
        task.subtasks = subtasks;
        task.has_subtasks = true;
    }

    /// Start a countdown for the task (or one of its subtasks). Stops any
    /// existing timer first; the target task's own mirror and all of its
    /// sibling subtask mirrors are reset so only one clock is ever live.
    #[instrument(skip(self))]
    pub fn start_timer(&mut self, task_id: Uuid, subtask_id: Option<Uuid>) {
        self.stop_current();

        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            warn!(%task_id, "start_timer for unknown task ignored");
            return;
        };

        task.timer = TimerPhase::Idle;
        for sub in &mut task.subtasks {
            sub.timer = TimerPhase::Idle;
        }

        let remaining_secs = match subtask_id {
            Some(sid) => {
                let Some(sub) = task.subtask_mut(sid) else {
                    warn!(%task_id, subtask_id = %sid, "start_timer for unknown subtask ignored");
                    return;
                };
                sub.timer = TimerPhase::Running {
                    remaining_secs: sub.full_secs(),
                };
                sub.full_secs()
            }
            None => {
                task.timer = TimerPhase::Running {
                    remaining_secs: task.full_secs(),
                };
                task.full_secs()
            }
        };

        self.timer = Some(TimerState {
            task_id,
            subtask_id,
            started_at: Utc::now(),
            remaining_secs,
            running: true,
        });
        debug!(%task_id, ?subtask_id, remaining_secs, "timer started");
    }

    /// Pause/resume the active countdown. If it already ran out, the
    /// timer is cleared entirely so the next start begins from the full
    /// duration.
    #[instrument(skip(self))]
    pub fn toggle_timer(&mut self, task_id: Uuid) {
        let Some(state) = self.timer.as_mut() else {
            warn!(%task_id, "toggle_timer with no active timer ignored");
            return;
        };
        if state.task_id != task_id {
            warn!(%task_id, active = %state.task_id, "toggle_timer for a different task ignored");
            return;
        }

        if state.remaining_secs == 0 {
            debug!(%task_id, "timer already at zero; clearing");
            self.stop_current();
            return;
        }

        state.running = !state.running;
        let phase = if state.running {
            TimerPhase::Running {
                remaining_secs: state.remaining_secs,
            }
        } else {
            TimerPhase::Paused {
                remaining_secs: state.remaining_secs,
            }
        };
        let (tid, sid) = (state.task_id, state.subtask_id);
        self.set_mirror(tid, sid, phase);
    }

    /// Explicit stop: Running|Paused -> Idle, timer cleared.
    #[instrument(skip(self))]
    pub fn stop_timer(&mut self, task_id: Uuid) {
        match &self.timer {
            Some(state) if state.task_id == task_id => self.stop_current(),
            Some(state) => {
                warn!(%task_id, active = %state.task_id, "stop_timer for a different task ignored")
            }
            None => warn!(%task_id, "stop_timer with no active timer ignored"),
        }
    }

    /// One-second tick. Decrements the global countdown and the mirrored
    /// per-task remaining time, floored at zero. Returns a one-shot
    /// completion notice when zero is reached; once the notice fires the
    /// clock stops running, so further ticks are no-ops.
    pub fn tick(&mut self) -> Option<TimerDone> {
        let state = self.timer.as_mut()?;
        if !state.running {
            return None;
        }

        state.remaining_secs = state.remaining_secs.saturating_sub(1);
        let remaining_secs = state.remaining_secs;
        let (task_id, subtask_id) = (state.task_id, state.subtask_id);

        if remaining_secs == 0 {
            state.running = false;
            self.set_mirror(task_id, subtask_id, TimerPhase::Paused { remaining_secs: 0 });
            return Some(TimerDone {
                task_id,
                subtask_id,
            });
        }

        self.set_mirror(task_id, subtask_id, TimerPhase::Running { remaining_secs });
        None
    }

    /// Completion of a countdown: clears the global timer, resets the
    /// task mirror, and marks the referenced subtask done. The task
    /// itself is deliberately left incomplete even when no subtask is
    /// referenced.
    #[instrument(skip(self))]
    pub fn complete_timer(&mut self, task_id: Uuid, subtask_id: Option<Uuid>) {
        self.timer = None;

        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            warn!(%task_id, "complete_timer for unknown task ignored");
            return;
        };
        task.timer = TimerPhase::Idle;

        if let Some(sid) = subtask_id {
            match task.subtask_mut(sid) {
                Some(sub) => {
                    sub.completed = true;
                    sub.timer = TimerPhase::Idle;
                }
                None => warn!(%task_id, subtask_id = %sid, "complete_timer for unknown subtask"),
            }
        }
        debug!(%task_id, ?subtask_id, "timer completed");
    }

    /// Display order: incomplete tasks before completed ones, each group
    /// ascending by priority, stable for ties.
    pub fn display_order(&self) -> Vec<&Task> {
        let mut ordered: Vec<&Task> = self.tasks.iter().collect();
        ordered.sort_by_key(|t| (t.completed, t.priority));
        ordered
    }

    fn stop_current(&mut self) {
        if let Some(state) = self.timer.take() {
            self.set_mirror(state.task_id, state.subtask_id, TimerPhase::Idle);
        }
    }

    fn set_mirror(&mut self, task_id: Uuid, subtask_id: Option<Uuid>, phase: TimerPhase) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
            return;
        };
        match subtask_id {
            Some(sid) => {
                if let Some(sub) = task.subtask_mut(sid) {
                    sub.timer = phase;
                }
            }
            None => task.timer = phase,
        }
    }
}
