use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// Per-task countdown mirror. The authoritative clock is the single
/// `TimerState` owned by the planner; this is what the task itself
/// displays. `Idle` means no countdown has been attached yet (or it was
/// reset), so the next start begins from the full duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running {
        remaining_secs: u32,
    },
    Paused {
        remaining_secs: u32,
    },
}

impl TimerPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, TimerPhase::Running { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TimerPhase::Idle)
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        match self {
            TimerPhase::Idle => None,
            TimerPhase::Running { remaining_secs } | TimerPhase::Paused { remaining_secs } => {
                Some(*remaining_secs)
            }
        }
    }
}

/// Whether the user has accepted a planned task. Freshly planned tasks
/// start out pending until confirmed or rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub timer: TimerPhase,
}

impl Subtask {
    pub fn new(task_id: Uuid, name: String, description: String, duration_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            name,
            description,
            duration_minutes: duration_minutes.max(1),
            completed: false,
            timer: TimerPhase::Idle,
        }
    }

    pub fn full_secs(&self) -> u32 {
        self.duration_minutes * 60
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,

    /// 1 is most urgent, 5 least; incomplete tasks sort ascending on this.
    pub priority: u8,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub has_subtasks: bool,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(default)]
    pub timer: TimerPhase,

    #[serde(default)]
    pub confirmation: Confirmation,

    #[serde(default)]
    pub can_be_interleaved: bool,
}

impl Task {
    pub fn new(name: String, description: String, duration_minutes: u32, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            duration_minutes: duration_minutes.max(1),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            completed: false,
            has_subtasks: false,
            subtasks: vec![],
            timer: TimerPhase::Idle,
            confirmation: Confirmation::Pending,
            can_be_interleaved: false,
        }
    }

    pub fn full_secs(&self) -> u32 {
        self.duration_minutes * 60
    }

    pub fn subtask(&self, id: Uuid) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: Uuid) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}
