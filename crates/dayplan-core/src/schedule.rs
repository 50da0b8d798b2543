use anyhow::ensure;
use chrono::NaiveTime;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

pub const SLOT_MINUTES: u8 = 15;
pub const SLOTS_PER_HOUR: u8 = 4;
pub const GRID_HOURS: u8 = 24;

/// A task or subtask positioned on the day's time grid. Placement is
/// independent of completion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: Uuid,
    pub subtask_id: Option<Uuid>,
    pub name: String,
    pub duration_minutes: u32,
    pub start_hour: u8,
    pub start_minute: u8,
}

/// What landed on a grid cell: a bare item reference when the drag
/// started outside the grid, or a full entry when an already-placed task
/// is being moved.
#[derive(Debug, Clone)]
pub enum DropPayload {
    Item {
        task_id: Uuid,
        subtask_id: Option<Uuid>,
        name: String,
        duration_minutes: u32,
    },
    Move(ScheduledTask),
}

/// 24-hour day grid at 15-minute granularity. No collision detection:
/// entries dropped on an occupied slot simply stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayGrid {
    entries: Vec<ScheduledTask>,
}

pub fn quantize_minute(minute: u8) -> u8 {
    (minute.min(59) / SLOT_MINUTES) * SLOT_MINUTES
}

/// Row index of a wall-clock time on the rendered grid, for the
/// current-time indicator.
pub fn current_time_row(now: NaiveTime) -> u32 {
    now.hour() * u32::from(SLOTS_PER_HOUR) + now.minute() / u32::from(SLOT_MINUTES)
}

impl DayGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ScheduledTask>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduledTask] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tasks_at(&self, hour: u8, minute: u8) -> impl Iterator<Item = &ScheduledTask> {
        self.entries
            .iter()
            .filter(move |e| e.start_hour == hour && e.start_minute == minute)
    }

    /// Place whatever was dropped on the cell at (hour, minute). The
    /// target slot is taken purely from the cell; occupancy is ignored.
    #[instrument(skip(self, payload))]
    pub fn drop_at(&mut self, payload: DropPayload, hour: u8, minute: u8) -> anyhow::Result<()> {
        ensure!(hour < GRID_HOURS, "hour out of range: {hour}");
        let minute = quantize_minute(minute);

        match payload {
            DropPayload::Item {
                task_id,
                subtask_id,
                name,
                duration_minutes,
            } => {
                debug!(%task_id, ?subtask_id, hour, minute, "item dropped onto grid");
                self.entries.push(ScheduledTask {
                    task_id,
                    subtask_id,
                    name,
                    duration_minutes,
                    start_hour: hour,
                    start_minute: minute,
                });
            }
            DropPayload::Move(entry) => {
                debug!(task_id = %entry.task_id, hour, minute, "entry moved within grid");
                self.entries
                    .retain(|e| !(e.task_id == entry.task_id && e.subtask_id == entry.subtask_id));
                self.entries.push(ScheduledTask {
                    start_hour: hour,
                    start_minute: minute,
                    ..entry
                });
            }
        }
        Ok(())
    }

    /// Remove an entry from the grid (double-click in the source UI).
    pub fn remove(&mut self, task_id: Uuid, subtask_id: Option<Uuid>) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.task_id == task_id && e.subtask_id == subtask_id));
        before != self.entries.len()
    }

    pub fn find(&self, task_id: Uuid, subtask_id: Option<Uuid>) -> Option<&ScheduledTask> {
        self.entries
            .iter()
            .find(|e| e.task_id == task_id && e.subtask_id == subtask_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> DropPayload {
        DropPayload::Item {
            task_id: Uuid::new_v4(),
            subtask_id: None,
            name: name.to_string(),
            duration_minutes: 30,
        }
    }

    #[test]
    fn quantizes_to_fifteen_minute_slots() {
        assert_eq!(quantize_minute(0), 0);
        assert_eq!(quantize_minute(14), 0);
        assert_eq!(quantize_minute(15), 15);
        assert_eq!(quantize_minute(44), 30);
        assert_eq!(quantize_minute(59), 45);
        assert_eq!(quantize_minute(99), 45);
    }

    #[test]
    fn drop_records_target_slot_even_when_occupied() {
        let mut grid = DayGrid::new();
        grid.drop_at(item("write report"), 9, 30).expect("drop");
        grid.drop_at(item("call the bank"), 9, 30).expect("drop");

        let stacked: Vec<_> = grid.tasks_at(9, 30).collect();
        assert_eq!(stacked.len(), 2);
        assert!(stacked.iter().all(|e| e.start_hour == 9));
        assert!(stacked.iter().all(|e| e.start_minute == 30));
    }

    #[test]
    fn move_relocates_instead_of_duplicating() {
        let mut grid = DayGrid::new();
        grid.drop_at(item("deep work"), 8, 0).expect("drop");
        let placed = grid.entries()[0].clone();

        grid.drop_at(DropPayload::Move(placed.clone()), 14, 45)
            .expect("move");

        assert_eq!(grid.entries().len(), 1);
        let moved = grid.find(placed.task_id, None).expect("still placed");
        assert_eq!((moved.start_hour, moved.start_minute), (14, 45));
    }

    #[test]
    fn rejects_out_of_range_hour() {
        let mut grid = DayGrid::new();
        assert!(grid.drop_at(item("late"), 24, 0).is_err());
    }

    #[test]
    fn remove_reports_whether_anything_was_dropped() {
        let mut grid = DayGrid::new();
        grid.drop_at(item("standup"), 10, 15).expect("drop");
        let id = grid.entries()[0].task_id;

        assert!(grid.remove(id, None));
        assert!(!grid.remove(id, None));
        assert!(grid.is_empty());
    }

    #[test]
    fn current_time_row_matches_grid_layout() {
        let t = NaiveTime::from_hms_opt(9, 31, 0).expect("valid time");
        assert_eq!(current_time_row(t), 9 * 4 + 2);
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("valid time");
        assert_eq!(current_time_row(midnight), 0);
    }
}
