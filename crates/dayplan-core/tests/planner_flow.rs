use dayplan_core::cache::LocalCache;
use dayplan_core::planner::DayPlanner;
use dayplan_core::schedule::{DayGrid, DropPayload};
use dayplan_core::task::{Subtask, Task, TimerPhase};
use tempfile::tempdir;
use uuid::Uuid;

fn task(name: &str, minutes: u32, priority: u8) -> Task {
    Task::new(name.to_string(), format!("{name} steps"), minutes, priority)
}

fn subtasks_for(task: &Task, names: &[&str]) -> Vec<Subtask> {
    names
        .iter()
        .map(|n| Subtask::new(task.id, n.to_string(), String::new(), 10))
        .collect()
}

#[test]
fn starting_a_timer_stops_every_other_clock() {
    let mut planner = DayPlanner::new();
    let mut first = task("write report", 25, 1);
    first.subtasks = subtasks_for(&first, &["outline", "draft"]);
    first.has_subtasks = true;
    let second = task("call the bank", 10, 2);
    let (first_id, second_id) = (first.id, second.id);
    let sub_id = first.subtasks[0].id;
    planner.replace_all(vec![first, second]);

    planner.start_timer(first_id, Some(sub_id));
    planner.start_timer(second_id, None);

    let first = planner.task(first_id).expect("first task");
    assert!(first.timer.is_idle());
    assert!(first.subtasks.iter().all(|s| s.timer.is_idle()));

    let second = planner.task(second_id).expect("second task");
    assert_eq!(
        second.timer,
        TimerPhase::Running {
            remaining_secs: 600
        }
    );
    let state = planner.timer().expect("active timer");
    assert_eq!(state.task_id, second_id);
    assert!(state.running);
}

#[test]
fn ticks_floor_at_zero_and_complete_exactly_once() {
    let mut planner = DayPlanner::new();
    let t = task("stretch", 1, 3);
    let id = t.id;
    planner.replace_all(vec![t]);
    planner.start_timer(id, None);

    for _ in 0..59 {
        assert_eq!(planner.tick(), None);
    }
    let done = planner.tick().expect("completion notice at zero");
    assert_eq!(done.task_id, id);
    assert_eq!(done.subtask_id, None);

    // The clock stopped at zero; further ticks never fire again and
    // never go negative.
    for _ in 0..5 {
        assert_eq!(planner.tick(), None);
    }
    let state = planner.timer().expect("timer not yet cleared");
    assert_eq!(state.remaining_secs, 0);
    assert!(!state.running);

    planner.complete_timer(done.task_id, done.subtask_id);
    assert!(planner.timer().is_none());
    assert_eq!(planner.tick(), None);

    // Deliberate asymmetry: finishing a task-level countdown does not
    // complete the task.
    let t = planner.task(id).expect("task");
    assert!(!t.completed);
    assert!(t.timer.is_idle());
}

#[test]
fn completing_a_subtask_timer_marks_only_that_subtask() {
    let mut planner = DayPlanner::new();
    let mut t = task("write report", 45, 1);
    t.subtasks = subtasks_for(&t, &["outline", "draft", "edit"]);
    t.has_subtasks = true;
    let id = t.id;
    let draft_id = t.subtasks[1].id;
    planner.replace_all(vec![t]);

    planner.start_timer(id, Some(draft_id));
    planner.complete_timer(id, Some(draft_id));

    let t = planner.task(id).expect("task");
    assert!(!t.completed);
    assert!(!t.subtasks[0].completed);
    assert!(t.subtasks[1].completed);
    assert!(!t.subtasks[2].completed);
}

#[test]
fn toggle_pauses_resumes_and_clears_at_zero() {
    let mut planner = DayPlanner::new();
    let t = task("email sweep", 2, 2);
    let id = t.id;
    planner.replace_all(vec![t]);

    planner.start_timer(id, None);
    planner.tick();
    planner.toggle_timer(id);

    let state = planner.timer().expect("paused timer");
    assert!(!state.running);
    assert_eq!(state.remaining_secs, 119);
    assert_eq!(
        planner.task(id).expect("task").timer,
        TimerPhase::Paused {
            remaining_secs: 119
        }
    );

    // Paused clocks do not tick.
    assert_eq!(planner.tick(), None);
    assert_eq!(planner.timer().expect("timer").remaining_secs, 119);

    planner.toggle_timer(id);
    assert!(planner.timer().expect("timer").running);

    // Run it out, then a toggle clears instead of resuming.
    let mut done = None;
    for _ in 0..119 {
        if let Some(d) = planner.tick() {
            done = Some(d);
        }
    }
    assert!(done.is_some());
    planner.toggle_timer(id);
    assert!(planner.timer().is_none());
    assert!(planner.task(id).expect("task").timer.is_idle());
}

#[test]
fn attach_subtasks_replaces_wholesale() {
    let mut planner = DayPlanner::new();
    let mut t = task("plan offsite", 60, 2);
    t.subtasks = subtasks_for(&t, &["old entry"]);
    let id = t.id;
    planner.replace_all(vec![t]);

    let t = planner.task(id).expect("task").clone();
    let fresh = subtasks_for(&t, &["venue", "invites", "agenda"]);
    planner.attach_subtasks(id, fresh.clone());

    let t = planner.task(id).expect("task");
    assert!(t.has_subtasks);
    assert_eq!(t.subtasks, fresh);
}

#[test]
fn display_order_groups_incomplete_first_then_priority_stable() {
    let mut planner = DayPlanner::new();
    let mut a = task("a", 10, 2);
    a.completed = true;
    let b = task("b", 10, 1);
    let mut c = task("c", 10, 3);
    c.completed = true;
    let d = task("d", 10, 1);
    planner.replace_all(vec![a, b, c, d]);

    let names: Vec<&str> = planner
        .display_order()
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(names, vec!["b", "d", "a", "c"]);
}

#[test]
fn update_merges_by_id_and_ignores_strangers() {
    let mut planner = DayPlanner::new();
    let t = task("draft email", 15, 3);
    let id = t.id;
    planner.replace_all(vec![t]);

    let mut edited = planner.task(id).expect("task").clone();
    edited.priority = 1;
    edited.description = "to the landlord".to_string();
    planner.update(edited);

    let t = planner.task(id).expect("task");
    assert_eq!(t.priority, 1);
    assert_eq!(t.description, "to the landlord");

    planner.update(task("imposter", 5, 1));
    assert_eq!(planner.tasks().len(), 1);
}

#[test]
fn replace_all_bumps_generation_and_drops_timer() {
    let mut planner = DayPlanner::new();
    let t = task("warmup", 5, 1);
    let id = t.id;
    planner.replace_all(vec![t]);
    planner.start_timer(id, None);

    let generation = planner.generation();
    planner.replace_all(vec![task("fresh", 15, 1)]);
    assert_eq!(planner.generation(), generation + 1);
    assert!(planner.timer().is_none());
}

#[test]
fn cache_roundtrips_tasks_timer_and_grid() {
    let temp = tempdir().expect("tempdir");
    let cache = LocalCache::open(temp.path()).expect("open cache");

    let mut planner = DayPlanner::new();
    let mut t = task("write report", 25, 1);
    t.subtasks = subtasks_for(&t, &["outline"]);
    t.has_subtasks = true;
    let id = t.id;
    planner.replace_all(vec![t]);
    planner.start_timer(id, None);
    planner.tick();

    cache.save_tasks(planner.tasks()).expect("save tasks");
    cache.save_timer(planner.timer()).expect("save timer");

    let mut grid = DayGrid::new();
    grid.drop_at(
        DropPayload::Item {
            task_id: id,
            subtask_id: None,
            name: "write report".to_string(),
            duration_minutes: 25,
        },
        9,
        30,
    )
    .expect("drop");
    cache.save_grid(&grid).expect("save grid");

    cache.save_prompt("write a report and call the bank").expect("save prompt");
    cache.set_started_planning(true).expect("save flag");

    let restored = DayPlanner::from_parts(
        cache.load_tasks().expect("load tasks"),
        cache.load_timer().expect("load timer"),
    );
    assert_eq!(restored.tasks(), planner.tasks());
    assert_eq!(restored.timer(), planner.timer());

    let grid_back = cache.load_grid().expect("load grid");
    assert_eq!(grid_back, grid);
    let entry = grid_back.find(id, None).expect("scheduled");
    assert_eq!((entry.start_hour, entry.start_minute), (9, 30));

    assert_eq!(
        cache.load_prompt().expect("load prompt").as_deref(),
        Some("write a report and call the bank")
    );
    assert!(cache.has_started_planning().expect("load flag"));

    // Unknown-id timer start is a no-op and leaves state usable.
    let mut restored = restored;
    restored.start_timer(Uuid::new_v4(), None);
    assert!(restored.timer().is_none());
}
