use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::message::{Message, Transcript};
use crate::planner::TimerState;
use crate::schedule::{DayGrid, ScheduledTask};
use crate::task::Task;

/// Cross-reload cache for the active day. Mirrors the browser-local keys
/// of the hosted variant (`tasks`, `userInput`, `hasStartedPlanning`)
/// plus the timer, the day grid, and the chat transcript. Not a source
/// of truth once a remote store is configured.
#[derive(Debug)]
pub struct LocalCache {
    pub data_dir: PathBuf,
    tasks_path: PathBuf,
    timer_path: PathBuf,
    grid_path: PathBuf,
    chat_path: PathBuf,
    prompt_path: PathBuf,
    flag_path: PathBuf,
}

impl LocalCache {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let timer_path = data_dir.join("timer.data");
        let grid_path = data_dir.join("grid.data");
        let chat_path = data_dir.join("chat.data");
        let prompt_path = data_dir.join("prompt.data");
        let flag_path = data_dir.join("planning.flag");

        for path in [
            &tasks_path,
            &timer_path,
            &grid_path,
            &chat_path,
            &prompt_path,
            &flag_path,
        ] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(data_dir = %data_dir.display(), "opened local cache");

        Ok(Self {
            data_dir,
            tasks_path,
            timer_path,
            grid_path,
            chat_path,
            prompt_path,
            flag_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_timer(&self) -> anyhow::Result<Option<TimerState>> {
        let raw = fs::read_to_string(&self.timer_path)
            .with_context(|| format!("failed reading {}", self.timer_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let state = serde_json::from_str(trimmed).context("failed parsing timer.data")?;
        Ok(Some(state))
    }

    #[tracing::instrument(skip(self, timer))]
    pub fn save_timer(&self, timer: Option<&TimerState>) -> anyhow::Result<()> {
        let payload = match timer {
            Some(state) => serde_json::to_string(state)?,
            None => String::new(),
        };
        write_atomic(&self.timer_path, &payload).context("failed to save timer.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_grid(&self) -> anyhow::Result<DayGrid> {
        let entries: Vec<ScheduledTask> =
            load_jsonl(&self.grid_path).context("failed to load grid.data")?;
        Ok(DayGrid::from_entries(entries))
    }

    #[tracing::instrument(skip(self, grid))]
    pub fn save_grid(&self, grid: &DayGrid) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.grid_path, grid.entries()).context("failed to save grid.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_transcript(&self) -> anyhow::Result<Transcript> {
        let messages: Vec<Message> =
            load_jsonl(&self.chat_path).context("failed to load chat.data")?;
        Ok(Transcript::from_messages(messages))
    }

    #[tracing::instrument(skip(self, transcript))]
    pub fn save_transcript(&self, transcript: &Transcript) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.chat_path, transcript.messages())
            .context("failed to save chat.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_prompt(&self) -> anyhow::Result<Option<String>> {
        let raw = fs::read_to_string(&self.prompt_path)
            .with_context(|| format!("failed reading {}", self.prompt_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    #[tracing::instrument(skip(self, prompt))]
    pub fn save_prompt(&self, prompt: &str) -> anyhow::Result<()> {
        write_atomic(&self.prompt_path, prompt).context("failed to save prompt.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn has_started_planning(&self) -> anyhow::Result<bool> {
        let raw = fs::read_to_string(&self.flag_path)
            .with_context(|| format!("failed reading {}", self.flag_path.display()))?;
        Ok(raw.trim() == "1")
    }

    #[tracing::instrument(skip(self))]
    pub fn set_started_planning(&self, started: bool) -> anyhow::Result<()> {
        write_atomic(&self.flag_path, if started { "1" } else { "" })
            .context("failed to save planning.flag")
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

fn write_atomic(path: &Path, payload: &str) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload.as_bytes())?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
    Ok(())
}
