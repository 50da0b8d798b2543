use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveTime;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_clock, format_duration, format_hour};
use crate::message::{Role, Transcript};
use crate::schedule::{DayGrid, SLOT_MINUTES, SLOTS_PER_HOUR, current_time_row};
use crate::task::{Confirmation, Task, TimerPhase};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Task table in display order: id prefix, name, duration, priority,
    /// countdown state, done mark.
    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[&Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Task".to_string(),
            "Dur".to_string(),
            "Pri".to_string(),
            "Timer".to_string(),
            "Done".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = short_id(task);
            let id = self.paint(&id, "33");

            let name = match task.confirmation {
                Confirmation::Rejected => self.paint(&task.name, "90"),
                Confirmation::Pending => format!("{}?", task.name),
                Confirmation::Confirmed => task.name.clone(),
            };

            let timer = match task.timer {
                TimerPhase::Idle => String::new(),
                TimerPhase::Running { remaining_secs } => {
                    self.paint(&format!("{} left", format_clock(remaining_secs)), "32")
                }
                TimerPhase::Paused { remaining_secs } => {
                    self.paint(&format!("{} paused", format_clock(remaining_secs)), "33")
                }
            };

            let done = if task.completed {
                self.paint("x", "32")
            } else {
                String::new()
            };

            rows.push(vec![
                id,
                name,
                format_duration(task.duration_minutes),
                format!("P{}", task.priority),
                timer,
                done,
            ]);

            for sub in &task.subtasks {
                let marker = if sub.completed { "[x]" } else { "[ ]" };
                let timer = match sub.timer {
                    TimerPhase::Idle => String::new(),
                    TimerPhase::Running { remaining_secs } => {
                        self.paint(&format!("{} left", format_clock(remaining_secs)), "32")
                    }
                    TimerPhase::Paused { remaining_secs } => {
                        self.paint(&format!("{} paused", format_clock(remaining_secs)), "33")
                    }
                };
                rows.push(vec![
                    String::new(),
                    format!("  {marker} {}", sub.name),
                    format_duration(sub.duration_minutes),
                    String::new(),
                    timer,
                    String::new(),
                ]);
            }
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Day agenda: one row per 15-minute slot, hour labels in the gutter,
    /// a marker on the current-time row, stacked entries listed inline.
    #[tracing::instrument(skip(self, grid, now))]
    pub fn print_agenda(&mut self, grid: &DayGrid, now: NaiveTime) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let now_row = current_time_row(now);

        for hour in 0..24u8 {
            for slot in 0..SLOTS_PER_HOUR {
                let minute = slot * SLOT_MINUTES;
                let row = u32::from(hour) * u32::from(SLOTS_PER_HOUR) + u32::from(slot);

                let label = if slot == 0 {
                    format!("{:>4}", format_hour(hour))
                } else {
                    "    ".to_string()
                };

                let marker = if row == now_row {
                    self.paint("now>", "31")
                } else {
                    "    ".to_string()
                };

                let entries = grid
                    .tasks_at(hour, minute)
                    .map(|e| {
                        format!("{} ({})", e.name, format_duration(e.duration_minutes))
                    })
                    .collect::<Vec<_>>()
                    .join("  |  ");

                if entries.is_empty() && slot != 0 && row != now_row {
                    continue;
                }

                writeln!(out, "{label} {marker} {entries}")?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, transcript))]
    pub fn print_transcript(&mut self, transcript: &Transcript) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for message in transcript.messages() {
            let who = match message.role {
                Role::User => self.paint("you", "36"),
                Role::Assistant => self.paint("planner", "35"),
            };
            writeln!(out, "{who}: {}", message.content)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(task: &Task) -> String {
    task.id.to_string().chars().take(8).collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
