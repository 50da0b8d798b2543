use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayplan",
    version,
    about = "AI-assisted daily task planner",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Alternate rc file (default: ~/.dayplanrc).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Alternate data directory (default: data.location from the rc file).
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Describe your day in free text and get a task list back.
    Plan {
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Break confirmed tasks into subtasks (default: all confirmed).
    Breakdown {
        ids: Vec<String>,

        /// Use the single-task endpoint that also refines estimates.
        #[arg(long)]
        legacy: bool,
    },

    /// Accept a planned task.
    Confirm { id: String },

    /// Discard a planned task suggestion.
    Reject { id: String },

    /// Show the day's tasks in display order.
    List,

    /// Fetch today's tasks from the remote store.
    Today,

    /// Toggle completion for a task or one of its subtasks.
    Done {
        id: String,

        /// 1-based subtask number.
        #[arg(long)]
        subtask: Option<usize>,
    },

    /// Start a countdown for a task or subtask.
    Start {
        id: String,

        #[arg(long)]
        subtask: Option<usize>,
    },

    /// Pause or resume the active countdown.
    Pause { id: String },

    /// Stop the active countdown without completing anything.
    Stop { id: String },

    /// Run the active countdown in the foreground until done or ctrl-c.
    Timer,

    /// Place a task on the day grid at HH:MM.
    Schedule {
        id: String,
        at: String,

        #[arg(long)]
        subtask: Option<usize>,
    },

    /// Move an already-placed task to a new HH:MM slot.
    Move { id: String, at: String },

    /// Take a task off the day grid.
    Unschedule { id: String },

    /// Render the day grid.
    Agenda,

    /// Ask the planner to adjust or explain the plan.
    Chat {
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Sign in to the remote store.
    Login { email: String },

    /// Sign out and forget the local session.
    Logout,

    /// Show the signed-in account.
    Whoami,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
