use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use dayplan_core::cache::LocalCache;
use dayplan_core::config::{Config, resolve_data_dir};
use dayplan_core::datetime::{format_clock, planning_date};
use dayplan_core::planner::DayPlanner;
use dayplan_core::render::Renderer;
use dayplan_core::schedule::{DayGrid, DropPayload};
use dayplan_core::task::{Confirmation, Task};

use dayplan_remote::identity::{AuthClient, Session};
use dayplan_remote::planning::PlanningClient;
use dayplan_remote::store::{PostgresBackend, StoreClient};
use dayplan_remote::types::TaskDescriptor;

use crate::cli::{Command, GlobalCli, init_tracing};

#[instrument(skip_all)]
pub async fn run(cli: GlobalCli) -> anyhow::Result<()> {
    init_tracing(cli.verbose, cli.quiet)?;

    let mut cfg = Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir =
        resolve_data_dir(&cfg, cli.data.as_deref()).context("failed to resolve data directory")?;
    info!(data_dir = %data_dir.display(), "starting dayplan");

    let mut app = AppContext::open(cfg, &data_dir)?;
    app.dispatch(cli.command).await
}

/// Remote half of a signed-in session: the row store plus the identity
/// that scopes its rows.
struct Remote {
    store: StoreClient<PostgresBackend>,
    session: Session,
}

struct AppContext {
    cfg: Config,
    cache: LocalCache,
    planner: DayPlanner,
    grid: DayGrid,
    renderer: Renderer,
    planning: PlanningClient,
    auth: Option<AuthClient>,
}

impl AppContext {
    fn open(cfg: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let cache = LocalCache::open(data_dir)?;
        let planner = DayPlanner::from_parts(cache.load_tasks()?, cache.load_timer()?);
        let grid = cache.load_grid()?;
        let renderer = Renderer::new(&cfg)?;
        let planning = PlanningClient::new(cfg.api_base_url())?;

        let auth = match (cfg.get("auth.url"), cfg.get("auth.apikey")) {
            (Some(url), Some(key)) => Some(AuthClient::new(url, key, data_dir)?),
            _ => None,
        };

        Ok(Self {
            cfg,
            cache,
            planner,
            grid,
            renderer,
            planning,
            auth,
        })
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.cache.save_tasks(self.planner.tasks())?;
        self.cache.save_timer(self.planner.timer())?;
        self.cache.save_grid(&self.grid)?;
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        planning_date(Local::now(), self.cfg.cutoff_hour())
    }

    /// Store access requires both a configured `store.url` and a
    /// remembered session; without either, commands run local-only.
    fn remote(&self) -> anyhow::Result<Option<Remote>> {
        let Some(url) = self.cfg.get("store.url") else {
            debug!("store.url not configured; running local-only");
            return Ok(None);
        };
        let Some(auth) = self.auth.as_ref() else {
            debug!("auth.url/auth.apikey not configured; running local-only");
            return Ok(None);
        };
        let Some(session) = auth.current() else {
            debug!("not signed in; running local-only");
            return Ok(None);
        };

        let backend = PostgresBackend::connect(&url)?;
        Ok(Some(Remote {
            store: StoreClient::new(backend),
            session,
        }))
    }

    /// Accept a 1-based display-order number or a task id prefix.
    fn resolve_task(&self, token: &str) -> anyhow::Result<Uuid> {
        if let Ok(n) = token.parse::<usize>() {
            let ordered = self.planner.display_order();
            let idx = n
                .checked_sub(1)
                .ok_or_else(|| anyhow!("task numbers start at 1"))?;
            return ordered
                .get(idx)
                .map(|t| t.id)
                .ok_or_else(|| anyhow!("no task number {n} (have {})", ordered.len()));
        }

        let needle = token.to_ascii_lowercase();
        let matches: Vec<Uuid> = self
            .planner
            .tasks()
            .iter()
            .filter(|t| t.id.to_string().starts_with(&needle))
            .map(|t| t.id)
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(anyhow!("no task matches '{token}'")),
            _ => Err(anyhow!("'{token}' matches more than one task")),
        }
    }

    fn resolve_subtask(&self, task_id: Uuid, n: usize) -> anyhow::Result<Uuid> {
        let task = self
            .planner
            .task(task_id)
            .ok_or_else(|| anyhow!("task disappeared"))?;
        n.checked_sub(1)
            .and_then(|idx| task.subtasks.get(idx))
            .map(|s| s.id)
            .ok_or_else(|| {
                anyhow!(
                    "no subtask {n} on '{}' (have {})",
                    task.name,
                    task.subtasks.len()
                )
            })
    }

    async fn dispatch(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Plan { prompt } => self.cmd_plan(prompt.join(" ")).await,
            Command::Breakdown { ids, legacy } => self.cmd_breakdown(ids, legacy).await,
            Command::Confirm { id } => self.cmd_set_confirmation(&id, Confirmation::Confirmed),
            Command::Reject { id } => self.cmd_set_confirmation(&id, Confirmation::Rejected),
            Command::List => self.cmd_list(),
            Command::Today => self.cmd_today(),
            Command::Done { id, subtask } => self.cmd_done(&id, subtask),
            Command::Start { id, subtask } => self.cmd_start(&id, subtask),
            Command::Pause { id } => self.cmd_pause(&id),
            Command::Stop { id } => self.cmd_stop(&id),
            Command::Timer => self.cmd_timer().await,
            Command::Schedule { id, at, subtask } => self.cmd_schedule(&id, &at, subtask),
            Command::Move { id, at } => self.cmd_move(&id, &at),
            Command::Unschedule { id } => self.cmd_unschedule(&id),
            Command::Agenda => self.cmd_agenda(),
            Command::Chat { message } => self.cmd_chat(message.join(" ")).await,
            Command::Login { email } => self.cmd_login(&email).await,
            Command::Logout => self.cmd_logout().await,
            Command::Whoami => self.cmd_whoami(),
        }
    }

    #[instrument(skip(self, prompt))]
    async fn cmd_plan(&mut self, prompt: String) -> anyhow::Result<()> {
        if prompt.trim().is_empty() {
            bail!("describe your day first");
        }

        // The prompt and the started flag go down before the call so a
        // crashed or failed request leaves the attempt visible.
        self.cache.save_prompt(&prompt)?;
        self.cache.set_started_planning(true)?;

        let issued_at = self.planner.generation();
        let descriptors = self.planning.plan_day(&prompt).await?;

        if self.planner.generation() != issued_at {
            warn!("task list changed while planning; discarding stale response");
            return Ok(());
        }

        let tasks: Vec<Task> = descriptors
            .into_iter()
            .map(TaskDescriptor::into_task)
            .collect();
        info!(count = tasks.len(), "plan received");

        self.planner.replace_all(tasks);
        self.persist()?;

        if let Some(remote) = self.remote()? {
            let date = self.today();
            for task in self.planner.tasks() {
                remote.store.push_task(remote.session.user.id, date, task)?;
            }
        }

        self.renderer.print_task_table(&self.planner.display_order())
    }

    #[instrument(skip(self, ids))]
    async fn cmd_breakdown(&mut self, ids: Vec<String>, legacy: bool) -> anyhow::Result<()> {
        let target_ids: Vec<Uuid> = if ids.is_empty() {
            self.planner
                .tasks()
                .iter()
                .filter(|t| t.confirmation == Confirmation::Confirmed)
                .map(|t| t.id)
                .collect()
        } else {
            ids.iter()
                .map(|token| self.resolve_task(token))
                .collect::<anyhow::Result<_>>()?
        };

        if target_ids.is_empty() {
            bail!("no confirmed tasks to break down");
        }

        if legacy {
            self.breakdown_legacy(&target_ids).await?;
        } else {
            self.breakdown_batch(&target_ids).await?;
        }

        self.persist()?;

        if let Some(remote) = self.remote()? {
            for id in &target_ids {
                if let Some(task) = self.planner.task(*id) {
                    remote
                        .store
                        .push_subtasks(remote.session.user.id, &task.subtasks)?;
                }
            }
        }

        self.renderer.print_task_table(&self.planner.display_order())
    }

    /// All requests go out concurrently and the batch is all-or-nothing:
    /// one failure means no task gets new subtasks.
    async fn breakdown_batch(&mut self, target_ids: &[Uuid]) -> anyhow::Result<()> {
        let mut requests = Vec::with_capacity(target_ids.len());
        for id in target_ids {
            let task = self
                .planner
                .task(*id)
                .ok_or_else(|| anyhow!("task disappeared"))?;
            requests.push((task.id, task.name.clone(), task.description.clone(), task.duration_minutes));
        }

        let results = join_all(requests.iter().map(|(id, name, description, minutes)| {
            self.planning
                .generate_subtasks(*id, name, description, *minutes)
        }))
        .await;

        let mut batches = Vec::with_capacity(results.len());
        for ((id, ..), result) in requests.iter().zip(results) {
            batches.push((*id, result?));
        }

        for (id, descriptors) in batches {
            let subtasks = descriptors
                .into_iter()
                .map(|d| d.into_subtask(id))
                .collect();
            self.planner.attach_subtasks(id, subtasks);
        }

        Ok(())
    }

    /// Older servers only break down one task at a time and return
    /// refined duration and priority estimates alongside the steps.
    async fn breakdown_legacy(&mut self, target_ids: &[Uuid]) -> anyhow::Result<()> {
        for id in target_ids {
            let (name, description) = {
                let task = self
                    .planner
                    .task(*id)
                    .ok_or_else(|| anyhow!("task disappeared"))?;
                (task.name.clone(), task.description.clone())
            };

            let fields = self.planning.breakdown(&name, &description).await?;

            if let Some(task) = self.planner.task_mut(*id) {
                if let Some(minutes) = fields.duration_minutes {
                    task.duration_minutes = minutes.max(1);
                }
                if let Some(priority) = fields.priority {
                    task.priority = priority.clamp(1, 5);
                }
            }

            let subtasks = fields
                .subtasks
                .into_iter()
                .map(|d| d.into_subtask(*id))
                .collect();
            self.planner.attach_subtasks(*id, subtasks);
        }
        Ok(())
    }

    fn cmd_set_confirmation(&mut self, token: &str, state: Confirmation) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        if let Some(task) = self.planner.task_mut(id) {
            task.confirmation = state;
        }
        self.persist()
    }

    fn cmd_list(&mut self) -> anyhow::Result<()> {
        self.renderer.print_task_table(&self.planner.display_order())
    }

    fn cmd_today(&mut self) -> anyhow::Result<()> {
        let date = self.today();
        let tasks = match self.remote() {
            Ok(Some(remote)) => remote.store.fetch_today(remote.session.user.id, date),
            Ok(None) => bail!("set store.url/auth.url in ~/.dayplanrc and log in first"),
            Err(err) => {
                // Reads never block on a broken store.
                warn!(error = %err, "could not reach the task store");
                Vec::new()
            }
        };

        if tasks.is_empty() {
            println!("nothing stored for {date}");
            return Ok(());
        }
        self.renderer.print_task_table(&tasks.iter().collect::<Vec<_>>())
    }

    fn cmd_done(&mut self, token: &str, subtask: Option<usize>) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;

        match subtask {
            Some(n) => {
                let sid = self.resolve_subtask(id, n)?;
                let completed = {
                    let sub = self
                        .planner
                        .task_mut(id)
                        .and_then(|t| t.subtask_mut(sid))
                        .ok_or_else(|| anyhow!("subtask disappeared"))?;
                    sub.completed = !sub.completed;
                    sub.completed
                };
                self.persist()?;
                if let Some(remote) = self.remote()? {
                    remote.store.set_subtask_completed(sid, completed)?;
                }
            }
            None => {
                let completed = {
                    let task = self
                        .planner
                        .task_mut(id)
                        .ok_or_else(|| anyhow!("task disappeared"))?;
                    task.completed = !task.completed;
                    task.completed
                };
                self.persist()?;
                if let Some(remote) = self.remote()? {
                    remote.store.set_task_completed(id, completed)?;
                }
            }
        }

        Ok(())
    }

    fn cmd_start(&mut self, token: &str, subtask: Option<usize>) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        let sid = subtask.map(|n| self.resolve_subtask(id, n)).transpose()?;
        self.planner.start_timer(id, sid);
        self.persist()?;

        if let Some(state) = self.planner.timer() {
            println!("counting down {}", format_clock(state.remaining_secs));
        }
        Ok(())
    }

    fn cmd_pause(&mut self, token: &str) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        self.planner.toggle_timer(id);
        self.persist()
    }

    fn cmd_stop(&mut self, token: &str) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        self.planner.stop_timer(id);
        self.persist()
    }

    /// Foreground countdown: tick once a second until the clock runs out
    /// or ctrl-c. Completion marks the subtask done locally and in the
    /// store, exactly once.
    #[instrument(skip(self))]
    async fn cmd_timer(&mut self) -> anyhow::Result<()> {
        let Some(state) = self.planner.timer() else {
            bail!("no active timer; use start first");
        };
        let task_id = state.task_id;
        if !state.running {
            self.planner.toggle_timer(task_id);
        }

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    info!("countdown interrupted");
                    self.persist()?;
                    break;
                }
                _ = interval.tick() => {
                    if let Some(done) = self.planner.tick() {
                        self.planner.complete_timer(done.task_id, done.subtask_id);
                        self.persist()?;
                        println!("\rtime's up                ");

                        if let Some(sid) = done.subtask_id
                            && let Some(remote) = self.remote()?
                        {
                            remote.store.set_subtask_completed(sid, true)?;
                        }
                        break;
                    }

                    if let Some(state) = self.planner.timer() {
                        print!("\r{} remaining ", format_clock(state.remaining_secs));
                        io::stdout().flush()?;
                    }
                }
            }
        }

        Ok(())
    }

    fn cmd_schedule(&mut self, token: &str, at: &str, subtask: Option<usize>) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        let (hour, minute) = parse_clock(at)?;

        let payload = {
            let task = self
                .planner
                .task(id)
                .ok_or_else(|| anyhow!("task disappeared"))?;
            match subtask {
                Some(n) => {
                    let sid = self.resolve_subtask(id, n)?;
                    let sub = task
                        .subtask(sid)
                        .ok_or_else(|| anyhow!("subtask disappeared"))?;
                    DropPayload::Item {
                        task_id: id,
                        subtask_id: Some(sid),
                        name: sub.name.clone(),
                        duration_minutes: sub.duration_minutes,
                    }
                }
                None => DropPayload::Item {
                    task_id: id,
                    subtask_id: None,
                    name: task.name.clone(),
                    duration_minutes: task.duration_minutes,
                },
            }
        };

        self.grid.drop_at(payload, hour, minute)?;
        self.persist()
    }

    fn cmd_move(&mut self, token: &str, at: &str) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;
        let (hour, minute) = parse_clock(at)?;

        let entry = self
            .grid
            .entries()
            .iter()
            .find(|e| e.task_id == id)
            .cloned()
            .ok_or_else(|| anyhow!("task is not on the grid"))?;

        self.grid.drop_at(DropPayload::Move(entry), hour, minute)?;
        self.persist()
    }

    fn cmd_unschedule(&mut self, token: &str) -> anyhow::Result<()> {
        let id = self.resolve_task(token)?;

        let mut removed = self.grid.remove(id, None);
        let subtask_ids: Vec<Uuid> = self
            .planner
            .task(id)
            .map(|t| t.subtasks.iter().map(|s| s.id).collect())
            .unwrap_or_default();
        for sid in subtask_ids {
            removed |= self.grid.remove(id, Some(sid));
        }

        if !removed {
            bail!("task is not on the grid");
        }
        self.persist()
    }

    fn cmd_agenda(&mut self) -> anyhow::Result<()> {
        self.renderer.print_agenda(&self.grid, Local::now().time())
    }

    #[instrument(skip(self, message))]
    async fn cmd_chat(&mut self, message: String) -> anyhow::Result<()> {
        let mut transcript = self.cache.load_transcript()?;
        transcript.push_user(message);

        let reply = self.planning.chat(transcript.messages()).await?;
        transcript.push_assistant(reply.clone());
        self.cache.save_transcript(&transcript)?;

        println!("{reply}");
        Ok(())
    }

    async fn cmd_login(&mut self, email: &str) -> anyhow::Result<()> {
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| anyhow!("set auth.url and auth.apikey in ~/.dayplanrc first"))?;

        print!("password: ");
        io::stdout().flush()?;
        let mut password = String::new();
        io::stdin().lock().read_line(&mut password)?;

        let session = auth.sign_in(email, password.trim_end()).await?;
        auth.remember(&session)?;
        println!("signed in as {}", session.user.email);
        Ok(())
    }

    async fn cmd_logout(&mut self) -> anyhow::Result<()> {
        let Some(auth) = self.auth.as_ref() else {
            return Ok(());
        };
        if let Some(session) = auth.current() {
            auth.sign_out(&session).await?;
        }
        auth.forget()?;
        println!("signed out");
        Ok(())
    }

    fn cmd_whoami(&mut self) -> anyhow::Result<()> {
        let user = self.auth.as_ref().and_then(|a| a.current()).map(|s| s.user);
        match user {
            Some(user) => println!("{} ({})", user.email, user.id),
            None => println!("not signed in"),
        }
        Ok(())
    }
}

fn parse_clock(s: &str) -> anyhow::Result<(u8, u8)> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("expected HH:MM, got: {s}"))?;
    let hour: u8 = h.parse().map_err(|_| anyhow!("bad hour in {s}"))?;
    let minute: u8 = m.parse().map_err(|_| anyhow!("bad minute in {s}"))?;
    if hour > 23 || minute > 59 {
        bail!("{s} is not a time of day");
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_parsing_rejects_nonsense() {
        assert_eq!(parse_clock("09:30").expect("parse"), (9, 30));
        assert_eq!(parse_clock("0:00").expect("parse"), (0, 0));
        assert!(parse_clock("24:00").is_err());
        assert!(parse_clock("12:60").is_err());
        assert!(parse_clock("noon").is_err());
    }
}
