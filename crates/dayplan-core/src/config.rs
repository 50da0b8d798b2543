use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

/// Flat key = value configuration layered from defaults, an rc file
/// (`~/.dayplanrc` or `DAYPLANRC`), and `--rc` command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_files: vec![],
        };

        cfg.map
            .insert("data.location".to_string(), "~/.dayplan".to_string());
        cfg.map
            .insert("api.host".to_string(), "localhost".to_string());
        cfg.map.insert("api.port".to_string(), "8000".to_string());
        cfg.map.insert("color".to_string(), "on".to_string());
        cfg.map
            .insert("day.cutoff_hour".to_string(), "4".to_string());

        let rc_path = resolve_rc_path(rc_override)?;
        if let Some(path) = rc_path {
            info!(rc = %path.display(), "loading rc file");
            cfg.load_file(&path)?;
        } else {
            warn!("no rc file found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            debug!(key = %k, value = %v, "applying override");
            self.map.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.map.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Origin of the planning service, from the configured host at a
    /// fixed port.
    pub fn api_base_url(&self) -> String {
        let host = self
            .get("api.host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = self.get("api.port").unwrap_or_else(|| "8000".to_string());
        format!("http://{host}:{port}")
    }

    pub fn cutoff_hour(&self) -> u32 {
        self.get_u32("day.cutoff_hour")
            .unwrap_or(crate::datetime::DEFAULT_CUTOFF_HOUR)
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }
            if line.is_empty() {
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(rc_env) = std::env::var("DAYPLANRC") {
        if rc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(rc_env)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(".dayplanrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".dayplan"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn rc_file_overrides_defaults_and_cli_overrides_win() {
        let mut rc = tempfile::NamedTempFile::new().expect("temp rc");
        writeln!(rc, "# planner settings").expect("write");
        writeln!(rc, "api.port = 9000  # staging").expect("write");
        writeln!(rc, "store.url = postgres://db.example/plans").expect("write");
        rc.flush().expect("flush");

        let mut cfg = Config::load(Some(rc.path())).expect("load config");
        assert_eq!(cfg.get("api.port").as_deref(), Some("9000"));
        assert_eq!(cfg.api_base_url(), "http://localhost:9000");
        assert_eq!(
            cfg.get("store.url").as_deref(),
            Some("postgres://db.example/plans")
        );

        cfg.apply_overrides([("api.port".to_string(), "8100".to_string())]);
        assert_eq!(cfg.api_base_url(), "http://localhost:8100");
    }

    #[test]
    fn cutoff_hour_falls_back_to_default() {
        let mut rc = tempfile::NamedTempFile::new().expect("temp rc");
        writeln!(rc, "day.cutoff_hour = not-a-number").expect("write");
        rc.flush().expect("flush");

        let cfg = Config::load(Some(rc.path())).expect("load config");
        assert_eq!(cfg.cutoff_hour(), 4);
    }

    #[test]
    fn bool_parsing_accepts_usual_spellings() {
        assert!(parse_bool("on"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("nope"));
    }
}
