//! Configuration for runkeeper.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RUNKEEPER_HOME, RUNKEEPER_DATABASE, ...)
//! 2. Config file (.runkeeper/config.yaml)
//! 3. Defaults (~/.runkeeper)
//!
//! Config file discovery:
//! - Searches current directory and parents for .runkeeper/config.yaml
//! - Paths in config file are relative to the .runkeeper/ directory
//!
//! The entry point resolves the configuration once and hands it to the
//! services it constructs; nothing here is cached globally.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::ollama;

const CONFIG_DIR: &str = ".runkeeper";
const ENV_PREFIX: &str = "RUNKEEPER_";
const ROLE_MODEL_PREFIX: &str = "RUNKEEPER_MODEL_";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .runkeeper/)
    pub home: Option<String>,
    /// SQLite database file
    pub database: Option<String>,
    /// Directory of workflow definitions
    pub workflows: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    pub batch_size: Option<usize>,
    pub poll_interval_seconds: Option<u64>,
    pub workers: Option<usize>,
    pub simulation_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    pub default_provider: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub heartbeat_interval_seconds: Option<u64>,
    pub ollama_base_url: Option<String>,
    pub ollama_default_model: Option<String>,
    /// Role -> default model
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// Allowed browser origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Directory scanned for `*.yaml` workflow definitions
    pub workflows_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    /// Queued runs processed per loop iteration
    pub batch_size: usize,
    /// Sleep between loop iterations
    pub poll_interval: Duration,
    /// Concurrent worker loops
    pub workers: usize,
    /// Base delay between simulated run phases
    pub simulation_delay: Duration,

    pub default_provider: String,
    pub ollama_base_url: String,
    pub ollama_default_model: String,
    /// Default text generation timeout
    pub generation_timeout: Duration,
    /// Default heartbeat cadence while generating
    pub heartbeat_interval: Duration,
    /// Environment-level default model per workflow role
    pub role_models: HashMap<String, String>,

    /// HTTP listen address
    pub bind: String,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
}

impl ResolvedConfig {
    /// Resolve from the process environment and the discovered config file
    pub fn load() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let file = match find_config_file() {
            Some(path) => {
                let parsed = load_config_file(&path)?;
                Some((path, parsed))
            }
            None => None,
        };
        Self::resolve(file, &env)
    }

    /// Defaults rooted at `home`, ignoring environment and config files
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            database: home.join("runkeeper.db"),
            workflows_dir: home.join("workflows"),
            home,
            config_file: None,
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            workers: 1,
            simulation_delay: Duration::from_secs(1),
            default_provider: "ollama".to_string(),
            ollama_base_url: ollama::DEFAULT_BASE_URL.to_string(),
            ollama_default_model: ollama::DEFAULT_MODEL.to_string(),
            generation_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(10),
            role_models: HashMap::new(),
            bind: "127.0.0.1:8000".to_string(),
            cors_origins: Vec::new(),
        }
    }

    /// Layer `env` over the config file over the defaults
    pub fn resolve(
        file: Option<(PathBuf, ConfigFile)>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let (config_file, file) = match file {
            Some((path, parsed)) => (Some(path), parsed),
            None => (None, ConfigFile::default()),
        };
        // Relative paths in the file are anchored at .runkeeper/
        let anchor = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let home = match (env.get("RUNKEEPER_HOME"), &file.paths.home, &anchor) {
            (Some(home), _, _) => PathBuf::from(home),
            (None, Some(home), Some(anchor)) => resolve_path(anchor, home),
            _ => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(CONFIG_DIR),
        };

        let mut config = Self::with_home(&home);
        config.config_file = config_file;

        config.database = path_setting(env, "RUNKEEPER_DATABASE", &file.paths.database, &anchor)
            .unwrap_or(config.database);
        config.workflows_dir =
            path_setting(env, "RUNKEEPER_WORKFLOWS_DIR", &file.paths.workflows, &anchor)
                .unwrap_or(config.workflows_dir);

        let scheduler = &file.scheduler;
        config.batch_size = setting(env, "RUNKEEPER_BATCH_SIZE", scheduler.batch_size, config.batch_size)?;
        config.poll_interval = Duration::from_secs(setting(
            env,
            "RUNKEEPER_POLL_INTERVAL_SECS",
            scheduler.poll_interval_seconds,
            config.poll_interval.as_secs(),
        )?);
        config.workers = setting(env, "RUNKEEPER_WORKERS", scheduler.workers, config.workers)?.max(1);
        config.simulation_delay = Duration::from_millis(setting(
            env,
            "RUNKEEPER_SIMULATION_DELAY_MS",
            scheduler.simulation_delay_ms,
            config.simulation_delay.as_millis() as u64,
        )?);

        let generation = file.generation;
        config.default_provider = setting(
            env,
            "RUNKEEPER_DEFAULT_PROVIDER",
            generation.default_provider,
            config.default_provider,
        )?;
        config.ollama_base_url = setting(
            env,
            "OLLAMA_BASE_URL",
            generation.ollama_base_url,
            config.ollama_base_url,
        )?;
        config.ollama_default_model = setting(
            env,
            "OLLAMA_DEFAULT_MODEL",
            generation.ollama_default_model,
            config.ollama_default_model,
        )?;
        config.generation_timeout = Duration::from_secs(setting(
            env,
            "RUNKEEPER_GENERATION_TIMEOUT_SECS",
            generation.timeout_seconds,
            config.generation_timeout.as_secs(),
        )?);
        config.heartbeat_interval = Duration::from_secs(setting(
            env,
            "RUNKEEPER_HEARTBEAT_SECS",
            generation.heartbeat_interval_seconds,
            config.heartbeat_interval.as_secs(),
        )?);

        config.role_models = generation
            .models
            .into_iter()
            .map(|(role, model)| (role.to_lowercase(), model))
            .collect();
        // OLLAMA_<ROLE>_MODEL is the older spelling; RUNKEEPER_MODEL_<ROLE> wins
        for (key, value) in env {
            let role = key
                .strip_prefix("OLLAMA_")
                .and_then(|rest| rest.strip_suffix("_MODEL"))
                .filter(|role| *role != "DEFAULT");
            if let Some(role) = role {
                if !role.is_empty() && !value.is_empty() {
                    config.role_models.insert(role.to_lowercase(), value.clone());
                }
            }
        }
        for (key, value) in env {
            if let Some(role) = key.strip_prefix(ROLE_MODEL_PREFIX) {
                if !role.is_empty() && !value.is_empty() {
                    config.role_models.insert(role.to_lowercase(), value.clone());
                }
            }
        }

        config.bind = setting(env, "RUNKEEPER_BIND", file.server.bind, config.bind)?;
        // Comma-separated; "*" or blank allows any origin
        config.cors_origins = match env.get("RUNKEEPER_CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty() && *origin != "*")
                .map(str::to_string)
                .collect(),
            None => file.server.cors_origins,
        };

        Ok(config)
    }

    /// Environment-level default model for a workflow role
    pub fn role_model(&self, role: &str) -> Option<&str> {
        self.role_models.get(&role.to_lowercase()).map(String::as_str)
    }

    /// Names of the environment variables this configuration reads
    pub fn environment_keys() -> Vec<String> {
        [
            "HOME",
            "DATABASE",
            "WORKFLOWS_DIR",
            "BATCH_SIZE",
            "POLL_INTERVAL_SECS",
            "WORKERS",
            "SIMULATION_DELAY_MS",
            "DEFAULT_PROVIDER",
            "GENERATION_TIMEOUT_SECS",
            "HEARTBEAT_SECS",
            "BIND",
            "CORS_ORIGINS",
        ]
        .iter()
        .map(|key| format!("{ENV_PREFIX}{key}"))
        .chain(["OLLAMA_BASE_URL".to_string(), "OLLAMA_DEFAULT_MODEL".to_string()])
        .chain([format!("{ROLE_MODEL_PREFIX}<ROLE>")])
        .collect()
    }
}

/// Environment value, else file value, else default
fn setting<T>(env: &HashMap<String, String>, key: &str, file: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env.get(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key} ('{raw}'): {e}")),
        None => Ok(file.unwrap_or(default)),
    }
}

fn path_setting(
    env: &HashMap<String, String>,
    key: &str,
    file: &Option<String>,
    anchor: &Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(value) = env.get(key) {
        return Some(PathBuf::from(value));
    }
    match (file, anchor) {
        (Some(path), Some(anchor)) => Some(resolve_path(anchor, path)),
        _ => None,
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ResolvedConfig::resolve(None, &env(&[])).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".runkeeper");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.database, expected_home.join("runkeeper.db"));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.generation_timeout, Duration::from_secs(300));
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".runkeeper");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
scheduler:
  batch_size: 3
  workers: 2
generation:
  default_provider: canned
  heartbeat_interval_seconds: 0
  models:
    Planner: llama3.2
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let config =
            ResolvedConfig::resolve(Some((config_path.clone(), parsed)), &env(&[])).unwrap();

        assert_eq!(config.home, config_dir.join("state"));
        assert_eq!(config.database, config_dir.join("state").join("runkeeper.db"));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.workers, 2);
        assert_eq!(config.default_provider, "canned");
        assert_eq!(config.heartbeat_interval, Duration::ZERO);
        assert_eq!(config.role_model("planner"), Some("llama3.2"));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_environment_wins() {
        let file = ConfigFile {
            scheduler: SchedulerConfig {
                batch_size: Some(3),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = ResolvedConfig::resolve(
            Some((PathBuf::from("/srv/.runkeeper/config.yaml"), file)),
            &env(&[
                ("RUNKEEPER_HOME", "/var/lib/runkeeper"),
                ("RUNKEEPER_BATCH_SIZE", "25"),
                ("RUNKEEPER_MODEL_CODER", "qwen2.5-coder"),
            ]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/var/lib/runkeeper"));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.role_model("coder"), Some("qwen2.5-coder"));
    }

    #[test]
    fn test_legacy_role_variables() {
        let config = ResolvedConfig::resolve(
            None,
            &env(&[
                ("OLLAMA_PLANNER_MODEL", "llama2"),
                ("OLLAMA_CODER_MODEL", "codellama"),
                ("RUNKEEPER_MODEL_CODER", "qwen2.5-coder"),
                ("OLLAMA_DEFAULT_MODEL", "mistral"),
            ]),
        )
        .unwrap();

        assert_eq!(config.role_model("planner"), Some("llama2"));
        assert_eq!(config.role_model("coder"), Some("qwen2.5-coder"));
        assert_eq!(config.role_model("default"), None);
        assert_eq!(config.ollama_default_model, "mistral");
    }

    #[test]
    fn test_cors_origins_from_file_and_environment() {
        let file = ConfigFile {
            server: ServerConfig {
                cors_origins: vec!["http://localhost:3000".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let path = PathBuf::from("/srv/.runkeeper/config.yaml");

        let config =
            ResolvedConfig::resolve(Some((path.clone(), file.clone())), &env(&[])).unwrap();
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);

        let config = ResolvedConfig::resolve(
            Some((path.clone(), file.clone())),
            &env(&[(
                "RUNKEEPER_CORS_ORIGINS",
                "https://console.example, http://localhost:5173",
            )]),
        )
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://console.example", "http://localhost:5173"]
        );

        let config =
            ResolvedConfig::resolve(Some((path, file)), &env(&[("RUNKEEPER_CORS_ORIGINS", "*")]))
                .unwrap();
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ResolvedConfig::resolve(None, &env(&[("RUNKEEPER_WORKERS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("RUNKEEPER_WORKERS"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.runkeeper");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/.runkeeper/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
