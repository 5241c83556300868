//! Configuration loading, validation, and management for Ironloop.
//!
//! Loads configuration from `<root>/config.toml` with environment variable
//! overrides. The project root defaults to the current directory and can be
//! set with `IRONLOOP_ROOT`; durable state (store file, handoff documents,
//! crash logs) lives underneath it.

use ironloop_core::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure. Maps directly to `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session compaction settings
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Process supervisor settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. Usually supplied via `IRONLOOP_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the messages endpoint (no trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Output token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Transport timeout in seconds. Model calls can take minutes.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_request_timeout() -> u64 {
    300
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration cap for the specialized loops. 0 = unbounded.
    #[serde(default)]
    pub max_iterations: u32,

    /// Inner tool-call iteration cap for one model agent turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Base URL of the external tool platform, if one is available.
    #[serde(default)]
    pub platform_url: Option<String>,
}

fn default_max_tool_iterations() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            max_tool_iterations: default_max_tool_iterations(),
            platform_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Token threshold above which a session is compacted.
    /// Default is 90% of a 128k context window.
    #[serde(default = "default_compaction_threshold")]
    pub threshold_tokens: usize,
}

fn default_compaction_threshold() -> usize {
    115_200
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold_tokens: default_compaction_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How often to poll for a staged binary, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Crash watch window after a swap, in seconds.
    #[serde(default = "default_watch_window")]
    pub watch_window_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_watch_window() -> u64 {
    30
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            watch_window_secs: default_watch_window(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            compaction: CompactionConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("compaction", &self.compaction)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl AppConfig {
    /// Load from `<root>/config.toml` (missing file = defaults), then apply
    /// environment overrides and validate.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join("config.toml");
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| Error::Config {
                message: format!("read {}: {e}", path.display()),
            })?;
            toml::from_str(&raw).map_err(|e| Error::Config {
                message: format!("parse {}: {e}", path.display()),
            })?
        } else {
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("IRONLOOP_API_KEY") {
            if !key.is_empty() {
                self.model.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("IRONLOOP_BASE_URL") {
            if !url.is_empty() {
                self.model.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(model) = std::env::var("IRONLOOP_MODEL") {
            if !model.is_empty() {
                self.model.model = model;
            }
        }
        if let Ok(iters) = std::env::var("IRONLOOP_MAX_ITERATIONS") {
            if let Ok(n) = iters.parse() {
                self.agent.max_iterations = n;
            }
        }
        if let Ok(url) = std::env::var("IRONLOOP_PLATFORM_URL") {
            if !url.is_empty() {
                self.agent.platform_url = Some(url.trim_end_matches('/').to_string());
            }
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.model.base_url.is_empty() {
            return Err(Error::Config {
                message: "model.base_url must not be empty".into(),
            });
        }
        if self.model.max_tokens == 0 {
            return Err(Error::Config {
                message: "model.max_tokens must be positive".into(),
            });
        }
        if self.compaction.threshold_tokens == 0 {
            return Err(Error::Config {
                message: "compaction.threshold_tokens must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Well-known paths under the project root.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    /// Resolve the project root: `IRONLOOP_ROOT` or the current directory.
    pub fn resolve() -> Self {
        let root = std::env::var("IRONLOOP_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self { root }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The shared SQLite store file.
    pub fn store_file(&self) -> PathBuf {
        self.root.join("data").join("ironloop.db")
    }

    /// Handoff documents (MANUAL.md, FEEDBACK.md) live here.
    pub fn ops_dir(&self) -> PathBuf {
        self.root.join("data").join("ops")
    }

    /// Crash logs written by the supervisor.
    pub fn failure_dir(&self) -> PathBuf {
        self.root.join("data").join("build-failures")
    }

    /// The currently installed agent binary.
    pub fn binary(&self) -> PathBuf {
        self.root.join("ironloop")
    }

    /// Where a freshly built binary is staged for hot-swap.
    pub fn staged_binary(&self) -> PathBuf {
        self.root.join("builds").join("ironloop.new")
    }

    /// Backup of the previous binary, kept for rollback.
    pub fn prev_binary(&self) -> PathBuf {
        self.root.join("ironloop.prev")
    }

    /// Where the agent process's output is captured.
    pub fn agent_log(&self) -> PathBuf {
        self.root.join("data").join("agent.log")
    }
}
