use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: Queue,
    #[serde(default)]
    pub analyzer: Analyzer,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Queue {
    pub capacity: usize,
    pub workers: usize,
}
impl Default for Queue {
    fn default() -> Self {
        Self {
            capacity: crate::queue::DEFAULT_CAPACITY,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Analyzer {
    pub program: String,
    pub args: Vec<String>,
    /// 0 disables the deadline.
    pub timeout_seconds: u64,
    pub keep_stderr: bool,
    pub env: BTreeMap<String, String>,
}
impl Default for Analyzer {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            args: vec!["run".into(), "-i".into(), "--rm".into(), "axe-runner".into()],
            timeout_seconds: 0,
            keep_stderr: true,
            env: Default::default(),
        }
    }
}
impl Analyzer {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Llm {
    pub enabled: bool,
    /// Used when the `api_url_env` variable is unset.
    pub api_url: String,
    pub api_url_env: String,
    pub api_key_env: String,
    pub model: String,
    pub model_env: String,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_violations: usize,
    /// 0 disables the per-request deadline.
    pub timeout_seconds: u64,
}
impl Default for Llm {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "".into(),
            api_url_env: "LLM_API_URL".into(),
            api_key_env: "LLM_API_KEY".into(),
            model: "".into(),
            model_env: "GROQ_MODEL".into(),
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_violations: 5,
            timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub dir: String,
}
impl Default for Store {
    fn default() -> Self {
        Self {
            dir: "reports".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
