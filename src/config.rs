use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration, loaded from a YAML file. Every field has a
/// default so a missing file (or an empty one) still yields a runnable
/// server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub listen_addr: String,
    /// Document root served to clients
    pub document_root: PathBuf,
    /// Edge-triggered readiness for connections (level-triggered if false)
    pub edge_triggered: bool,
    /// Worker threads draining the job queue
    pub workers: usize,
    /// Capacity of the job dispatch queue
    pub job_queue_capacity: usize,
    /// Epoll events fetched per wait
    pub max_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:1316".to_string(),
            document_root: PathBuf::from("./resources"),
            edge_triggered: true,
            workers: 6,
            job_queue_capacity: 1024,
            max_events: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path; stderr when unset
    pub path: Option<PathBuf>,
    /// Capacity of the asynchronous log queue
    pub queue_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("failed to read config {}", p.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }
}
