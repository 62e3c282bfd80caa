//! Scripted responses for `replay` and `serve`
//!
//! ```toml
//! chunks = ["first", "second"]
//! delay_ms = 50
//!
//! [status]
//! code = "unavailable"
//! message = "backend down"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use streamfold_core::{Code, Status};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Response messages, sent in order
    #[serde(default)]
    pub chunks: Vec<String>,
    /// Pause before each chunk
    #[serde(default)]
    pub delay_ms: u64,
    /// Final status; omitted means ok
    #[serde(default)]
    pub status: Option<ScriptStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStatus {
    pub code: Code,
    #[serde(default)]
    pub message: String,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn status(&self) -> Status {
        match &self.status {
            Some(status) => Status::new(status.code, status.message.clone()),
            None => Status::ok(),
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        (self.delay_ms > 0).then(|| Duration::from_millis(self.delay_ms))
    }
}
