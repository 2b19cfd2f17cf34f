//! Tool configuration loaded from TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dbf_engine::Charset;
use serde::Deserialize;

/// File read when `--config` is not given, if it exists
pub const DEFAULT_CONFIG_FILE: &str = "dbf-tool.toml";

/// Settings shared by all commands
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Character set of column names and text fields
    pub charset: Charset,
    /// Worker threads for range reads
    pub workers: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Extra attempts when an append hits a concurrent modification
    pub append_retries: u32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            charset: Charset::utf8(),
            workers: 4,
            log_level: "info".to_string(),
            append_retries: 0,
        }
    }
}

impl ToolConfig {
    /// Load from an explicit path, or from the default file when present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(ToolConfig::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
