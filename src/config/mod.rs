// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for docsort

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Knowledge file settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Which files a run picks up
    #[serde(default)]
    pub scan: ScanConfig,

    /// Filing rules
    #[serde(default)]
    pub rules: RuleConfig,

    /// Cloud materialization wait
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Extra personal names never treated as category hints
    #[serde(default)]
    pub names: Vec<String>,

    /// Move journal settings
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KnowledgeConfig {
    /// Explicit knowledge file; resolved from the root folder when unset
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_knowledge_file_name")]
    pub file_name: String,
    /// Seed the built-in categories into an empty knowledge base
    #[serde(default)]
    pub seed_defaults: bool,
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleConfig {
    /// File dated documents under `{category}/{year}`
    #[serde(default = "default_true")]
    pub year_subfolders: bool,
    /// Rewrite `YYYYMMDD_rest.ext` to `YYYY-MM-DD rest.ext` on move
    #[serde(default)]
    pub normalize_date_prefix: bool,
    #[serde(default = "default_max_collision_suffix")]
    pub max_collision_suffix: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudConfig {
    #[serde(default = "default_cloud_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stable_checks")]
    pub stable_checks: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
}

// Default value functions
fn default_knowledge_file_name() -> String { ".docsort_knowledge.json".to_string() }
fn default_save_retries() -> u32 { 3 }
fn default_true() -> bool { true }
fn default_max_collision_suffix() -> u32 { 99 }
fn default_cloud_timeout() -> u64 { 30 }
fn default_poll_interval() -> u64 { 1000 }
fn default_stable_checks() -> u32 { 3 }
fn default_history_path() -> String { "docsort_history.jsonl".to_string() }

fn default_extensions() -> Vec<String> {
    vec!["pdf", "jpg", "jpeg", "png"]
        .into_iter().map(String::from).collect()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: None,
            file_name: default_knowledge_file_name(),
            seed_defaults: false,
            save_retries: default_save_retries(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            recursive: false,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            year_subfolders: true,
            normalize_date_prefix: false,
            max_collision_suffix: default_max_collision_suffix(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_cloud_timeout(),
            poll_interval_ms: default_poll_interval(),
            stable_checks: default_stable_checks(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

impl CloudConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ScanConfig {
    /// Check whether a file's extension is one we sort
    pub fn accepts_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::DocsortError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        crate::fsutil::write_atomic(path, content.as_bytes())?;
        Ok(())
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.scan.extensions.is_empty() {
            return Err(crate::DocsortError::Config("scan.extensions must not be empty".to_string()));
        }
        if self.cloud.stable_checks == 0 {
            return Err(crate::DocsortError::Config("cloud.stable_checks must be at least 1".to_string()));
        }
        if self.knowledge.file_name.trim().is_empty() {
            return Err(crate::DocsortError::Config("knowledge.file_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Explicit knowledge path from the config, if any
    pub fn knowledge_path(&self) -> Option<PathBuf> {
        self.knowledge.path.as_ref().map(PathBuf::from)
    }
}
