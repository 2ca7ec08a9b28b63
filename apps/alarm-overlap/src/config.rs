use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::time::TimestampOptions;

pub const CONFIG_PATH_ENV: &str = "ALARM_OVERLAP_CONFIG";
pub const PRIORITY_ENV: &str = "ALARM_OVERLAP_PRIORITY";
pub const DAY_FIRST_ENV: &str = "ALARM_OVERLAP_DAY_FIRST";
pub const MARKER_ENV: &str = "ALARM_OVERLAP_MARKER";

/// Alarm categories shown first, in this order, in matrix and detail output.
pub const DEFAULT_PRIORITY: &[&str] = &[
    "Site Down",
    "Node Down",
    "Mains Failure",
    "Battery Low",
    "Rectifier Failure",
    "Genset Running",
    "High Temperature",
    "Door Open",
    "Link Down",
];

fn default_site_column() -> Option<String> {
    Some("Site".to_string())
}

fn default_start_column() -> String {
    "Start Time".to_string()
}

fn default_end_column() -> Option<String> {
    Some("End Time".to_string())
}

fn default_candidate_category() -> Option<String> {
    Some("Node".to_string())
}

fn default_priority() -> Vec<String> {
    DEFAULT_PRIORITY.iter().map(|name| name.to_string()).collect()
}

fn default_marker() -> String {
    "✓".to_string()
}

fn default_list_delimiter() -> String {
    ", ".to_string()
}

fn default_group_label() -> String {
    "Remarks".to_string()
}

fn default_group_sum() -> String {
    "Elapsed Time Count".to_string()
}

fn default_group_text() -> Option<String> {
    Some("Reasoning".to_string())
}

fn default_rollup_days() -> u32 {
    3
}

/// Column names that locate the record fields inside one uploaded table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSpec {
    #[serde(default = "default_site_column")]
    pub site: Option<String>,
    #[serde(default = "default_start_column")]
    pub start: String,
    #[serde(default = "default_end_column")]
    pub end: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            site: default_site_column(),
            start: default_start_column(),
            end: default_end_column(),
            category: None,
        }
    }
}

impl ColumnSpec {
    pub fn candidate_default() -> Self {
        Self {
            category: default_candidate_category(),
            ..Self::default()
        }
    }
}

fn default_candidate_spec() -> ColumnSpec {
    ColumnSpec::candidate_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupedColumns {
    #[serde(default = "default_group_label")]
    pub label: String,
    #[serde(default = "default_group_sum")]
    pub sum: String,
    #[serde(default = "default_group_text")]
    pub text: Option<String>,
}

impl Default for GroupedColumns {
    fn default() -> Self {
        Self {
            label: default_group_label(),
            sum: default_group_sum(),
            text: default_group_text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RollupColumns {
    #[serde(default = "default_start_column")]
    pub start: String,
    #[serde(default = "default_end_column")]
    pub end: Option<String>,
    #[serde(default = "default_candidate_category")]
    pub category: Option<String>,
    #[serde(default = "default_rollup_days")]
    pub days: u32,
}

impl Default for RollupColumns {
    fn default() -> Self {
        Self {
            start: default_start_column(),
            end: default_end_column(),
            category: default_candidate_category(),
            days: default_rollup_days(),
        }
    }
}

impl RollupColumns {
    pub fn column_spec(&self) -> ColumnSpec {
        ColumnSpec {
            site: None,
            start: self.start.clone(),
            end: self.end.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub reference: ColumnSpec,
    #[serde(default = "default_candidate_spec")]
    pub candidate: ColumnSpec,
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: String,
    #[serde(default)]
    pub day_first: bool,
    #[serde(default)]
    pub grouped: GroupedColumns,
    #[serde(default)]
    pub rollup: RollupColumns,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference: ColumnSpec::default(),
            candidate: ColumnSpec::candidate_default(),
            priority: default_priority(),
            marker: default_marker(),
            list_delimiter: default_list_delimiter(),
            day_first: false,
            grouped: GroupedColumns::default(),
            rollup: RollupColumns::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the JSON config (explicit path, then `ALARM_OVERLAP_CONFIG`) and
    /// applies environment overrides. Without a file, defaults are used.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| env_optional(CONFIG_PATH_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(env_optional)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(PRIORITY_ENV) {
            self.priority = split_list(&raw);
        }
        if let Some(raw) = lookup(DAY_FIRST_ENV) {
            self.day_first = parse_bool(&raw).with_context(|| format!("invalid {DAY_FIRST_ENV}"))?;
        }
        if let Some(raw) = lookup(MARKER_ENV) {
            self.marker = raw;
        }
        Ok(())
    }

    pub fn timestamp_options(&self) -> TimestampOptions {
        TimestampOptions {
            day_first: self.day_first,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
