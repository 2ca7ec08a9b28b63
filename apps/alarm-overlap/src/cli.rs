use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::engine::grouped::{GroupSpec, GroupValue};
use crate::engine::overlap::OverlapPredicate;
use crate::engine::rollup::{RollupShape, RollupSpec, RollupValue};
use crate::engine::shapes::JoinMode;
use crate::error::EngineError;

#[derive(Parser, Debug)]
#[command(
    name = "alarm-overlap",
    version,
    about = "Join alarm spreadsheets on site and overlapping time"
)]
pub struct Cli {
    /// JSON engine config; falls back to ALARM_OVERLAP_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Match reference intervals against candidate alarms per site.
    Join(JoinArgs),
    /// Sum one column per label of a single table.
    Group(GroupArgs),
    /// Count or sum alarms per date and hour of day.
    Rollup(RollupArgs),
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    #[arg(long)]
    pub reference: PathBuf,
    #[arg(long)]
    pub candidate: PathBuf,
    #[arg(long, value_enum, default_value_t = JoinMode::JoinedList)]
    pub mode: JoinMode,
    #[arg(long, value_enum, default_value_t = OverlapPredicate::IntervalOverlap)]
    pub predicate: OverlapPredicate,
    /// Output file; `.xlsx` and `.json` select those formats, anything else is CSV.
    #[arg(long)]
    pub output: PathBuf,
    #[arg(long)]
    pub site_column: Option<String>,
    #[arg(long)]
    pub start_column: Option<String>,
    #[arg(long)]
    pub end_column: Option<String>,
    #[arg(long)]
    pub category_column: Option<String>,
}

impl JoinArgs {
    /// Column flags apply to both tables; the category only to candidates.
    pub fn apply_to(&self, config: &mut EngineConfig) {
        for spec in [&mut config.reference, &mut config.candidate] {
            if let Some(site) = &self.site_column {
                spec.site = Some(site.clone());
            }
            if let Some(start) = &self.start_column {
                spec.start = start.clone();
            }
            if let Some(end) = &self.end_column {
                spec.end = Some(end.clone());
            }
        }
        if let Some(category) = &self.category_column {
            config.candidate.category = Some(category.clone());
        }
    }
}

#[derive(Args, Debug)]
pub struct GroupArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub output: PathBuf,
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long, conflicts_with = "duration")]
    pub sum: Option<String>,
    #[arg(long, conflicts_with = "no_text")]
    pub text: Option<String>,
    #[arg(long, default_value_t = false)]
    pub no_text: bool,
    /// Sum duration hours from the start/end columns instead of a numeric column.
    #[arg(long, default_value_t = false)]
    pub duration: bool,
    #[arg(long, requires = "duration")]
    pub start_column: Option<String>,
    #[arg(long, requires = "duration")]
    pub end_column: Option<String>,
}

impl GroupArgs {
    pub fn group_spec(&self, config: &EngineConfig) -> GroupSpec {
        let defaults = &config.grouped;
        let value = if self.duration {
            GroupValue::DurationHours {
                start: self
                    .start_column
                    .clone()
                    .unwrap_or_else(|| config.rollup.start.clone()),
                end: self
                    .end_column
                    .clone()
                    .or_else(|| config.rollup.end.clone())
                    .unwrap_or_else(|| "End Time".to_string()),
            }
        } else {
            GroupValue::Column(self.sum.clone().unwrap_or_else(|| defaults.sum.clone()))
        };
        let text = if self.no_text {
            None
        } else {
            self.text.clone().or_else(|| defaults.text.clone())
        };
        GroupSpec {
            label: self.label.clone().unwrap_or_else(|| defaults.label.clone()),
            value,
            text,
        }
    }
}

#[derive(Args, Debug)]
pub struct RollupArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub output: PathBuf,
    /// Most recent calendar days to keep; defaults to the config value.
    #[arg(long)]
    pub days: Option<u32>,
    #[arg(long, default_value_t = false)]
    pub by_category: bool,
    #[arg(long, value_enum, default_value_t = RollupValue::Count)]
    pub value: RollupValue,
    #[arg(long, value_enum, default_value_t = RollupShape::Long)]
    pub shape: RollupShape,
    #[arg(long)]
    pub start_column: Option<String>,
    #[arg(long)]
    pub end_column: Option<String>,
    #[arg(long)]
    pub category_column: Option<String>,
}

impl RollupArgs {
    pub fn apply_to(&self, config: &mut EngineConfig) {
        if let Some(start) = &self.start_column {
            config.rollup.start = start.clone();
        }
        if let Some(end) = &self.end_column {
            config.rollup.end = Some(end.clone());
        }
        if let Some(category) = &self.category_column {
            config.rollup.category = Some(category.clone());
        }
    }

    pub fn rollup_spec(&self, config: &EngineConfig) -> RollupSpec {
        RollupSpec {
            days: self.days.unwrap_or(config.rollup.days),
            by_category: self.by_category,
            value: self.value,
        }
    }
}

/// Process exit status for a failed run: 2 when the input files were
/// rejected, 1 for anything else.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let rejected = err
        .downcast_ref::<EngineError>()
        .is_some_and(EngineError::is_input_error);
    if rejected {
        2
    } else {
        1
    }
}
