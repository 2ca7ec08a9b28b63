//! Hour-of-day rollup over the most recent dates of a record set.
//!
//! The window is the `N` latest distinct start dates present in the data, not
//! a wall-clock range, so re-running an old export gives the same table.

use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::categories::order_categories;
use crate::error::{EngineError, EngineResult};
use crate::output::{format_number, ResultTable};
use crate::records::RecordSet;

pub const HOURS_PER_DAY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RollupValue {
    /// Number of records starting in the hour.
    #[default]
    Count,
    /// Summed duration hours of records starting in the hour.
    Hours,
}

impl RollupValue {
    pub fn header(self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Hours => "Duration Hours",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RollupShape {
    /// One row per non-empty (date, hour[, category]) group.
    #[default]
    Long,
    /// One row per date[, category] with hour columns `0`..`23`.
    Pivot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupSpec {
    pub days: u32,
    pub by_category: bool,
    pub value: RollupValue,
}

#[derive(Debug, Clone, PartialEq)]
struct Bucket {
    counts: [u64; HOURS_PER_DAY],
    hours: [f64; HOURS_PER_DAY],
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            counts: [0; HOURS_PER_DAY],
            hours: [0.0; HOURS_PER_DAY],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    /// Dates kept in the window, ascending.
    pub dates: Vec<NaiveDate>,
    pub spec: RollupSpec,
    /// Records outside the day window.
    pub skipped: usize,
    buckets: BTreeMap<(NaiveDate, Option<String>), Bucket>,
}

/// Buckets `records` by start date and hour over the last `spec.days` dates.
pub fn rollup(records: &RecordSet, spec: RollupSpec) -> EngineResult<Rollup> {
    if spec.days == 0 {
        return Err(EngineError::Config(
            "rollup window must cover at least one day".to_string(),
        ));
    }
    let present: BTreeSet<NaiveDate> = records
        .records
        .iter()
        .map(|record| record.start.date())
        .collect();
    let skip = present.len().saturating_sub(spec.days as usize);
    let dates: Vec<NaiveDate> = present.into_iter().skip(skip).collect();
    let first_date = *dates.first().ok_or_else(|| EngineError::EmptyInput {
        table: records.name.clone(),
    })?;

    let mut buckets: BTreeMap<(NaiveDate, Option<String>), Bucket> = BTreeMap::new();
    let mut skipped = 0;
    for record in &records.records {
        let date = record.start.date();
        if date < first_date {
            skipped += 1;
            continue;
        }
        let category = if spec.by_category {
            record.category.clone()
        } else {
            None
        };
        let hour = record.start.hour() as usize;
        let bucket = buckets.entry((date, category)).or_default();
        bucket.counts[hour] += 1;
        bucket.hours[hour] += record.duration_hours();
    }

    tracing::info!(
        table = %records.name,
        from = %first_date,
        dates = dates.len(),
        groups = buckets.len(),
        skipped,
        "rolled up records by hour"
    );

    Ok(Rollup {
        dates,
        spec,
        skipped,
        buckets,
    })
}

impl Rollup {
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.iter().copied()
    }

    pub fn count(&self, date: NaiveDate, category: Option<&str>, hour: usize) -> u64 {
        self.bucket(date, category)
            .and_then(|bucket| bucket.counts.get(hour))
            .copied()
            .unwrap_or(0)
    }

    fn bucket(&self, date: NaiveDate, category: Option<&str>) -> Option<&Bucket> {
        self.buckets.get(&(date, category.map(str::to_string)))
    }

    fn categories(&self, priority: &[String]) -> Vec<String> {
        order_categories(
            self.buckets
                .keys()
                .filter_map(|(_, category)| category.as_deref()),
            priority,
        )
    }

    fn cell(&self, bucket: Option<&Bucket>, hour: usize) -> String {
        match (self.spec.value, bucket) {
            (RollupValue::Count, Some(bucket)) => bucket.counts[hour].to_string(),
            (RollupValue::Hours, Some(bucket)) => format_number(bucket.hours[hour]),
            (_, None) => "0".to_string(),
        }
    }

    /// Row keys in output order: dates ascending, then categories by priority.
    fn keys(&self, priority: &[String], every_date: bool) -> Vec<(NaiveDate, Option<String>)> {
        let categories: Vec<Option<String>> = if self.spec.by_category {
            self.categories(priority).into_iter().map(Some).collect()
        } else {
            vec![None]
        };
        let dates: Vec<NaiveDate> = if every_date {
            self.dates().collect()
        } else {
            let mut seen: Vec<NaiveDate> = self.buckets.keys().map(|(date, _)| *date).collect();
            seen.dedup();
            seen
        };
        dates
            .into_iter()
            .flat_map(|date| categories.iter().cloned().map(move |category| (date, category)))
            .collect()
    }

    pub fn to_long_table(&self, priority: &[String]) -> ResultTable {
        let mut columns = vec!["Date".to_string(), "Hour".to_string()];
        if self.spec.by_category {
            columns.push("Category".to_string());
        }
        columns.push(self.spec.value.header().to_string());
        let mut table = ResultTable::new(columns);

        let keys = self.keys(priority, false);
        let ranks: HashMap<&(NaiveDate, Option<String>), usize> =
            keys.iter().enumerate().map(|(rank, key)| (key, rank)).collect();
        let mut rows: Vec<(NaiveDate, usize, usize, Vec<String>)> = Vec::new();
        for (key, bucket) in &self.buckets {
            let rank = ranks.get(key).copied().unwrap_or(usize::MAX);
            for hour in 0..HOURS_PER_DAY {
                if bucket.counts[hour] == 0 {
                    continue;
                }
                let mut cells = vec![key.0.to_string(), hour.to_string()];
                if self.spec.by_category {
                    cells.push(key.1.clone().unwrap_or_default());
                }
                cells.push(self.cell(Some(bucket), hour));
                rows.push((key.0, hour, rank, cells));
            }
        }
        rows.sort_by_key(|(date, hour, rank, _)| (*date, *hour, *rank));
        for (_, _, _, cells) in rows {
            table.push_plain_row(cells);
        }
        table
    }

    pub fn to_pivot_table(&self, priority: &[String]) -> ResultTable {
        let mut columns = vec!["Date".to_string()];
        if self.spec.by_category {
            columns.push("Category".to_string());
        }
        columns.extend((0..HOURS_PER_DAY).map(|hour| hour.to_string()));
        let mut table = ResultTable::new(columns);

        for (date, category) in self.keys(priority, true) {
            let bucket = self.bucket(date, category.as_deref());
            let mut cells = vec![date.to_string()];
            if self.spec.by_category {
                cells.push(category.clone().unwrap_or_default());
            }
            let mut highlights = vec![false; cells.len()];
            for hour in 0..HOURS_PER_DAY {
                highlights.push(self.count(date, category.as_deref(), hour) > 0);
                cells.push(self.cell(bucket, hour));
            }
            table.push_row(cells, highlights);
        }
        table
    }

    pub fn to_table(&self, shape: RollupShape, priority: &[String]) -> ResultTable {
        match shape {
            RollupShape::Long => self.to_long_table(priority),
            RollupShape::Pivot => self.to_pivot_table(priority),
        }
    }
}
