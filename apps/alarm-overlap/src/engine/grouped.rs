use std::collections::{BTreeMap, BTreeSet};

use crate::config::GroupedColumns;
use crate::error::{EngineError, EngineResult, ParseScope};
use crate::output::{format_number, ResultTable};
use crate::records::RowIssue;
use crate::table::{sheet_row, Table};
use crate::time::{duration_hours, parse_timestamp, TimestampOptions};

pub const DURATION_HEADER: &str = "Duration Hours";

/// Source of the per-row value summed into each group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupValue {
    Column(String),
    /// `(end - start)` in hours, from two timestamp columns.
    DurationHours { start: String, end: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub label: String,
    pub value: GroupValue,
    /// Distinct values of this column are concatenated per group.
    pub text: Option<String>,
}

impl GroupSpec {
    pub fn from_columns(columns: &GroupedColumns) -> Self {
        Self {
            label: columns.label.clone(),
            value: GroupValue::Column(columns.sum.clone()),
            text: columns.text.clone(),
        }
    }

    fn value_header(&self) -> &str {
        match &self.value {
            GroupValue::Column(name) => name,
            GroupValue::DurationHours { .. } => DURATION_HEADER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub total: f64,
    pub rows: usize,
    pub texts: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedOutcome {
    /// Groups in ascending label order.
    pub groups: Vec<Group>,
    pub issues: Vec<RowIssue>,
}

impl GroupedOutcome {
    pub fn total(&self, label: &str) -> Option<f64> {
        self.groups
            .iter()
            .find(|group| group.label == label)
            .map(|group| group.total)
    }

    pub fn to_table(&self, spec: &GroupSpec, delimiter: &str) -> ResultTable {
        let mut columns = vec![spec.label.clone(), spec.value_header().to_string()];
        if let Some(text) = &spec.text {
            columns.push(text.clone());
        }
        let mut table = ResultTable::new(columns);
        for group in &self.groups {
            let mut cells = vec![group.label.clone(), format_number(group.total)];
            if spec.text.is_some() {
                cells.push(
                    group
                        .texts
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(delimiter),
                );
            }
            table.push_plain_row(cells);
        }
        table
    }
}

#[derive(Debug, Clone, Copy)]
enum ValueColumns {
    Column(usize),
    Duration { start: usize, end: usize },
}

/// Groups one table by its label column, summing the value per group.
pub fn group_table(
    table: &Table,
    spec: &GroupSpec,
    options: TimestampOptions,
) -> EngineResult<GroupedOutcome> {
    let mut required: Vec<&str> = vec![spec.label.as_str()];
    match &spec.value {
        GroupValue::Column(name) => required.push(name),
        GroupValue::DurationHours { start, end } => {
            required.push(start);
            required.push(end);
        }
    }
    if let Some(text) = &spec.text {
        required.push(text);
    }
    let found = table.require_columns(&required)?;

    let label_col = found[0];
    let (value_cols, text_col) = match &spec.value {
        GroupValue::Column(_) => (ValueColumns::Column(found[1]), found.get(2).copied()),
        GroupValue::DurationHours { .. } => (
            ValueColumns::Duration {
                start: found[1],
                end: found[2],
            },
            found.get(3).copied(),
        ),
    };

    if table.is_empty() {
        return Err(EngineError::EmptyInput {
            table: table.name().to_string(),
        });
    }

    let headers = table.headers();
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    let mut issues = Vec::new();

    for (idx, cells) in table.rows().iter().enumerate() {
        let row = sheet_row(idx);
        let issue = |col: usize, reason: &str| RowIssue {
            row,
            column: headers[col].clone(),
            value: cells[col].clone(),
            reason: reason.to_string(),
        };

        let label = cells[label_col].trim();
        if label.is_empty() {
            issues.push(issue(label_col, "empty label"));
            continue;
        }

        let value = match value_cols {
            // Blank cells add nothing but still contribute their label and text.
            ValueColumns::Column(col) if cells[col].trim().is_empty() => 0.0,
            ValueColumns::Column(col) => match parse_number(&cells[col]) {
                Some(value) => value,
                None => {
                    issues.push(issue(col, "not a number"));
                    continue;
                }
            },
            ValueColumns::Duration { start, end } => {
                let Some(start_ts) = parse_timestamp(&cells[start], options) else {
                    issues.push(issue(start, "unparseable start timestamp"));
                    continue;
                };
                let Some(end_ts) = parse_timestamp(&cells[end], options) else {
                    issues.push(issue(end, "unparseable end timestamp"));
                    continue;
                };
                if end_ts < start_ts {
                    issues.push(issue(end, "end precedes start"));
                    continue;
                }
                duration_hours(start_ts, end_ts)
            }
        };

        let group = groups.entry(label.to_string()).or_insert_with(|| Group {
            label: label.to_string(),
            total: 0.0,
            rows: 0,
            texts: BTreeSet::new(),
        });
        group.total += value;
        group.rows += 1;
        if let Some(col) = text_col {
            let text = cells[col].trim();
            if !text.is_empty() {
                group.texts.insert(text.to_string());
            }
        }
    }

    if groups.is_empty() {
        let first = issues
            .first()
            .map(|issue| issue.to_string())
            .unwrap_or_default();
        return Err(EngineError::Parse {
            table: table.name().to_string(),
            scope: ParseScope::Global,
            message: format!("no row could be grouped (first failure: {first})"),
        });
    }

    if !issues.is_empty() {
        tracing::warn!(
            table = %table.name(),
            dropped = issues.len(),
            "dropped rows while grouping"
        );
    }
    tracing::info!(table = %table.name(), groups = groups.len(), "grouped rows");

    Ok(GroupedOutcome {
        groups: groups.into_values().collect(),
        issues,
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
