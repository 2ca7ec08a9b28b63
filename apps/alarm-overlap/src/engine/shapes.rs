use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::categories::order_categories;
use super::overlap::{Match, MatchResult};
use crate::output::ResultTable;
use crate::records::RecordSet;
use crate::time::format_timestamp;

/// Output shape of a reference/candidate join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Distinct matched categories joined into one appended column.
    #[default]
    JoinedList,
    /// One marker column per category.
    PresenceMatrix,
    /// One column per category listing the matched intervals.
    Detail,
    /// One row per (reference, candidate) pair, left-outer shaped.
    ExpandedRows,
}

impl JoinMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinedList => "joined-list",
            Self::PresenceMatrix => "presence-matrix",
            Self::Detail => "detail",
            Self::ExpandedRows => "expanded-rows",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeOptions<'a> {
    /// Header of the candidate category column, used to name appended columns.
    pub category_column: &'a str,
    pub priority: &'a [String],
    pub marker: &'a str,
    pub delimiter: &'a str,
}

pub fn shape(
    mode: JoinMode,
    result: &MatchResult<'_>,
    reference: &RecordSet,
    candidates: &RecordSet,
    options: ShapeOptions<'_>,
) -> ResultTable {
    match mode {
        JoinMode::JoinedList => joined_list(result, reference, options),
        JoinMode::PresenceMatrix => presence_matrix(result, reference, candidates, options),
        JoinMode::Detail => detail(result, reference, candidates, options),
        JoinMode::ExpandedRows => expanded_rows(result, reference, options),
    }
}

pub fn joined_list(
    result: &MatchResult<'_>,
    reference: &RecordSet,
    options: ShapeOptions<'_>,
) -> ResultTable {
    let mut columns = reference.headers.clone();
    columns.push(format!("Matched {}", options.category_column));
    let mut table = ResultTable::new(columns);

    for m in &result.matches {
        let joined = m
            .distinct_categories()
            .into_iter()
            .collect::<Vec<_>>()
            .join(options.delimiter);
        let mut highlights = vec![false; m.reference.fields.len()];
        highlights.push(!joined.is_empty());
        let mut cells = m.reference.fields.clone();
        cells.push(joined);
        table.push_row(cells, highlights);
    }
    table
}

/// Category columns: every category observed in the candidate set.
fn category_columns(candidates: &RecordSet, options: ShapeOptions<'_>) -> Vec<String> {
    order_categories(candidates.categories(), options.priority)
}

pub fn presence_matrix(
    result: &MatchResult<'_>,
    reference: &RecordSet,
    candidates: &RecordSet,
    options: ShapeOptions<'_>,
) -> ResultTable {
    let categories = category_columns(candidates, options);
    per_category_table(result, reference, &categories, |_, matched, category| {
        if matched.contains(category) {
            options.marker.to_string()
        } else {
            String::new()
        }
    })
}

pub fn detail(
    result: &MatchResult<'_>,
    reference: &RecordSet,
    candidates: &RecordSet,
    options: ShapeOptions<'_>,
) -> ResultTable {
    let categories = category_columns(candidates, options);
    per_category_table(result, reference, &categories, |m, _matched, category| {
        m.of_category(category)
            .map(|candidate| {
                format!(
                    "{} → {}",
                    format_timestamp(candidate.start),
                    format_timestamp(candidate.end)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn per_category_table<F>(
    result: &MatchResult<'_>,
    reference: &RecordSet,
    categories: &[String],
    render: F,
) -> ResultTable
where
    F: Fn(&Match<'_>, &BTreeSet<&str>, &str) -> String,
{
    let mut columns = reference.headers.clone();
    columns.extend(categories.iter().cloned());
    let mut table = ResultTable::new(columns);

    for m in &result.matches {
        let matched = m.distinct_categories();
        let mut cells = m.reference.fields.clone();
        let mut highlights = vec![false; cells.len()];
        for category in categories {
            let cell = render(m, &matched, category);
            highlights.push(matched.contains(category.as_str()));
            cells.push(cell);
        }
        table.push_row(cells, highlights);
    }
    table
}

pub fn expanded_rows(
    result: &MatchResult<'_>,
    reference: &RecordSet,
    options: ShapeOptions<'_>,
) -> ResultTable {
    let mut columns = reference.headers.clone();
    columns.push(format!("Matched {}", options.category_column));
    columns.push("Matched Start".to_string());
    columns.push("Matched End".to_string());
    let mut table = ResultTable::new(columns);

    for m in &result.matches {
        let base = &m.reference.fields;
        if m.is_empty() {
            let mut cells = base.clone();
            cells.extend([String::new(), String::new(), String::new()]);
            table.push_plain_row(cells);
            continue;
        }
        for candidate in &m.candidates {
            let mut cells = base.clone();
            cells.push(candidate.category_str().to_string());
            cells.push(format_timestamp(candidate.start));
            cells.push(format_timestamp(candidate.end));
            let mut highlights = vec![false; base.len()];
            highlights.extend([true, true, true]);
            table.push_row(cells, highlights);
        }
    }
    table
}
