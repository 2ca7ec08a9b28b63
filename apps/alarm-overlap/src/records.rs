//! Typed alarm records built from a loaded [`Table`].
//!
//! Column presence is checked once, up front, by [`validate_schema`]; row
//! parsing afterwards is permissive and reports dropped rows as
//! [`RowIssue`]s instead of failing the batch.

use chrono::NaiveDateTime;
use std::fmt;

use crate::config::ColumnSpec;
use crate::error::{EngineError, EngineResult, ParseScope};
use crate::table::{sheet_row, Table};
use crate::time::{duration_hours, parse_timestamp, TimestampOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Spreadsheet row number (header is row 1).
    pub row: usize,
    /// Whitespace-stripped site key; empty when the table has no site column.
    pub site: String,
    pub start: NaiveDateTime,
    /// Equal to `start` for point events.
    pub end: NaiveDateTime,
    pub category: Option<String>,
    /// Every original cell of the row, for passthrough output.
    pub fields: Vec<String>,
}

impl Record {
    pub fn duration_hours(&self) -> f64 {
        duration_hours(self.start, self.end)
    }

    pub fn category_str(&self) -> &str {
        self.category.as_deref().unwrap_or("")
    }
}

/// A row that was excluded while building a [`RecordSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: column '{}' value {:?}: {}",
            self.row, self.column, self.value, self.reason
        )
    }
}

impl RowIssue {
    pub fn to_error(&self, table: &str) -> EngineError {
        EngineError::Parse {
            table: table.to_string(),
            scope: ParseScope::Row(self.row),
            message: format!("column '{}' value {:?}: {}", self.column, self.value, self.reason),
        }
    }
}

/// Resolved column positions for a [`ColumnSpec`] within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndexes {
    pub site: Option<usize>,
    pub start: usize,
    pub end: Option<usize>,
    pub category: Option<usize>,
}

/// What a caller needs from a table beyond the configured names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    pub site: bool,
    pub category: bool,
}

/// Checks that every configured column exists, before any cell is parsed.
pub fn validate_schema(
    table: &Table,
    spec: &ColumnSpec,
    requirements: Requirements,
) -> EngineResult<ColumnIndexes> {
    if requirements.site && spec.site.is_none() {
        return Err(EngineError::Config(format!(
            "a site column must be configured for {}",
            table.name()
        )));
    }
    if requirements.category && spec.category.is_none() {
        return Err(EngineError::Config(format!(
            "a category column must be configured for {}",
            table.name()
        )));
    }

    let mut required: Vec<&str> = Vec::with_capacity(4);
    if let Some(site) = spec.site.as_deref() {
        required.push(site);
    }
    required.push(&spec.start);
    if let Some(end) = spec.end.as_deref() {
        required.push(end);
    }
    if let Some(category) = spec.category.as_deref() {
        required.push(category);
    }

    let found = table.require_columns(&required)?;
    // `require_columns` answers in request order.
    let mut positions = found.into_iter();
    let site = spec.site.as_ref().and_then(|_| positions.next());
    let start = positions
        .next()
        .ok_or_else(|| EngineError::Config("start column unresolved".to_string()))?;
    let end = spec.end.as_ref().and_then(|_| positions.next());
    let category = spec.category.as_ref().and_then(|_| positions.next());

    Ok(ColumnIndexes {
        site,
        start,
        end,
        category,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub name: String,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub issues: Vec<RowIssue>,
}

impl RecordSet {
    /// Validates the schema and parses every row.
    pub fn from_table(
        table: &Table,
        spec: &ColumnSpec,
        requirements: Requirements,
        options: TimestampOptions,
    ) -> EngineResult<Self> {
        let columns = validate_schema(table, spec, requirements)?;
        Self::parse(table, columns, options)
    }

    /// Parses rows against already-validated column positions.
    ///
    /// Fails with `EmptyInput` when the table has no data rows and with a
    /// global `Parse` error when every row was dropped.
    pub fn parse(
        table: &Table,
        columns: ColumnIndexes,
        options: TimestampOptions,
    ) -> EngineResult<Self> {
        if table.is_empty() {
            return Err(EngineError::EmptyInput {
                table: table.name().to_string(),
            });
        }

        let headers = table.headers().to_vec();
        let mut records = Vec::with_capacity(table.len());
        let mut issues = Vec::new();

        for (idx, cells) in table.rows().iter().enumerate() {
            match parse_row(sheet_row(idx), cells, &headers, columns, options) {
                Ok(record) => records.push(record),
                Err(issue) => {
                    tracing::debug!(table = %table.name(), issue = %issue, "dropped row");
                    issues.push(issue);
                }
            }
        }

        if records.is_empty() {
            let first = issues
                .first()
                .map(|issue| issue.to_string())
                .unwrap_or_default();
            return Err(EngineError::Parse {
                table: table.name().to_string(),
                scope: ParseScope::Global,
                message: format!("no row could be parsed (first failure: {first})"),
            });
        }

        if !issues.is_empty() {
            tracing::warn!(
                table = %table.name(),
                dropped = issues.len(),
                kept = records.len(),
                "dropped malformed rows"
            );
        }

        Ok(Self {
            name: table.name().to_string(),
            headers,
            records,
            issues,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Category labels of every record, in row order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter_map(|record| record.category.as_deref())
    }
}

fn parse_row(
    row: usize,
    cells: &[String],
    headers: &[String],
    columns: ColumnIndexes,
    options: TimestampOptions,
) -> Result<Record, RowIssue> {
    let issue = |col: usize, reason: &str| RowIssue {
        row,
        column: headers[col].clone(),
        value: cells[col].clone(),
        reason: reason.to_string(),
    };

    let site = match columns.site {
        Some(col) => {
            let site = cells[col].trim();
            if site.is_empty() {
                return Err(issue(col, "empty site key"));
            }
            site.to_string()
        }
        None => String::new(),
    };

    let start = parse_timestamp(&cells[columns.start], options)
        .ok_or_else(|| issue(columns.start, "unparseable start timestamp"))?;

    let end = match columns.end {
        Some(col) if !cells[col].trim().is_empty() => {
            let end = parse_timestamp(&cells[col], options)
                .ok_or_else(|| issue(col, "unparseable end timestamp"))?;
            if end < start {
                return Err(issue(col, "end precedes start"));
            }
            end
        }
        _ => start,
    };

    let category = match columns.category {
        Some(col) => {
            let category = cells[col].trim();
            if category.is_empty() {
                return Err(issue(col, "empty category"));
            }
            Some(category.to_string())
        }
        None => None,
    };

    Ok(Record {
        row,
        site,
        start,
        end,
        category,
        fields: cells.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hh, mm, 0))
            .expect("valid test timestamp")
    }

    fn candidate_spec() -> ColumnSpec {
        ColumnSpec::candidate_default()
    }

    fn candidate_requirements() -> Requirements {
        Requirements {
            site: true,
            category: true,
        }
    }

    #[test]
    fn valid_rows_become_records_with_trimmed_keys() {
        let table = Table::from_str_rows(
            "b.csv",
            &["Site", "Node", "Start Time", "End Time", "Zone"],
            &[&["  A1 ", " Door Open ", "2024-01-01 10:30", "2024-01-01 10:45", "North"]],
        );
        let set = RecordSet::from_table(
            &table,
            &candidate_spec(),
            candidate_requirements(),
            TimestampOptions::default(),
        )
        .expect("parse");

        assert_eq!(set.len(), 1);
        let record = &set.records[0];
        assert_eq!(record.row, 2);
        assert_eq!(record.site, "A1");
        assert_eq!(record.category.as_deref(), Some("Door Open"));
        assert_eq!(record.start, at(10, 30));
        assert_eq!(record.end, at(10, 45));
        assert_eq!(record.fields[4], "North", "passthrough fields are carried");
        assert!((record.duration_hours() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn site_key_keeps_case() {
        let table = Table::from_str_rows(
            "a.csv",
            &["Site", "Start Time", "End Time"],
            &[&["a1", "2024-01-01 10:00", "2024-01-01 11:00"]],
        );
        let set = RecordSet::from_table(
            &table,
            &ColumnSpec::default(),
            Requirements { site: true, category: false },
            TimestampOptions::default(),
        )
        .expect("parse");
        assert_eq!(set.records[0].site, "a1");
    }

    #[test]
    fn empty_end_cell_is_a_point_event() {
        let table = Table::from_str_rows(
            "b.csv",
            &["Site", "Node", "Start Time", "End Time"],
            &[&["A1", "Door Open", "2024-01-01 10:30", ""]],
        );
        let set = RecordSet::from_table(
            &table,
            &candidate_spec(),
            candidate_requirements(),
            TimestampOptions::default(),
        )
        .expect("parse");
        assert_eq!(set.records[0].start, set.records[0].end);
    }

    #[test]
    fn malformed_rows_are_dropped_and_reported() {
        let table = Table::from_str_rows(
            "b.csv",
            &["Site", "Node", "Start Time", "End Time"],
            &[
                &["A1", "Door Open", "2024-01-01 10:30", "2024-01-01 10:45"],
                &["A1", "Door Open", "yesterday", "2024-01-01 10:45"],
                &["A1", "Door Open", "2024-01-01 10:30", "soon"],
                &["A1", "Door Open", "2024-01-01 10:30", "2024-01-01 09:00"],
                &["", "Door Open", "2024-01-01 10:30", "2024-01-01 10:45"],
                &["A1", " ", "2024-01-01 10:30", "2024-01-01 10:45"],
            ],
        );
        let set = RecordSet::from_table(
            &table,
            &candidate_spec(),
            candidate_requirements(),
            TimestampOptions::default(),
        )
        .expect("partial output is allowed");

        assert_eq!(set.len(), 1);
        let reasons: Vec<(usize, &str)> = set
            .issues
            .iter()
            .map(|issue| (issue.row, issue.reason.as_str()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (3, "unparseable start timestamp"),
                (4, "unparseable end timestamp"),
                (5, "end precedes start"),
                (6, "empty site key"),
                (7, "empty category"),
            ]
        );
        assert_eq!(set.issues[0].column, "Start Time");
        assert_eq!(set.issues[0].value, "yesterday");
    }

    #[test]
    fn all_rows_failing_is_a_global_parse_error() {
        let table = Table::from_str_rows(
            "a.csv",
            &["Site", "Start Time", "End Time"],
            &[&["A1", "bad", "bad"], &["A2", "worse", ""]],
        );
        let err = RecordSet::from_table(
            &table,
            &ColumnSpec::default(),
            Requirements { site: true, category: false },
            TimestampOptions::default(),
        )
        .expect_err("nothing usable");
        match err {
            EngineError::Parse { scope, message, .. } => {
                assert_eq!(scope, ParseScope::Global);
                assert!(message.contains("row 2"), "{message}");
            }
            other => panic!("expected global parse error, got {other:?}"),
        }
    }

    #[test]
    fn header_only_table_is_empty_input() {
        let table = Table::from_str_rows("a.csv", &["Site", "Start Time", "End Time"], &[]);
        let err = RecordSet::from_table(
            &table,
            &ColumnSpec::default(),
            Requirements { site: true, category: false },
            TimestampOptions::default(),
        )
        .expect_err("empty");
        assert!(matches!(err, EngineError::EmptyInput { .. }));
    }

    #[test]
    fn schema_is_checked_before_rows() {
        // Rows are garbage, but the missing column must be reported first.
        let table = Table::from_str_rows("b.csv", &["Site", "Start Time"], &[&["A1", "bad"]]);
        let err = RecordSet::from_table(
            &table,
            &candidate_spec(),
            candidate_requirements(),
            TimestampOptions::default(),
        )
        .expect_err("schema");
        match err {
            EngineError::Schema { missing_columns, .. } => {
                assert_eq!(missing_columns, vec!["End Time", "Node"]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn missing_category_configuration_is_a_config_error() {
        let table = Table::from_str_rows("b.csv", &["Site", "Start Time", "End Time"], &[]);
        let err = validate_schema(&table, &ColumnSpec::default(), candidate_requirements())
            .expect_err("no category configured");
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn tables_without_site_column_parse_when_not_required() {
        let table = Table::from_str_rows(
            "events.csv",
            &["Start Time", "Node"],
            &[&["2024-01-01 10:00", "Door Open"]],
        );
        let spec = ColumnSpec {
            site: None,
            start: "Start Time".to_string(),
            end: None,
            category: Some("Node".to_string()),
        };
        let set = RecordSet::from_table(
            &table,
            &spec,
            Requirements::default(),
            TimestampOptions::default(),
        )
        .expect("parse");
        assert_eq!(set.records[0].site, "");
        assert_eq!(set.records[0].end, at(10, 0));
    }

    #[test]
    fn row_issue_converts_to_row_scoped_parse_error() {
        let issue = RowIssue {
            row: 4,
            column: "Start Time".to_string(),
            value: "bad".to_string(),
            reason: "unparseable start timestamp".to_string(),
        };
        match issue.to_error("a.csv") {
            EngineError::Parse { scope, .. } => assert_eq!(scope, ParseScope::Row(4)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
