//! Entry points tying loading, matching, and shaping together.
//!
//! Every run validates the schema of each input before any cell is parsed,
//! so a missing column never produces partial output.

pub mod categories;
pub mod grouped;
pub mod overlap;
pub mod rollup;
pub mod shapes;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::output::ResultTable;
use crate::records::{validate_schema, RecordSet, Requirements, RowIssue};
use crate::table::Table;

use self::grouped::{group_table, GroupSpec};
use self::overlap::{match_records, OverlapPredicate};
use self::rollup::{rollup, RollupShape, RollupSpec};
use self::shapes::{shape, JoinMode, ShapeOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub table: ResultTable,
    pub reference_issues: Vec<RowIssue>,
    pub candidate_issues: Vec<RowIssue>,
    /// Number of (reference, candidate) pairs that overlapped.
    pub pairs: usize,
    /// Reference rows with no overlapping candidate.
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    pub table: ResultTable,
    pub issues: Vec<RowIssue>,
}

/// Joins reference intervals against candidate alarms of the same site.
pub fn run_join(
    reference: &Table,
    candidate: &Table,
    mode: JoinMode,
    predicate: OverlapPredicate,
    config: &EngineConfig,
) -> EngineResult<JoinOutcome> {
    let reference_columns = validate_schema(
        reference,
        &config.reference,
        Requirements {
            site: true,
            category: false,
        },
    )?;
    let candidate_columns = validate_schema(
        candidate,
        &config.candidate,
        Requirements {
            site: true,
            category: true,
        },
    )?;

    let options = config.timestamp_options();
    let reference_set = RecordSet::parse(reference, reference_columns, options)?;
    let candidate_set = RecordSet::parse(candidate, candidate_columns, options)?;

    let result = match_records(&reference_set, &candidate_set, predicate);
    let category_column = candidate_columns
        .category
        .map(|idx| candidate.headers()[idx].as_str())
        .unwrap_or_default();
    let table = shape(
        mode,
        &result,
        &reference_set,
        &candidate_set,
        ShapeOptions {
            category_column,
            priority: &config.priority,
            marker: &config.marker,
            delimiter: &config.list_delimiter,
        },
    );

    let pairs = result.pair_count();
    let unmatched = result.unmatched_count();
    tracing::info!(
        mode = mode.as_str(),
        predicate = predicate.as_str(),
        references = reference_set.len(),
        candidates = candidate_set.len(),
        pairs,
        unmatched,
        "joined tables"
    );

    Ok(JoinOutcome {
        table,
        reference_issues: reference_set.issues,
        candidate_issues: candidate_set.issues,
        pairs,
        unmatched,
    })
}

pub fn run_grouped(
    table: &Table,
    spec: &GroupSpec,
    config: &EngineConfig,
) -> EngineResult<TableOutcome> {
    let outcome = group_table(table, spec, config.timestamp_options())?;
    Ok(TableOutcome {
        table: outcome.to_table(spec, &config.list_delimiter),
        issues: outcome.issues,
    })
}

pub fn run_rollup(
    table: &Table,
    spec: RollupSpec,
    shape: RollupShape,
    config: &EngineConfig,
) -> EngineResult<TableOutcome> {
    let mut columns = config.rollup.column_spec();
    if !spec.by_category {
        columns.category = None;
    }
    let records = RecordSet::from_table(
        table,
        &columns,
        Requirements {
            site: false,
            category: spec.by_category,
        },
        config.timestamp_options(),
    )?;
    let rolled = rollup(&records, spec)?;
    Ok(TableOutcome {
        table: rolled.to_table(shape, &config.priority),
        issues: records.issues,
    })
}
