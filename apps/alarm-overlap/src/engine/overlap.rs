use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::records::{Record, RecordSet};

/// Decides whether a candidate record counts as matched against a
/// reference interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPredicate {
    /// Candidate start inside `[start, end]`; candidate end ignored.
    #[value(name = "point")]
    PointInRange,
    /// Candidate start inside, candidate end inside, or candidate covers
    /// the whole reference interval.
    #[default]
    #[value(name = "interval")]
    IntervalOverlap,
}

impl OverlapPredicate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointInRange => "point",
            Self::IntervalOverlap => "interval",
        }
    }

    pub fn matches(self, reference: &Record, candidate: &Record) -> bool {
        match self {
            Self::PointInRange => point_in_range(reference.start, reference.end, candidate.start),
            Self::IntervalOverlap => intervals_overlap(
                reference.start,
                reference.end,
                candidate.start,
                candidate.end,
            ),
        }
    }
}

pub fn point_in_range(start: NaiveDateTime, end: NaiveDateTime, at: NaiveDateTime) -> bool {
    start <= at && at <= end
}

/// Three-clause overlap test between reference `[rs, re]` and candidate
/// `[cs, ce]`, all bounds inclusive.
pub fn intervals_overlap(
    rs: NaiveDateTime,
    re: NaiveDateTime,
    cs: NaiveDateTime,
    ce: NaiveDateTime,
) -> bool {
    let starts_inside = point_in_range(rs, re, cs);
    let ends_inside = point_in_range(rs, re, ce);
    let covers = cs <= rs && ce >= re;
    starts_inside || ends_inside || covers
}

/// Candidates grouped by site key, each group sorted by `(start, row)`.
#[derive(Debug)]
pub struct SiteIndex<'a> {
    by_site: HashMap<&'a str, Vec<&'a Record>>,
}

impl<'a> SiteIndex<'a> {
    pub fn build(candidates: &'a [Record]) -> Self {
        let mut by_site: HashMap<&'a str, Vec<&'a Record>> = HashMap::new();
        for record in candidates {
            by_site.entry(record.site.as_str()).or_default().push(record);
        }
        for group in by_site.values_mut() {
            group.sort_by_key(|record| (record.start, record.row));
        }
        Self { by_site }
    }

    pub fn site(&self, site: &str) -> &[&'a Record] {
        self.by_site.get(site).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn site_count(&self) -> usize {
        self.by_site.len()
    }

    /// Candidates of `reference.site` satisfying `predicate`, in start order.
    pub fn lookup(&self, reference: &Record, predicate: OverlapPredicate) -> Vec<&'a Record> {
        let group = self.site(&reference.site);
        // Every accepted candidate starts no later than the reference end.
        let upper = group.partition_point(|candidate| candidate.start <= reference.end);
        group[..upper]
            .iter()
            .copied()
            .filter(|candidate| predicate.matches(reference, candidate))
            .collect()
    }
}

/// Matched candidates for one reference record.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub reference: &'a Record,
    pub candidates: Vec<&'a Record>,
}

impl<'a> Match<'a> {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Distinct matched categories in ascending order.
    pub fn distinct_categories(&self) -> BTreeSet<&'a str> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.category.as_deref())
            .collect()
    }

    pub fn of_category<'m>(&'m self, category: &'m str) -> impl Iterator<Item = &'a Record> + 'm {
        self.candidates
            .iter()
            .copied()
            .filter(move |candidate| candidate.category.as_deref() == Some(category))
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    pub predicate: OverlapPredicate,
    /// One entry per reference record, in reference row order.
    pub matches: Vec<Match<'a>>,
}

impl<'a> MatchResult<'a> {
    pub fn pair_count(&self) -> usize {
        self.matches.iter().map(|m| m.candidates.len()).sum()
    }

    pub fn unmatched_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_empty()).count()
    }
}

/// Equality join on site key followed by the overlap test.
pub fn match_records<'a>(
    reference: &'a RecordSet,
    candidates: &'a RecordSet,
    predicate: OverlapPredicate,
) -> MatchResult<'a> {
    let index = SiteIndex::build(&candidates.records);
    let matches = reference
        .records
        .iter()
        .map(|record| Match {
            reference: record,
            candidates: index.lookup(record, predicate),
        })
        .collect();

    let result = MatchResult { predicate, matches };
    tracing::debug!(
        predicate = predicate.as_str(),
        sites = index.site_count(),
        pairs = result.pair_count(),
        unmatched = result.unmatched_count(),
        "matched records"
    );
    result
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

    fn record(
        row: usize,
        site: &str,
        category: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Record {
        Record {
            row,
            site: site.to_string(),
            start,
            end,
            category: category.map(str::to_string),
            fields: Vec::new(),
        }
    }

    fn set(records: Vec<Record>) -> RecordSet {
        RecordSet {
            name: "test".to_string(),
            headers: Vec::new(),
            records,
            issues: Vec::new(),
        }
    }

    #[test]
    fn interval_overlap_accepts_each_clause_and_touching_bounds() {
        let (rs, re) = (at(10, 0), at(12, 0));
        // Starts inside.
        assert!(intervals_overlap(rs, re, at(11, 0), at(13, 0)));
        // Ends inside.
        assert!(intervals_overlap(rs, re, at(9, 0), at(10, 30)));
        // Covers the reference.
        assert!(intervals_overlap(rs, re, at(9, 0), at(13, 0)));
        // Shares only the end instant.
        assert!(intervals_overlap(rs, re, at(12, 0), at(12, 30)));
        // Shares only the start instant.
        assert!(intervals_overlap(rs, re, at(9, 0), at(10, 0)));
        // Disjoint.
        assert!(!intervals_overlap(rs, re, at(9, 0), at(9, 59)));
        assert!(!intervals_overlap(rs, re, at(12, 1), at(13, 0)));
    }

    #[test]
    fn point_in_range_ignores_candidate_end() {
        let reference = record(2, "A1", None, at(10, 0), at(12, 0));
        let covering = record(3, "A1", Some("X"), at(9, 0), at(13, 0));
        let inside = record(4, "A1", Some("X"), at(11, 0), at(15, 0));

        assert!(!OverlapPredicate::PointInRange.matches(&reference, &covering));
        assert!(OverlapPredicate::IntervalOverlap.matches(&reference, &covering));
        assert!(OverlapPredicate::PointInRange.matches(&reference, &inside));
    }

    #[test]
    fn matching_only_pairs_equal_site_keys() {
        let reference = set(vec![record(2, "A1", None, at(10, 0), at(12, 0))]);
        let candidates = set(vec![
            record(2, "A1", Some("X"), at(10, 30), at(10, 45)),
            record(3, "A1", Some("Y"), at(9, 0), at(9, 10)),
            record(4, "B2", Some("Z"), at(11, 0), at(11, 10)),
            record(5, "a1", Some("W"), at(11, 0), at(11, 10)),
        ]);

        let result = match_records(&reference, &candidates, OverlapPredicate::IntervalOverlap);
        assert_eq!(result.matches.len(), 1);
        let categories: Vec<&str> = result.matches[0].distinct_categories().into_iter().collect();
        assert_eq!(categories, vec!["X"]);
        assert_eq!(result.pair_count(), 1);
        assert_eq!(result.unmatched_count(), 0);
    }

    #[test]
    fn matches_are_sorted_by_candidate_start() {
        let reference = set(vec![record(2, "A1", None, at(10, 0), at(12, 0))]);
        let candidates = set(vec![
            record(2, "A1", Some("X"), at(11, 30), at(11, 45)),
            record(3, "A1", Some("Y"), at(8, 0), at(10, 5)),
            record(4, "A1", Some("X"), at(10, 15), at(10, 20)),
        ]);
        let result = match_records(&reference, &candidates, OverlapPredicate::IntervalOverlap);
        let rows: Vec<usize> = result.matches[0].candidates.iter().map(|c| c.row).collect();
        assert_eq!(rows, vec![3, 4, 2]);
        assert_eq!(result.matches[0].of_category("X").count(), 2);
    }

    #[test]
    fn every_reported_match_satisfies_the_predicate() {
        let references: Vec<Record> = (0..12)
            .map(|i| {
                let site = if i % 2 == 0 { "A" } else { "B" };
                record(i + 2, site, None, at(i as u32, 0), at(i as u32 + 1, 30))
            })
            .collect();
        let candidates: Vec<Record> = (0..40)
            .map(|i| {
                let start = at((i % 20) as u32, ((i * 7) % 60) as u32);
                let end = start + chrono::Duration::minutes((i * 13 % 90) as i64);
                record(i + 2, if i % 3 == 0 { "A" } else { "B" }, Some("X"), start, end)
            })
            .collect();
        let reference = set(references);
        let candidate_set = set(candidates);

        for predicate in [OverlapPredicate::PointInRange, OverlapPredicate::IntervalOverlap] {
            let result = match_records(&reference, &candidate_set, predicate);
            for m in &result.matches {
                for candidate in &m.candidates {
                    assert_eq!(candidate.site, m.reference.site);
                    assert!(predicate.matches(m.reference, candidate));
                }
                // Nothing was missed by the start-bound cut.
                let expected = candidate_set
                    .records
                    .iter()
                    .filter(|c| c.site == m.reference.site && predicate.matches(m.reference, c))
                    .count();
                assert_eq!(m.candidates.len(), expected);
            }
        }
    }

    #[test]
    fn reference_without_site_candidates_has_no_matches() {
        let reference = set(vec![record(2, "C3", None, at(10, 0), at(12, 0))]);
        let candidates = set(vec![record(2, "A1", Some("X"), at(10, 30), at(10, 45))]);
        let result = match_records(&reference, &candidates, OverlapPredicate::IntervalOverlap);
        assert!(result.matches[0].is_empty());
        assert_eq!(result.unmatched_count(), 1);
    }
}
