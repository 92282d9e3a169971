// Composite data-quality assessment over the raw portfolio table.
//
// `assess` is a pure function of its inputs: malformed values degrade to
// missing counts instead of raising, and identical inputs always produce an
// identical report.
use crate::table::{ColumnRoles, Table, Value};
use crate::types::{
    AwardAnalysis, CategoryCount, DateAnalysis, DuplicateStats, MissingStats, QualityReport,
    QualityScore,
};
use crate::util::{mean, median, population_std};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Tokens recognized as missing once trimmed and lowercased, on top of
/// native nulls. The lowercase canon covers the case variants seen in the
/// source exports ("N/A", "Not Known", "TBC", ...).
static MISSING_PATTERNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "",
        "n/a",
        "na",
        "not available",
        "not known",
        "tbc",
        "to be confirmed",
        "unknown",
        ".",
        "-",
        "?",
        "null",
        "none",
    ]
    .into_iter()
    .collect()
});

/// Dates outside this window are counted as implausible.
static EXPECTED_DATE_MIN: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2011, 1, 1).unwrap());
static EXPECTED_DATE_MAX: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2030, 12, 31).unwrap());

const OUTLIER_Z_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Default)]
pub struct QualityOptions {
    /// Manually verified title-duplicate count. When set, it replaces the
    /// computed title figure and becomes the sole contributor to the
    /// reported duplicate total. Disabled by default; the discrepancy it
    /// papers over is documented in DESIGN.md.
    pub title_duplicate_override: Option<usize>,
}

fn is_missing(value: &Value) -> bool {
    match value.as_str() {
        None => true,
        Some(s) => MISSING_PATTERNS.contains(s.trim().to_lowercase().as_str()),
    }
}

/// Count every member of every group of two or more equal keys. A column
/// where all N values coincide yields N, not N-1.
fn duplicate_member_count<K, I>(keys: I) -> usize
where
    K: Eq + Hash,
    I: IntoIterator<Item = K>,
{
    let mut counts: HashMap<K, usize> = HashMap::new();
    for k in keys {
        *counts.entry(k).or_insert(0) += 1;
    }
    counts.values().filter(|c| **c >= 2).sum()
}

fn column_duplicates(table: &Table, col: usize) -> usize {
    // Non-null values only; nulls are a missingness finding, not a
    // duplication one.
    duplicate_member_count((0..table.n_rows()).filter_map(|r| table.text(r, col)))
}

fn assess_missing(table: &Table) -> Vec<MissingStats> {
    let rows = table.n_rows();
    table
        .headers()
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let count = (0..rows).filter(|&r| is_missing(table.cell(r, col))).count();
            let percentage = if rows == 0 {
                0.0
            } else {
                (count as f64 / rows as f64) * 100.0
            };
            MissingStats {
                column: header.clone(),
                count,
                percentage,
            }
        })
        .collect()
}

fn assess_duplicates(
    table: &Table,
    roles: &ColumnRoles,
    options: &QualityOptions,
) -> DuplicateStats {
    let exact_row = duplicate_member_count((0..table.n_rows()).map(|r| {
        (0..table.n_cols())
            .map(|c| table.text(r, c))
            .collect::<Vec<_>>()
    }));

    let identifier = roles.identifier.map(|col| column_duplicates(table, col));

    let category = |cols: &[usize]| -> Vec<CategoryCount> {
        cols.iter()
            .map(|&col| CategoryCount {
                column: table.headers()[col].clone(),
                count: column_duplicates(table, col),
            })
            .filter(|c| c.count > 0)
            .collect()
    };
    let mut titles = category(&roles.title_columns);
    let auxiliary_ids = category(&roles.auxiliary_id_columns);

    let mut total = exact_row
        + identifier.unwrap_or(0)
        + titles.iter().map(|c| c.count).sum::<usize>()
        + auxiliary_ids.iter().map(|c| c.count).sum::<usize>();

    let mut title_override_applied = false;
    if let (Some(verified), Some(title_col)) = (options.title_duplicate_override, roles.title) {
        log::warn!(
            "replacing computed title-duplicate count with verified value {}",
            verified
        );
        titles = vec![CategoryCount {
            column: table.headers()[title_col].clone(),
            count: verified,
        }];
        // The verified figure stands in for the whole total: titles are the
        // dominant duplicate class in this dataset.
        total = verified;
        title_override_applied = true;
    }

    DuplicateStats {
        exact_row,
        identifier,
        titles,
        auxiliary_ids,
        total,
        title_override_applied,
    }
}

fn assess_awards(table: &Table, roles: &ColumnRoles) -> Option<AwardAnalysis> {
    let col = roles.award?;
    let values: Vec<f64> = (0..table.n_rows())
        .filter_map(|r| table.number(r, col))
        .collect();

    let m = mean(&values);
    let std = population_std(&values, m);
    let outlier_count = if std > 0.0 {
        values
            .iter()
            .filter(|x| ((*x - m) / std).abs() > OUTLIER_Z_THRESHOLD)
            .count()
    } else {
        0
    };

    Some(AwardAnalysis {
        negative_count: values.iter().filter(|x| **x < 0.0).count(),
        zero_count: values.iter().filter(|x| **x == 0.0).count(),
        mean: m,
        median: median(values.clone()),
        outlier_count,
    })
}

fn assess_dates(table: &Table, roles: &ColumnRoles) -> Vec<DateAnalysis> {
    roles
        .date_columns
        .iter()
        .map(|&col| {
            let mut dates: Vec<NaiveDate> = Vec::new();
            let mut unparseable_count = 0usize;
            for r in 0..table.n_rows() {
                match table.text(r, col) {
                    None => {}
                    Some(_) => match table.date(r, col) {
                        Some(d) => dates.push(d),
                        None => unparseable_count += 1,
                    },
                }
            }
            let outside_range_count = dates
                .iter()
                .filter(|d| **d < *EXPECTED_DATE_MIN || **d > *EXPECTED_DATE_MAX)
                .count();
            DateAnalysis {
                column: table.headers()[col].clone(),
                min: dates.iter().min().copied(),
                max: dates.iter().max().copied(),
                outside_range_count,
                unparseable_count,
            }
        })
        .collect()
}

pub(crate) fn grade(overall: f64) -> char {
    if overall >= 90.0 {
        'A'
    } else if overall >= 80.0 {
        'B'
    } else if overall >= 70.0 {
        'C'
    } else {
        'D'
    }
}

/// Run the full assessment: missing values, duplicates, award anomalies,
/// date plausibility, and the composite completeness/consistency score.
pub fn assess(table: &Table, roles: &ColumnRoles, options: &QualityOptions) -> QualityReport {
    let rows = table.n_rows();
    let cols = table.n_cols();

    let missing = assess_missing(table);
    let duplicates = assess_duplicates(table, roles, options);
    let awards = assess_awards(table, roles);
    let dates = assess_dates(table, roles);

    let total_missing: usize = missing.iter().map(|m| m.count).sum();
    let completeness = if rows == 0 || cols == 0 {
        100.0
    } else {
        (100.0 - (total_missing as f64 / (rows * cols) as f64) * 100.0).max(0.0)
    };

    let consistency_issues = duplicates.total
        + awards.as_ref().map_or(0, |a| a.negative_count)
        + dates.iter().map(|d| d.outside_range_count).sum::<usize>();
    let consistency = if rows == 0 {
        100.0
    } else {
        (100.0 - (consistency_issues as f64 / rows as f64) * 100.0).max(0.0)
    };

    let overall = (completeness + consistency) / 2.0;

    QualityReport {
        row_count: rows,
        column_count: cols,
        missing,
        duplicates,
        awards,
        dates,
        score: QualityScore {
            completeness,
            consistency,
            overall,
            grade: grade(overall),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn make_table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(headers.iter().map(|s| s.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|s| Value::from_raw(s)).collect());
        }
        t
    }

    fn assess_default(table: &Table) -> QualityReport {
        let roles = ColumnRoles::resolve(table.headers());
        assess(table, &roles, &QualityOptions::default())
    }

    #[test]
    fn pattern_and_native_missing_are_combined() {
        let t = make_table(
            &["Project_Title"],
            &[&["n/a"], &["TBC"], &["Unknown"], &[""], &["real title"]],
        );
        let report = assess_default(&t);
        assert_eq!(report.missing[0].count, 4);
        assert_eq!(report.missing[0].percentage, 80.0);
    }

    #[test]
    fn missing_stats_stay_in_bounds() {
        let t = make_table(&["A", "B"], &[&["", ""], &["", ""], &["x", "-"]]);
        let report = assess_default(&t);
        for m in &report.missing {
            assert!(m.count <= report.row_count);
            assert!((0.0..=100.0).contains(&m.percentage));
        }
    }

    #[test]
    fn unique_column_has_zero_duplicates() {
        let t = make_table(&["Project_ID"], &[&["a"], &["b"], &["c"]]);
        let report = assess_default(&t);
        assert_eq!(report.duplicates.identifier, Some(0));
    }

    #[test]
    fn constant_column_duplicates_equal_row_count() {
        let t = make_table(&["Project_ID"], &[&["same"], &["same"], &["same"]]);
        let report = assess_default(&t);
        assert_eq!(report.duplicates.identifier, Some(3));
    }

    #[test]
    fn both_members_of_a_pair_count() {
        // Ten rows; the identifier repeats in rows 3 and 7.
        let ids = ["p0", "p1", "p2", "dup", "p4", "p5", "p6", "dup", "p8", "p9"];
        let rows: Vec<Vec<&str>> = ids.iter().map(|id| vec![*id]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let t = make_table(&["Project_ID"], &rows);
        let report = assess_default(&t);
        assert_eq!(report.duplicates.identifier, Some(2));
    }

    #[test]
    fn exact_row_duplicates_include_null_cells() {
        let t = make_table(
            &["A", "B"],
            &[&["x", ""], &["x", ""], &["y", "1"]],
        );
        let report = assess_default(&t);
        assert_eq!(report.duplicates.exact_row, 2);
    }

    #[test]
    fn award_scenario() {
        let t = make_table(
            &["Award_Amount"],
            &[&["100"], &["0"], &["-5"], &[""], &["50"]],
        );
        let report = assess_default(&t);
        let awards = report.awards.unwrap();
        assert_eq!(awards.negative_count, 1);
        assert_eq!(awards.zero_count, 1);
        // Mean over the four parseable values.
        assert!((awards.mean - 36.25).abs() < 1e-9);
        assert!((awards.median - 25.0).abs() < 1e-9);
        assert_eq!(awards.outlier_count, 0);
    }

    #[test]
    fn out_of_range_dates_are_counted() {
        let t = make_table(
            &["Start_Date"],
            &[&["2015-06-01"], &["1999-01-01"], &["2031-01-01"], &["garbage"]],
        );
        let report = assess_default(&t);
        let d = &report.dates[0];
        assert_eq!(d.outside_range_count, 2);
        assert_eq!(d.unparseable_count, 1);
        assert_eq!(d.min, NaiveDate::from_ymd_opt(1999, 1, 1));
        assert_eq!(d.max, NaiveDate::from_ymd_opt(2031, 1, 1));
    }

    #[test]
    fn grade_boundaries() {
        assert_eq!(grade(90.0), 'A');
        assert_eq!(grade(89.99), 'B');
        assert_eq!(grade(80.0), 'B');
        assert_eq!(grade(79.99), 'C');
        assert_eq!(grade(70.0), 'C');
        assert_eq!(grade(69.99), 'D');
    }

    #[test]
    fn scores_stay_in_bounds_on_dirty_data() {
        let t = make_table(
            &["Project_ID", "Award_Amount"],
            &[&["dup", "-1"], &["dup", "-2"], &["dup", "-3"]],
        );
        let report = assess_default(&t);
        assert!((0.0..=100.0).contains(&report.score.overall));
        assert!((0.0..=100.0).contains(&report.score.completeness));
        assert!((0.0..=100.0).contains(&report.score.consistency));
    }

    #[test]
    fn empty_table_scores_clean() {
        let t = make_table(&["Project_ID"], &[]);
        let report = assess_default(&t);
        assert_eq!(report.score.overall, 100.0);
        assert_eq!(report.score.grade, 'A');
    }

    #[test]
    fn title_override_becomes_sole_total() {
        let t = make_table(
            &["Project_Title"],
            &[&["alpha"], &["alpha"], &["beta"], &["beta"]],
        );
        let roles = ColumnRoles::resolve(t.headers());
        let options = QualityOptions {
            title_duplicate_override: Some(2066),
        };
        let report = assess(&t, &roles, &options);
        assert!(report.duplicates.title_override_applied);
        assert_eq!(report.duplicates.total, 2066);
        assert_eq!(report.duplicates.titles[0].count, 2066);
    }

    #[test]
    fn repeated_assessment_is_byte_identical() {
        let t = make_table(
            &["Project_ID", "Project_Title", "Award_Amount", "Start_Date"],
            &[
                &["p1", "study", "100", "2015-01-01"],
                &["p2", "study", "n/a", "2016-01-01"],
                &["p3", "", "250", "bad"],
            ],
        );
        let a = assess_default(&t);
        let b = assess_default(&t);
        let ja = serde_json::to_string(&a).unwrap();
        let jb = serde_json::to_string(&b).unwrap();
        assert_eq!(ja, jb);
    }
}
