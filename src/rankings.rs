// Constituency aggregation and the focus-entity analysis built on top of
// the geo join: project-count and funding rankings over every matched
// constituency, plus a combined view of one designated constituency ranked
// against an adjusted population.
use crate::geo::{normalize_postcode, AttributedTable};
use crate::table::{ColumnRoles, Table};
use crate::types::{
    ConstituencyRankings, ConstituencyStats, FocusAggregate, FocusRanking, MatchMethod,
};
use crate::util::{mean, median};
use chrono::Datelike;
use std::collections::BTreeMap;

/// Group matched rows by constituency and derive both rank orderings.
/// Returns `None` when the join produced zero matches; callers degrade to
/// the focus aggregator's fallback chain instead of failing.
pub fn rank(
    table: &Table,
    roles: &ColumnRoles,
    attributed: &AttributedTable,
) -> Option<ConstituencyRankings> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        funding: f64,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    let mut region_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut devolved_counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..attributed.n_rows() {
        let Some(geo) = attributed.geo(row) else {
            continue;
        };
        let acc = groups.entry(geo.constituency.clone()).or_default();
        acc.count += 1;
        if let Some(award) = roles.award.and_then(|c| table.number(row, c)) {
            acc.funding += award;
        }
        if let Some(region) = &geo.region {
            *region_counts.entry(region.clone()).or_insert(0) += 1;
        }
        if let Some(admin) = &geo.devolved_admin {
            *devolved_counts.entry(admin.clone()).or_insert(0) += 1;
        }
    }

    if groups.is_empty() {
        log::warn!("constituency ranking skipped: no rows matched the geo lookup");
        return None;
    }

    // Groups come out in lexicographic order; the stable descending sort
    // makes that the tie-break for equal counts.
    let mut stats: Vec<ConstituencyStats> = groups
        .into_iter()
        .map(|(constituency, acc)| ConstituencyStats {
            constituency,
            project_count: acc.count,
            total_funding: acc.funding,
            project_rank: 0,
            funding_rank: 0,
        })
        .collect();
    stats.sort_by(|a, b| b.project_count.cmp(&a.project_count));
    for (i, s) in stats.iter_mut().enumerate() {
        s.project_rank = i + 1;
    }

    let mut funding_order: Vec<usize> = (0..stats.len()).collect();
    funding_order.sort_by(|&a, &b| {
        stats[b]
            .total_funding
            .partial_cmp(&stats[a].total_funding)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (rank0, &idx) in funding_order.iter().enumerate() {
        stats[idx].funding_rank = rank0 + 1;
    }

    let total_constituencies = stats.len();
    Some(ConstituencyRankings {
        stats,
        total_constituencies,
        region_breakdown: (!region_counts.is_empty()).then_some(region_counts),
        devolved_breakdown: (!devolved_counts.is_empty()).then_some(devolved_counts),
    })
}

/// The designated focus entity and the knobs for its fallback matchers.
#[derive(Debug, Clone)]
pub struct FocusTarget {
    /// Exact constituency name for the primary selection.
    pub constituency: String,
    /// Name fragment identifying the whole constituency family; rows
    /// containing it are removed from the ranking population before the
    /// combined row is inserted.
    pub family_pattern: String,
    /// Postcode area for the first fallback (e.g. "SO").
    pub postcode_prefix: String,
    /// Lowercase keyword for the organisation-name fallback.
    pub org_keyword: String,
    /// Upper bound for the last-resort sample selection.
    pub sample_cap: usize,
}

impl Default for FocusTarget {
    fn default() -> FocusTarget {
        FocusTarget {
            constituency: "Southampton, Test".to_string(),
            family_pattern: "Southampton".to_string(),
            postcode_prefix: "SO".to_string(),
            org_keyword: "southampton".to_string(),
            sample_cap: 240,
        }
    }
}

/// Deterministic bounded selection: evenly strided row indices. Repeated
/// runs over the same table must agree, so no RNG here.
fn stride_sample(n: usize, cap: usize) -> Vec<usize> {
    if n == 0 || cap == 0 {
        return Vec::new();
    }
    if n <= cap {
        return (0..n).collect();
    }
    let step = n as f64 / cap as f64;
    (0..cap).map(|i| (i as f64 * step) as usize).collect()
}

/// Build the combined view of the focus entity. Matchers run in order of
/// confidence until one yields a non-empty selection; the winning method is
/// recorded on the result for auditability.
pub fn focus(
    table: &Table,
    roles: &ColumnRoles,
    attributed: &AttributedTable,
    target: &FocusTarget,
    rankings: Option<&ConstituencyRankings>,
) -> FocusAggregate {
    let by_constituency = || -> Vec<usize> {
        (0..attributed.n_rows())
            .filter(|&r| {
                attributed
                    .geo(r)
                    .is_some_and(|g| g.constituency == target.constituency)
            })
            .collect()
    };
    let by_postcode_prefix = || -> Vec<usize> {
        let Some(pc) = roles.postcode else {
            return Vec::new();
        };
        (0..table.n_rows())
            .filter(|&r| {
                table
                    .text(r, pc)
                    .is_some_and(|p| normalize_postcode(p).starts_with(&target.postcode_prefix))
            })
            .collect()
    };
    let by_organisation = || -> Vec<usize> {
        let Some(oc) = roles.organisation else {
            return Vec::new();
        };
        (0..table.n_rows())
            .filter(|&r| {
                table
                    .text(r, oc)
                    .is_some_and(|o| o.to_lowercase().contains(&target.org_keyword))
            })
            .collect()
    };
    let by_sample = || stride_sample(table.n_rows(), target.sample_cap);

    let matchers: [(MatchMethod, Box<dyn Fn() -> Vec<usize>>); 4] = [
        (MatchMethod::Constituency, Box::new(by_constituency)),
        (MatchMethod::PostcodePrefix, Box::new(by_postcode_prefix)),
        (MatchMethod::OrganisationSearch, Box::new(by_organisation)),
        (MatchMethod::Sample, Box::new(by_sample)),
    ];

    let (method, selection) = matchers
        .iter()
        .find_map(|(m, matcher)| {
            let sel = matcher();
            (!sel.is_empty()).then_some((*m, sel))
        })
        .unwrap_or((MatchMethod::Sample, Vec::new()));
    if method != MatchMethod::Constituency {
        log::warn!(
            "focus selection for '{}' fell back to {} ({} rows, reduced confidence)",
            target.constituency,
            method,
            selection.len()
        );
    }

    let awards: Vec<f64> = selection
        .iter()
        .filter_map(|&r| roles.award.and_then(|c| table.number(r, c)))
        .collect();
    let total_value: f64 = awards.iter().sum();

    let mut yearly_trend: BTreeMap<i32, usize> = BTreeMap::new();
    let start_col = roles.start_date.or_else(|| roles.date_columns.first().copied());
    if let Some(sc) = start_col {
        for &r in &selection {
            if let Some(d) = table.date(r, sc) {
                *yearly_trend.entry(d.year()).or_insert(0) += 1;
            }
        }
    }

    let count_values = |col: Option<usize>| -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if let Some(c) = col {
            for &r in &selection {
                if let Some(v) = table.text(r, c) {
                    *counts.entry(v.to_string()).or_insert(0) += 1;
                }
            }
        }
        counts
    };
    let programme_mix = count_values(roles.programme);
    let status_dist = count_values(roles.status);

    let ranking = match (rankings, selection.is_empty()) {
        (Some(rankings), false) => Some(adjusted_ranking(
            rankings,
            target,
            selection.len(),
            total_value,
        )),
        _ => None,
    };

    FocusAggregate {
        target: target.constituency.clone(),
        method,
        project_count: selection.len(),
        total_value,
        mean_award: mean(&awards),
        median_award: median(awards.clone()),
        yearly_trend,
        programme_mix,
        status_dist,
        ranking,
    }
}

/// Re-rank with the focus entity substituted for its family: drop every
/// row whose name contains the family pattern, insert one synthetic row
/// carrying the combined totals, and read off its positions.
fn adjusted_ranking(
    rankings: &ConstituencyRankings,
    target: &FocusTarget,
    project_count: usize,
    total_value: f64,
) -> FocusRanking {
    let mut population: Vec<(&str, usize, f64)> =
        vec![(target.constituency.as_str(), project_count, total_value)];
    population.extend(
        rankings
            .stats
            .iter()
            .filter(|s| !s.constituency.contains(&target.family_pattern))
            .map(|s| (s.constituency.as_str(), s.project_count, s.total_funding)),
    );

    let position_of_target = |sorted: &[(&str, usize, f64)]| {
        sorted
            .iter()
            .position(|e| e.0 == target.constituency)
            .map_or(sorted.len(), |i| i + 1)
    };

    let mut by_count = population.clone();
    by_count.sort_by(|a, b| b.1.cmp(&a.1));
    let projects_rank = position_of_target(&by_count);

    let mut by_funding = population;
    by_funding.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let funding_rank = position_of_target(&by_funding);

    FocusRanking {
        projects_rank,
        funding_rank,
        total_constituencies: by_funding.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{join, GeoLookup};
    use crate::table::Value;

    fn make_table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(headers.iter().map(|s| s.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|s| Value::from_raw(s)).collect());
        }
        t
    }

    fn lookup() -> GeoLookup {
        GeoLookup::from_table(&make_table(
            &["Postcodes", "Parliamentary Constituency"],
            &[
                &["SO17 1BJ", "Southampton, Test"],
                &["SO14 0YG", "Southampton, Itchen"],
                &["OX1 2JD", "Oxford West and Abingdon"],
                &["CB2 1TN", "Cambridge"],
            ],
        ))
    }

    fn project_row<'a>(postcode: &'a str, award: &'a str) -> Vec<&'a str> {
        vec![postcode, award]
    }

    fn ranked_fixture() -> (Table, ColumnRoles, AttributedTable) {
        // Southampton, Test: 3 projects, £300. Oxford: 2 projects, £2,000.
        // Cambridge: 1 project, £50. Itchen: 1 project, £10.
        let rows: Vec<Vec<&str>> = vec![
            project_row("SO17 1BJ", "100"),
            project_row("SO17 1BJ", "100"),
            project_row("SO17 1BJ", "100"),
            project_row("OX1 2JD", "1000"),
            project_row("OX1 2JD", "1000"),
            project_row("CB2 1TN", "50"),
            project_row("SO14 0YG", "10"),
            project_row("ZZ99 9ZZ", "999"),
        ];
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let table = make_table(&["Postcode", "Award_Amount"], &rows);
        let roles = ColumnRoles::resolve(table.headers());
        let attributed = join(&table, &roles, &lookup());
        (table, roles, attributed)
    }

    #[test]
    fn count_and_funding_ranks_are_independent() {
        let (table, roles, attributed) = ranked_fixture();
        let rankings = rank(&table, &roles, &attributed).unwrap();

        let by_name = |name: &str| {
            rankings
                .stats
                .iter()
                .find(|s| s.constituency == name)
                .unwrap()
        };
        assert_eq!(by_name("Southampton, Test").project_rank, 1);
        assert_eq!(by_name("Oxford West and Abingdon").project_rank, 2);
        assert_eq!(by_name("Oxford West and Abingdon").funding_rank, 1);
        assert_eq!(by_name("Southampton, Test").funding_rank, 2);
    }

    #[test]
    fn ranks_are_a_permutation() {
        let (table, roles, attributed) = ranked_fixture();
        let rankings = rank(&table, &roles, &attributed).unwrap();
        let n = rankings.total_constituencies;

        let mut project_ranks: Vec<usize> =
            rankings.stats.iter().map(|s| s.project_rank).collect();
        let mut funding_ranks: Vec<usize> =
            rankings.stats.iter().map(|s| s.funding_rank).collect();
        project_ranks.sort();
        funding_ranks.sort();
        assert_eq!(project_ranks, (1..=n).collect::<Vec<_>>());
        assert_eq!(funding_ranks, (1..=n).collect::<Vec<_>>());
    }

    #[test]
    fn ranking_is_idempotent() {
        let (table, roles, attributed) = ranked_fixture();
        let a = rank(&table, &roles, &attributed).unwrap();
        let b = rank(&table, &roles, &attributed).unwrap();
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn empty_join_yields_none() {
        let table = make_table(&["Postcode", "Award_Amount"], &[&["ZZ99 9ZZ", "5"]]);
        let roles = ColumnRoles::resolve(table.headers());
        let attributed = join(&table, &roles, &lookup());
        assert!(rank(&table, &roles, &attributed).is_none());
    }

    #[test]
    fn focus_selects_exact_constituency_only() {
        let (table, roles, attributed) = ranked_fixture();
        let rankings = rank(&table, &roles, &attributed);
        let agg = focus(
            &table,
            &roles,
            &attributed,
            &FocusTarget::default(),
            rankings.as_ref(),
        );
        assert_eq!(agg.method, MatchMethod::Constituency);
        // Itchen's row is not swept in by the exact match.
        assert_eq!(agg.project_count, 3);
        assert_eq!(agg.total_value, 300.0);
        assert_eq!(agg.mean_award, 100.0);
        assert_eq!(agg.median_award, 100.0);
    }

    #[test]
    fn adjusted_population_size_holds() {
        let (table, roles, attributed) = ranked_fixture();
        let rankings = rank(&table, &roles, &attributed).unwrap();
        let agg = focus(
            &table,
            &roles,
            &attributed,
            &FocusTarget::default(),
            Some(&rankings),
        );
        let ranking = agg.ranking.unwrap();
        // 4 constituencies − 2 Southampton rows + 1 combined row.
        assert_eq!(ranking.total_constituencies, 3);
        assert!(ranking.projects_rank <= 3);
        assert!(ranking.funding_rank <= 3);
        assert_eq!(ranking.projects_rank, 1);
        // Oxford's £2,000 outranks the combined £300.
        assert_eq!(ranking.funding_rank, 2);
    }

    #[test]
    fn falls_back_to_postcode_prefix() {
        let table = make_table(
            &["Postcode", "Award_Amount"],
            &[&["SO99 1AA", "10"], &["OX1 2JD", "20"]],
        );
        let roles = ColumnRoles::resolve(table.headers());
        // Empty lookup: no constituency attribution at all.
        let attributed = join(&table, &roles, &GeoLookup::empty());
        let agg = focus(&table, &roles, &attributed, &FocusTarget::default(), None);
        assert_eq!(agg.method, MatchMethod::PostcodePrefix);
        assert_eq!(agg.project_count, 1);
        assert!(agg.ranking.is_none());
    }

    #[test]
    fn falls_back_to_organisation_search() {
        let table = make_table(
            &["Lead_Organisation", "Award_Amount"],
            &[
                &["University of Southampton", "10"],
                &["University of Oxford", "20"],
            ],
        );
        let roles = ColumnRoles::resolve(table.headers());
        let attributed = join(&table, &roles, &GeoLookup::empty());
        let agg = focus(&table, &roles, &attributed, &FocusTarget::default(), None);
        assert_eq!(agg.method, MatchMethod::OrganisationSearch);
        assert_eq!(agg.project_count, 1);
    }

    #[test]
    fn last_resort_sample_is_bounded_and_deterministic() {
        let rows: Vec<Vec<String>> = (0..1000).map(|i| vec![format!("{}", i)]).collect();
        let mut table = Table::new(vec!["Value_Column".to_string()]);
        for row in &rows {
            table.push_row(row.iter().map(|s| Value::from_raw(s)).collect());
        }
        let roles = ColumnRoles::resolve(table.headers());
        let attributed = join(&table, &roles, &GeoLookup::empty());
        let a = focus(&table, &roles, &attributed, &FocusTarget::default(), None);
        let b = focus(&table, &roles, &attributed, &FocusTarget::default(), None);
        assert_eq!(a.method, MatchMethod::Sample);
        assert_eq!(a.project_count, 240);
        assert_eq!(a.project_count, b.project_count);
        assert_eq!(a.total_value, b.total_value);
    }

    #[test]
    fn focus_trend_and_mix_come_from_selection() {
        let table = make_table(
            &["Postcode", "Programme", "Project_Status", "Start_Date"],
            &[
                &["SO17 1BJ", "Training", "Active", "2020-01-01"],
                &["SO17 1BJ", "Training", "Completed", "2020-06-01"],
                &["SO17 1BJ", "Research", "Completed", "2021-03-01"],
                &["OX1 2JD", "Research", "Active", "2021-04-01"],
            ],
        );
        let roles = ColumnRoles::resolve(table.headers());
        let attributed = join(&table, &roles, &lookup());
        let agg = focus(&table, &roles, &attributed, &FocusTarget::default(), None);
        assert_eq!(agg.project_count, 3);
        assert_eq!(agg.yearly_trend.get(&2020), Some(&2));
        assert_eq!(agg.yearly_trend.get(&2021), Some(&1));
        assert_eq!(agg.programme_mix.get("Training"), Some(&2));
        assert_eq!(agg.status_dist.get("Completed"), Some(&2));
    }
}
