// Success metrics over the portfolio and the focus entity. Every metric
// carries its own preconditions (columns present, denominator non-zero);
// when they fail the metric is omitted, never zeroed or divided through.
use crate::table::{ColumnRoles, Table};
use crate::types::{CompletionStats, FocusAggregate, SuccessMetrics};
use crate::util::mean;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Trackable statuses: projects that have either finished or are underway.
/// Everything else (withdrawn, suspended, unknown) is outside the
/// completion-rate denominator.
fn is_completed(s: &str) -> bool {
    let t = s.trim();
    t.eq_ignore_ascii_case("completed") || t.eq_ignore_ascii_case("complete")
}

fn is_active(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("active")
}

fn completion_from_counts(completed: usize, active: usize) -> Option<CompletionStats> {
    let total = completed + active;
    (total > 0).then(|| CompletionStats {
        completed,
        active,
        rate: (completed as f64 / total as f64) * 100.0,
    })
}

/// Derive the full metric set. `as_of` anchors the recent-performance
/// window so repeated runs over the same inputs stay identical.
pub fn calculate(
    table: &Table,
    roles: &ColumnRoles,
    focus: Option<&FocusAggregate>,
    as_of: NaiveDate,
) -> SuccessMetrics {
    let mut metrics = SuccessMetrics::default();
    let rows = 0..table.n_rows();

    // 1. Completion rate, portfolio-wide and for the focus selection.
    if let Some(status_col) = roles.status {
        let mut completed = 0usize;
        let mut active = 0usize;
        for r in rows.clone() {
            match table.text(r, status_col) {
                Some(s) if is_completed(s) => completed += 1,
                Some(s) if is_active(s) => active += 1,
                _ => {}
            }
        }
        metrics.national_completion = completion_from_counts(completed, active);

        if let Some(focus) = focus {
            let completed = focus
                .status_dist
                .iter()
                .filter(|(s, _)| is_completed(s))
                .map(|(_, n)| n)
                .sum();
            let active = focus
                .status_dist
                .iter()
                .filter(|(s, _)| is_active(s))
                .map(|(_, n)| n)
                .sum();
            metrics.focus_completion = completion_from_counts(completed, active);
        }
    }

    // 2. Per-programme completion, for programmes with a trackable project.
    if let (Some(prog_col), Some(status_col)) = (roles.programme, roles.status) {
        let mut by_programme: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for r in rows.clone() {
            let (Some(programme), Some(status)) =
                (table.text(r, prog_col), table.text(r, status_col))
            else {
                continue;
            };
            let entry = by_programme.entry(programme.to_string()).or_default();
            if is_completed(status) {
                entry.0 += 1;
            } else if is_active(status) {
                entry.1 += 1;
            }
        }
        let qualifying: BTreeMap<String, CompletionStats> = by_programme
            .into_iter()
            .filter_map(|(name, (c, a))| completion_from_counts(c, a).map(|s| (name, s)))
            .collect();
        metrics.programme_completion = (!qualifying.is_empty()).then_some(qualifying);
    }

    // 3. Funding efficiency: completed-project mean over whole-portfolio mean.
    if let (Some(award_col), Some(status_col)) = (roles.award, roles.status) {
        let completed_awards: Vec<f64> = rows
            .clone()
            .filter(|&r| table.text(r, status_col).is_some_and(is_completed))
            .filter_map(|r| table.number(r, award_col))
            .collect();
        if !completed_awards.is_empty() {
            let avg_completed = mean(&completed_awards);
            metrics.avg_completed_award = Some(avg_completed);

            let all_awards: Vec<f64> =
                rows.clone().filter_map(|r| table.number(r, award_col)).collect();
            let avg_all = mean(&all_awards);
            if avg_all > 0.0 {
                metrics.funding_efficiency = Some(avg_completed / avg_all);
            }
        }
    }

    // 4. Mean duration of completed projects with both dates present.
    if let (Some(start_col), Some(end_col), Some(status_col)) =
        (roles.start_date, roles.end_date, roles.status)
    {
        let durations: Vec<f64> = rows
            .clone()
            .filter(|&r| table.text(r, status_col).is_some_and(is_completed))
            .filter_map(|r| {
                let start = table.date(r, start_col)?;
                let end = table.date(r, end_col)?;
                Some((end - start).num_days() as f64 / 365.25)
            })
            .collect();
        if !durations.is_empty() {
            metrics.avg_project_duration_years = Some(mean(&durations));
        }
    }

    // 5. Completion rate over projects started in the last three years.
    if let (Some(start_col), Some(status_col)) = (roles.start_date, roles.status) {
        let cutoff_year = as_of.year() - 3;
        let mut completed = 0usize;
        let mut active = 0usize;
        for r in rows.clone() {
            if !table
                .date(r, start_col)
                .is_some_and(|d| d.year() >= cutoff_year)
            {
                continue;
            }
            match table.text(r, status_col) {
                Some(s) if is_completed(s) => completed += 1,
                Some(s) if is_active(s) => active += 1,
                _ => {}
            }
        }
        metrics.recent_completion_rate = completion_from_counts(completed, active).map(|c| c.rate);
    }

    // 6. Per-organisation completion, restricted to organisations with a
    //    meaningful number of trackable projects.
    if let (Some(org_col), Some(status_col)) = (roles.organisation, roles.status) {
        const MIN_TRACKABLE: usize = 10;
        let mut by_org: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for r in rows {
            let (Some(org), Some(status)) = (table.text(r, org_col), table.text(r, status_col))
            else {
                continue;
            };
            let entry = by_org.entry(org.to_string()).or_default();
            if is_completed(status) {
                entry.0 += 1;
            } else if is_active(status) {
                entry.1 += 1;
            }
        }
        let qualifying: BTreeMap<String, CompletionStats> = by_org
            .into_iter()
            .filter(|(_, (c, a))| c + a >= MIN_TRACKABLE)
            .filter_map(|(name, (c, a))| completion_from_counts(c, a).map(|s| (name, s)))
            .collect();
        metrics.organisation_completion = (!qualifying.is_empty()).then_some(qualifying);
    }

    metrics
}
