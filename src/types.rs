use crate::util::{format_int, format_number};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

// ---------------------------------------------------------------------------
// Quality assessment
// ---------------------------------------------------------------------------

/// Per-column missing-value statistics. Native nulls and placeholder
/// strings ("n/a", "tbc", ...) are counted together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingStats {
    pub column: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub column: String,
    pub count: usize,
}

/// Duplicate counts by key class. Every count is group membership: each
/// record belonging to a group of two or more equal keys counts, including
/// the first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateStats {
    pub exact_row: usize,
    pub identifier: Option<usize>,
    pub titles: Vec<CategoryCount>,
    pub auxiliary_ids: Vec<CategoryCount>,
    pub total: usize,
    /// True when a manually verified title-duplicate count replaced the
    /// computed one (see `QualityOptions::title_duplicate_override`).
    pub title_override_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardAnalysis {
    pub negative_count: usize,
    pub zero_count: usize,
    pub mean: f64,
    pub median: f64,
    /// Values more than three standard deviations from the mean.
    pub outlier_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateAnalysis {
    pub column: String,
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
    pub outside_range_count: usize,
    pub unparseable_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityScore {
    pub completeness: f64,
    pub consistency: f64,
    pub overall: f64,
    pub grade: char,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub row_count: usize,
    pub column_count: usize,
    pub missing: Vec<MissingStats>,
    pub duplicates: DuplicateStats,
    pub awards: Option<AwardAnalysis>,
    pub dates: Vec<DateAnalysis>,
    pub score: QualityScore,
}

// ---------------------------------------------------------------------------
// Constituency rankings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstituencyStats {
    pub constituency: String,
    pub project_count: usize,
    pub total_funding: f64,
    /// 1-indexed rank by project count, descending.
    pub project_rank: usize,
    /// 1-indexed rank by total funding, descending.
    pub funding_rank: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstituencyRankings {
    /// One row per matched constituency, ordered by project count descending.
    pub stats: Vec<ConstituencyStats>,
    pub total_constituencies: usize,
    /// Matched-project counts per English region, when the lookup carries one.
    pub region_breakdown: Option<BTreeMap<String, usize>>,
    /// Matched-project counts per devolved administration, when present.
    pub devolved_breakdown: Option<BTreeMap<String, usize>>,
}

// ---------------------------------------------------------------------------
// Focus-entity analysis
// ---------------------------------------------------------------------------

/// Which matcher produced the focus selection. Anything past
/// `Constituency` is a reduced-confidence fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Constituency,
    PostcodePrefix,
    OrganisationSearch,
    Sample,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Constituency => write!(f, "parliamentary constituency"),
            MatchMethod::PostcodePrefix => write!(f, "postcode prefix"),
            MatchMethod::OrganisationSearch => write!(f, "organisation search"),
            MatchMethod::Sample => write!(f, "bounded sample"),
        }
    }
}

/// The focus entity's position in the adjusted ranking population: its
/// family's rows replaced by one combined synthetic row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusRanking {
    pub projects_rank: usize,
    pub funding_rank: usize,
    pub total_constituencies: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusAggregate {
    pub target: String,
    pub method: MatchMethod,
    pub project_count: usize,
    pub total_value: f64,
    pub mean_award: f64,
    pub median_award: f64,
    /// Projects per start year.
    pub yearly_trend: BTreeMap<i32, usize>,
    pub programme_mix: BTreeMap<String, usize>,
    pub status_dist: BTreeMap<String, usize>,
    pub ranking: Option<FocusRanking>,
}

// ---------------------------------------------------------------------------
// Success metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionStats {
    pub completed: usize,
    pub active: usize,
    /// completed / (completed + active) × 100.
    pub rate: f64,
}

/// Every metric is optional: when its columns are absent or its denominator
/// degenerate, the field is omitted rather than zeroed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuccessMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_completion: Option<CompletionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_completion: Option<CompletionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub programme_completion: Option<BTreeMap<String, CompletionStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_completed_award: Option<f64>,
    /// Mean award of completed projects over mean award of all projects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_project_duration_years: Option<f64>,
    /// Completion rate over projects started in the last three years.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_completion_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organisation_completion: Option<BTreeMap<String, CompletionStats>>,
}

// ---------------------------------------------------------------------------
// Presentation rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct RankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Constituency")]
    #[tabled(rename = "Constituency")]
    pub constituency: String,
    #[serde(rename = "Projects")]
    #[tabled(rename = "Projects")]
    pub projects: String,
    #[serde(rename = "TotalFunding")]
    #[tabled(rename = "TotalFunding")]
    pub total_funding: String,
    #[serde(rename = "FundingRank")]
    #[tabled(rename = "FundingRank")]
    pub funding_rank: usize,
}

impl From<&ConstituencyStats> for RankingRow {
    fn from(s: &ConstituencyStats) -> RankingRow {
        RankingRow {
            rank: s.project_rank,
            constituency: s.constituency.clone(),
            projects: format_int(s.project_count as i64),
            total_funding: format_number(s.total_funding, 2),
            funding_rank: s.funding_rank,
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct MissingValueRow {
    #[serde(rename = "Column")]
    #[tabled(rename = "Column")]
    pub column: String,
    #[serde(rename = "Missing")]
    #[tabled(rename = "Missing")]
    pub missing: String,
    #[serde(rename = "Percent")]
    #[tabled(rename = "Percent")]
    pub percent: String,
}

impl From<&MissingStats> for MissingValueRow {
    fn from(m: &MissingStats) -> MissingValueRow {
        MissingValueRow {
            column: m.column.clone(),
            missing: format_int(m.count as i64),
            percent: format_number(m.percentage, 2),
        }
    }
}
