use crate::quality::QualityOptions;
use crate::rankings::FocusTarget;
use clap::Parser;
use std::path::PathBuf;

/// Data-quality assessment and constituency funding analysis for a funded
/// research portfolio.
#[derive(Debug, Parser)]
#[command(name = "portfolio_report", version)]
pub struct Args {
    /// Funded portfolio CSV export.
    #[arg(long, default_value = "funded_portfolio.csv")]
    pub portfolio: PathBuf,

    /// Postcode-to-geography lookup CSV export.
    #[arg(long, default_value = "geographical_lookups.csv")]
    pub lookup: PathBuf,

    /// Constituency selected for the combined focus analysis.
    #[arg(long, default_value = "Southampton, Test")]
    pub focus: String,

    /// Name fragment shared by the focus constituency's family; family rows
    /// are collapsed into one combined entry before re-ranking.
    #[arg(long, default_value = "Southampton")]
    pub focus_family: String,

    /// Postcode prefix for the first focus fallback matcher.
    #[arg(long, default_value = "SO")]
    pub focus_postcode_prefix: String,

    /// Organisation-name keyword for the second focus fallback matcher.
    #[arg(long, default_value = "southampton")]
    pub focus_org_keyword: String,

    /// Upper bound on the last-resort sample selection.
    #[arg(long, default_value_t = 240)]
    pub sample_cap: usize,

    /// Replace the computed title-duplicate count with a manually verified
    /// figure. Off by default; see DESIGN.md before reaching for this.
    #[arg(long)]
    pub verified_title_duplicates: Option<usize>,
}

impl Args {
    pub fn focus_target(&self) -> FocusTarget {
        FocusTarget {
            constituency: self.focus.clone(),
            family_pattern: self.focus_family.clone(),
            postcode_prefix: self.focus_postcode_prefix.clone(),
            org_keyword: self.focus_org_keyword.to_lowercase(),
            sample_cap: self.sample_cap,
        }
    }

    pub fn quality_options(&self) -> QualityOptions {
        QualityOptions {
            title_duplicate_override: self.verified_title_duplicates,
        }
    }
}
