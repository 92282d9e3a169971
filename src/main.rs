// Entry point and high-level CLI flow.
//
// The binary wraps the analysis engine in a small interactive loop:
// - Option [1] loads the portfolio and geography CSVs, printing diagnostics.
// - Option [2] runs the full analysis and exports the reports.
// - After generating reports, the user can choose to go back to the
//   selection menu or exit.
//
// The engine itself holds no cache: option [2] recomputes everything from
// the loaded tables, and reloading via option [1] is the explicit
// invalidate-and-recompute path.
mod cli;
mod geo;
mod loader;
mod metrics;
mod output;
mod quality;
mod rankings;
mod table;
mod types;
mod util;

use clap::Parser;
use geo::GeoLookup;
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::sync::Mutex;
use table::{ColumnRoles, Table};
use types::{MissingValueRow, RankingRow};

// Simple in-memory app state so we only load the CSVs once but can
// generate reports multiple times in a single run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct LoadedData {
    projects: Table,
    roles: ColumnRoles,
    lookup: GeoLookup,
}

struct AppState {
    data: Option<std::sync::Arc<LoadedData>>,
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask the user whether to go back to the report selection menu after
/// generating reports.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        let resp = buf.trim().to_uppercase();
        match resp.as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load the portfolio and the geography lookup.
///
/// A missing portfolio is fatal for the load; a missing or malformed lookup
/// degrades to an empty one so the analysis can still run with fallback
/// matching.
fn handle_load(args: &cli::Args) {
    let (projects, report) = match loader::load_table(&args.portfolio) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load portfolio: {}\n", e);
            return;
        }
    };
    let roles = ColumnRoles::resolve(projects.headers());

    let lookup = match loader::load_table(&args.lookup) {
        Ok((geo_table, _)) => GeoLookup::from_table(&geo_table),
        Err(e) => {
            log::warn!("geography lookup unavailable ({}); continuing without it", e);
            GeoLookup::empty()
        }
    };

    println!(
        "Processing dataset... ({} rows loaded, {} columns)",
        util::format_int(report.rows as i64),
        util::format_int(projects.n_cols() as i64)
    );
    if report.skipped > 0 {
        println!(
            "Note: {} rows skipped due to parse errors.",
            util::format_int(report.skipped as i64)
        );
    }
    println!(
        "Geography lookup: {} postcodes.\n",
        util::format_int(lookup.len() as i64)
    );

    let mut state = APP_STATE.lock().unwrap();
    state.data = Some(std::sync::Arc::new(LoadedData {
        projects,
        roles,
        lookup,
    }));
}

/// Handle option [2]: run the whole pipeline and export every report.
///
/// This function is intentionally side-effectful:
/// - writes the quality report and focus analysis as JSON,
/// - writes the constituency ranking as CSV,
/// - and prints Markdown previews to the console.
fn handle_generate_reports(args: &cli::Args) {
    let data = {
        let state = APP_STATE.lock().unwrap();
        state.data.clone()
    };
    let Some(data) = data else {
        println!("Error: No data loaded. Please load the CSV files first (option 1).\n");
        return;
    };

    println!("Generating reports...");
    println!("Outputs saved to individual files...\n");

    // Report 1: data quality.
    let quality_report = quality::assess(&data.projects, &data.roles, &args.quality_options());
    let file1 = "report1_data_quality.json";
    if let Err(e) = output::write_json(file1, &quality_report) {
        eprintln!("Write error: {}", e);
    }
    println!("Report 1: Data Quality Assessment\n");
    let score = &quality_report.score;
    println!(
        "Overall {}% (grade {}): completeness {}%, consistency {}%",
        util::format_number(score.overall, 1),
        score.grade,
        util::format_number(score.completeness, 1),
        util::format_number(score.consistency, 1)
    );
    println!(
        "Duplicates: {} across all key classes. Missing values by column:\n",
        util::format_int(quality_report.duplicates.total as i64)
    );
    let missing_rows: Vec<MissingValueRow> =
        quality_report.missing.iter().map(MissingValueRow::from).collect();
    output::preview_table_rows(&missing_rows, 10);
    println!("(Full report exported to {})\n", file1);

    // Report 2: constituency rankings.
    let attributed = geo::join(&data.projects, &data.roles, &data.lookup);
    let constituency_rankings = rankings::rank(&data.projects, &data.roles, &attributed);
    println!("Report 2: Constituency Funding Rankings\n");
    match &constituency_rankings {
        Some(rankings) => {
            let rows: Vec<RankingRow> = rankings.stats.iter().map(RankingRow::from).collect();
            let file2 = "report2_constituency_rankings.csv";
            if let Err(e) = output::write_csv(file2, &rows) {
                eprintln!("Write error: {}", e);
            }
            println!(
                "({} constituencies, {} of {} projects matched)\n",
                util::format_int(rankings.total_constituencies as i64),
                util::format_int(attributed.matched() as i64),
                util::format_int(attributed.n_rows() as i64)
            );
            output::preview_table_rows(&rows, 10);
            println!("(Full table exported to {})\n", file2);
        }
        None => println!("(no projects matched the geography lookup)\n"),
    }

    // Report 3: focus-entity analysis.
    let target = args.focus_target();
    let focus = rankings::focus(
        &data.projects,
        &data.roles,
        &attributed,
        &target,
        constituency_rankings.as_ref(),
    );
    let file3 = "report3_focus_analysis.json";
    if let Err(e) = output::write_json(file3, &focus) {
        eprintln!("Write error: {}", e);
    }
    println!("Report 3: Focus Analysis for {}\n", focus.target);
    println!(
        "{} projects, £{} total (mean £{}, median £{}) via {}",
        util::format_int(focus.project_count as i64),
        util::format_number(focus.total_value, 2),
        util::format_number(focus.mean_award, 2),
        util::format_number(focus.median_award, 2),
        focus.method
    );
    if let Some(ranking) = &focus.ranking {
        println!(
            "Adjusted ranking: #{} by projects, #{} by funding, of {} constituencies",
            ranking.projects_rank, ranking.funding_rank, ranking.total_constituencies
        );
    }
    println!("(Full analysis exported to {})\n", file3);

    // Summary: success metrics.
    let as_of = chrono::Local::now().date_naive();
    let summary = metrics::calculate(&data.projects, &data.roles, Some(&focus), as_of);
    if let Err(e) = output::write_json("summary.json", &summary) {
        eprintln!("Write error: {}", e);
    }
    println!("Summary Stats (summary.json):");
    if let Some(c) = &summary.national_completion {
        println!(
            "National completion rate: {}% ({} completed, {} active)",
            util::format_number(c.rate, 1),
            util::format_int(c.completed as i64),
            util::format_int(c.active as i64)
        );
    }
    if let Some(c) = &summary.focus_completion {
        println!("Focus completion rate: {}%", util::format_number(c.rate, 1));
    }
    if let Some(e) = summary.funding_efficiency {
        println!("Funding efficiency: {}", util::format_number(e, 2));
    }
    println!();
}

fn main() {
    env_logger::init();
    let args = cli::Args::parse();
    loop {
        println!("Select an option:");
        println!("[1] Load the portfolio");
        println!("[2] Generate Reports\n");
        match read_choice().as_str() {
            "1" => {
                handle_load(&args);
            }
            "2" => {
                println!();
                handle_generate_reports(&args);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1 or 2.\n");
            }
        }
    }
}
