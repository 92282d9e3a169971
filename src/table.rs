// In-memory tabular model shared by every analysis stage.
//
// Cells are kept as raw text the way they arrived from the export; typed
// views (numbers, dates) are derived on demand through the permissive
// parsers in `util`. An unparseable cell degrades to `None` at the point of
// use and is counted as missing by whichever analysis asked for it.
use crate::util::{parse_date_safe, parse_f64_safe};
use chrono::NaiveDate;

/// A single cell. `Null` covers cells that were empty in the source file;
/// placeholder strings like "n/a" stay `Text` and are classified later by
/// the quality assessor's pattern registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
}

impl Value {
    pub fn from_raw(s: &str) -> Value {
        let t = s.trim();
        if t.is_empty() {
            Value::Null
        } else {
            Value::Text(t.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.as_str()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Row-major table with named columns. The portfolio is a few thousand rows
/// of short strings, so the whole thing lives comfortably in memory for the
/// duration of an analysis run.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Table {
        Table {
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating to the header width so ragged
    /// exports cannot knock later columns out of alignment.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.headers.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.rows[row][col].as_str()
    }

    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        parse_f64_safe(self.text(row, col))
    }

    pub fn date(&self, row: usize, col: usize) -> Option<NaiveDate> {
        parse_date_safe(self.text(row, col))
    }
}

/// Columns whose repetition is semantically valid; they never participate
/// in duplicate detection even when their headers look id- or title-like.
const EXCLUDED_FIELDS: &[&str] = &[
    "project_status",
    "status",
    "postcode",
    "postal_code",
    "zip_code",
    "region",
    "area",
    "location",
    "programme_type",
    "category",
    "type",
];

fn header_matches(header: &str, keywords: &[&str]) -> bool {
    let h = header.to_lowercase();
    keywords.iter().any(|k| h.contains(k))
}

fn is_excluded(header: &str) -> bool {
    EXCLUDED_FIELDS.contains(&header.to_lowercase().as_str())
}

/// Column-role mapping, resolved exactly once from the header row when a
/// table is loaded. Every downstream analysis addresses columns through
/// these indices; an absent role means the dependent facet is skipped.
#[derive(Debug, Clone, Default)]
pub struct ColumnRoles {
    pub identifier: Option<usize>,
    pub title: Option<usize>,
    pub programme: Option<usize>,
    pub status: Option<usize>,
    pub award: Option<usize>,
    pub start_date: Option<usize>,
    pub end_date: Option<usize>,
    pub postcode: Option<usize>,
    pub organisation: Option<usize>,
    pub region: Option<usize>,
    pub devolved_admin: Option<usize>,
    /// Every column whose header mentions a date, in header order.
    pub date_columns: Vec<usize>,
    /// Project title/name columns eligible for duplicate detection.
    pub title_columns: Vec<usize>,
    /// Secondary id/reference/code columns, excluding the primary
    /// identifier and the excluded-field list.
    pub auxiliary_id_columns: Vec<usize>,
}

impl ColumnRoles {
    pub fn resolve(headers: &[String]) -> ColumnRoles {
        let mut roles = ColumnRoles::default();
        let find = |keywords: &[&str]| {
            headers
                .iter()
                .position(|h| header_matches(h, keywords))
        };

        roles.postcode = find(&["postcode"]);
        roles.status = find(&["status"]);
        roles.award = find(&["award", "amount"]);
        roles.programme = find(&["programme", "program"]);
        roles.organisation = find(&["organisation", "organization", "lead"]);
        roles.devolved_admin = find(&["devolved", "administration"]);
        // "Devolved Administration" must not also claim the region role.
        roles.region = headers
            .iter()
            .enumerate()
            .find(|(i, h)| header_matches(h, &["region"]) && Some(*i) != roles.devolved_admin)
            .map(|(i, _)| i);

        for (idx, header) in headers.iter().enumerate() {
            let h = header.to_lowercase();
            if h.contains("date") {
                roles.date_columns.push(idx);
                if h.contains("start") && roles.start_date.is_none() {
                    roles.start_date = Some(idx);
                }
                if h.contains("end") && roles.end_date.is_none() {
                    roles.end_date = Some(idx);
                }
            }
            if (h.contains("title") || h.contains("name"))
                && h.contains("project")
                && !is_excluded(header)
            {
                roles.title_columns.push(idx);
            }
        }
        roles.title = roles.title_columns.first().copied();

        // Primary identifier: a project id column if one exists, otherwise
        // the first id-like header outside the excluded list.
        roles.identifier = headers
            .iter()
            .position(|h| {
                let h = h.to_lowercase();
                h.contains("project") && h.contains("id")
            })
            .or_else(|| {
                headers.iter().position(|h| {
                    header_matches(h, &["id", "reference"]) && !is_excluded(h)
                })
            });

        for (idx, header) in headers.iter().enumerate() {
            if Some(idx) == roles.identifier || is_excluded(header) {
                continue;
            }
            if roles.title_columns.contains(&idx) {
                continue;
            }
            if header_matches(header, &["reference", "number", "code"])
                || header.to_lowercase().split(['_', ' ']).any(|w| w == "id")
            {
                roles.auxiliary_id_columns.push(idx);
            }
        }

        roles
    }
}
