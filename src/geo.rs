// Postcode-to-geography attribution. An exact-match left join after
// normalizing postcodes on both sides; rows with no match keep a null
// geography and are isolated by the downstream ranker.
use crate::table::{ColumnRoles, Table};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Geography {
    pub constituency: String,
    pub region: Option<String>,
    pub devolved_admin: Option<String>,
}

/// Trim and uppercase; the portfolio sheet carries postcodes in wildly
/// inconsistent casing.
pub fn normalize_postcode(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Reference mapping from normalized postcode to geography, built from the
/// lookup sheet. When the sheet lacks its required columns, the lookup is
/// empty and every join degrades to null geography instead of failing.
#[derive(Debug, Clone, Default)]
pub struct GeoLookup {
    map: HashMap<String, Geography>,
}

impl GeoLookup {
    pub fn empty() -> GeoLookup {
        GeoLookup::default()
    }

    pub fn from_table(table: &Table) -> GeoLookup {
        let headers = table.headers();
        let find = |keywords: &[&str]| {
            headers
                .iter()
                .position(|h| keywords.iter().any(|k| h.to_lowercase().contains(k)))
        };
        let postcode_col = find(&["postcode"]);
        let constituency_col = find(&["constituency"]);
        let devolved_col = find(&["devolved", "administration"]);
        let region_col = headers
            .iter()
            .enumerate()
            .find(|(i, h)| h.to_lowercase().contains("region") && Some(*i) != devolved_col)
            .map(|(i, _)| i);

        let (Some(pc), Some(cc)) = (postcode_col, constituency_col) else {
            log::warn!("geo lookup sheet lacks postcode/constituency columns; joins will be empty");
            return GeoLookup::empty();
        };

        let mut map = HashMap::new();
        for row in 0..table.n_rows() {
            let (Some(postcode), Some(constituency)) = (table.text(row, pc), table.text(row, cc))
            else {
                continue;
            };
            map.entry(normalize_postcode(postcode)).or_insert(Geography {
                constituency: constituency.to_string(),
                region: region_col.and_then(|c| table.text(row, c)).map(String::from),
                devolved_admin: devolved_col
                    .and_then(|c| table.text(row, c))
                    .map(String::from),
            });
        }
        GeoLookup { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn lookup(&self, postcode: &str) -> Option<&Geography> {
        self.map.get(&normalize_postcode(postcode))
    }
}

/// The project table with a geography attached to each row that matched.
/// Row indices line up with the source table.
#[derive(Debug, Clone)]
pub struct AttributedTable {
    geographies: Vec<Option<Geography>>,
    matched: usize,
}

impl AttributedTable {
    pub fn geo(&self, row: usize) -> Option<&Geography> {
        self.geographies.get(row).and_then(|g| g.as_ref())
    }

    pub fn n_rows(&self) -> usize {
        self.geographies.len()
    }

    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn unmatched(&self) -> usize {
        self.geographies.len() - self.matched
    }
}

/// Left-join the portfolio onto the lookup. Never fails: a missing
/// postcode column or an empty lookup yields an all-null attribution.
pub fn join(table: &Table, roles: &ColumnRoles, lookup: &GeoLookup) -> AttributedTable {
    let Some(pc) = roles.postcode else {
        log::warn!("portfolio has no postcode column; geographic attribution skipped");
        return AttributedTable {
            geographies: vec![None; table.n_rows()],
            matched: 0,
        };
    };

    let mut geographies = Vec::with_capacity(table.n_rows());
    let mut matched = 0usize;
    for row in 0..table.n_rows() {
        let geo = table
            .text(row, pc)
            .and_then(|p| lookup.lookup(p))
            .cloned();
        if geo.is_some() {
            matched += 1;
        }
        geographies.push(geo);
    }
    log::info!(
        "geo join: {} of {} rows matched a constituency",
        matched,
        table.n_rows()
    );
    AttributedTable { geographies, matched }
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

    fn lookup_table() -> Table {
        make_table(
            &["Postcodes", "Parliamentary Constituency", "English Region", "Devolved Administration"],
            &[
                &["SO17 1BJ", "Southampton, Test", "South East", "England"],
                &["SO14 0YG", "Southampton, Itchen", "South East", "England"],
                &["OX1 2JD", "Oxford West and Abingdon", "South East", "England"],
            ],
        )
    }

    #[test]
    fn join_is_case_and_whitespace_insensitive() {
        let projects = make_table(&["Postcode"], &[&["  so17 1bj "], &["OX1 2JD"], &["ZZ99 9ZZ"]]);
        let roles = ColumnRoles::resolve(projects.headers());
        let lookup = GeoLookup::from_table(&lookup_table());
        let attributed = join(&projects, &roles, &lookup);

        assert_eq!(attributed.matched(), 2);
        assert_eq!(attributed.unmatched(), 1);
        assert_eq!(
            attributed.geo(0).map(|g| g.constituency.as_str()),
            Some("Southampton, Test")
        );
        assert_eq!(attributed.geo(0).and_then(|g| g.region.as_deref()), Some("South East"));
        assert!(attributed.geo(2).is_none());
    }

    #[test]
    fn lookup_without_required_columns_is_empty() {
        let bad = make_table(&["Zip", "Area"], &[&["SO17 1BJ", "Southampton"]]);
        let lookup = GeoLookup::from_table(&bad);
        assert!(lookup.is_empty());
    }

    #[test]
    fn missing_postcode_column_degrades_to_null_geography() {
        let projects = make_table(&["Project_ID"], &[&["p1"], &["p2"]]);
        let roles = ColumnRoles::resolve(projects.headers());
        let lookup = GeoLookup::from_table(&lookup_table());
        let attributed = join(&projects, &roles, &lookup);
        assert_eq!(attributed.matched(), 0);
        assert!(attributed.geo(0).is_none());
    }

    #[test]
    fn first_lookup_row_wins_for_duplicate_postcodes() {
        let dup = make_table(
            &["Postcodes", "Parliamentary Constituency"],
            &[&["SO17 1BJ", "First"], &["SO17 1BJ", "Second"]],
        );
        let lookup = GeoLookup::from_table(&dup);
        assert_eq!(lookup.len(), 1);
        assert_eq!(
            lookup.lookup("so17 1bj").map(|g| g.constituency.as_str()),
            Some("First")
        );
    }
}
