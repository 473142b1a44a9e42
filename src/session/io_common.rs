use std::path::Path;

use ballot_engine::resolver::Candidate;

use crate::session::ParsedChoice;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Voter ids for rows that do not carry one: `<file name>-<line number>`.
pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// Reads a movie cell: either a title, or `title|year|director` for a movie
/// that is not in the catalog.
pub fn parse_cell(cell: &str) -> ParsedChoice {
    let parts: Vec<&str> = cell.split('|').map(|s| s.trim()).collect();
    match parts.as_slice() {
        [title, year, director] => ParsedChoice {
            title: title.to_string(),
            year: Some(year.to_string()),
            director: Some(director.to_string()),
        },
        _ => ParsedChoice {
            title: cell.trim().to_string(),
            year: None,
            director: None,
        },
    }
}

/// The candidate a title designates: the only one with exactly this title
/// (ignoring case), or else the only candidate found.
pub fn pick_candidate<'a>(text: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    let wanted = text.trim().to_lowercase();
    let exact: Vec<&'a Candidate> = candidates
        .iter()
        .filter(|c| c.title.trim().to_lowercase() == wanted)
        .collect();
    match (exact.as_slice(), candidates) {
        ([only], _) => Some(*only),
        ([], [only]) => Some(only),
        _ => None,
    }
}

/// Drops the empty cells at the end of a row.
pub fn trim_trailing_blanks(cells: &mut Vec<String>) {
    while cells.last().map(|c| c.trim().is_empty()).unwrap_or(false) {
        cells.pop();
    }
}
