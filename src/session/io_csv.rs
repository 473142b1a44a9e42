// Primitives for reading CSV files.

use crate::session::{
    io_common::{make_default_id, parse_cell, trim_trailing_blanks},
    *,
};

/// Reads one ballot per row: voter id, voter name, then the movies in order.
pub fn read_csv_ballots(path: &str, source: &BallotSource) -> SessionResult<Vec<ParsedBallot>> {
    let default_id = make_default_id(path);
    let has_header = source.has_header.unwrap_or(true);
    let rdr = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let row_offset = usize::from(has_header);

    let mut res: Vec<ParsedBallot> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + row_offset + 1;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        ensure!(
            line.len() > 2,
            CsvLineTooShortSnafu {
                lineno,
                found: line.len(),
            }
        );
        let voter_id = match line.get(0).map(|s| s.trim()) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => default_id(lineno),
        };
        let voter_name = match line.get(1).map(|s| s.trim()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => voter_id.clone(),
        };

        let mut cells: Vec<String> = line.iter().skip(2).map(|s| s.to_string()).collect();
        trim_trailing_blanks(&mut cells);
        let choices: Vec<ParsedChoice> = cells.iter().map(|c| parse_cell(c)).collect();
        debug!(
            "read_csv_ballots: lineno: {:?} voter: {:?} choices: {:?}",
            lineno, voter_id, &choices
        );

        res.push(ParsedBallot {
            voter_id,
            voter_name,
            choices,
        });
    }
    Ok(res)
}
