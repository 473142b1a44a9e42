//! CSV export of a leaderboard.
//!
//! One row per movie, in leaderboard order: the catalog id (`none` for
//! unlisted movies), the title and the points.

use std::io;

use log::debug;
use serde::Serialize;
use snafu::prelude::*;

use crate::config::*;

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "tmdbID")]
    id: String,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Points")]
    points: u32,
}

pub fn write_csv<W: io::Write>(list: &DecadeList, writer: W) -> EngineResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if list.entries.is_empty() {
        // serde only writes the header along with the first row.
        wtr.write_record(["tmdbID", "Title", "Points"])
            .context(ExportSnafu {})?;
    }
    for entry in list.entries.iter() {
        wtr.serialize(ExportRow {
            id: entry.movie.external_id.to_string(),
            title: &entry.movie.title,
            points: entry.points,
        })
        .context(ExportSnafu {})?;
    }
    wtr.flush()
        .map_err(csv::Error::from)
        .context(ExportSnafu {})?;
    debug!("write_csv: {} rows for list {}", list.entries.len(), list.id);
    Ok(())
}

pub fn to_csv_string(list: &DecadeList) -> EngineResult<String> {
    let mut buffer: Vec<u8> = Vec::new();
    write_csv(list, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge_ballot;
    use crate::testing::*;

    #[test]
    fn rows_follow_the_leaderboard() {
        let mut list = DecadeList::new(ListId::new(1990, 0), "Nineties");
        let mut movies: Vec<MovieReference> = titles("a", 19).iter().map(|t| movie(t)).collect();
        movies.insert(1, MovieReference::unlisted("Lost, the reel", "Someone", 1994));
        let ballot = Ballot::from_movies(movies).unwrap();
        list.entries = merge_ballot(&list.entries, &ballot, "Ana");

        let text = to_csv_string(&list).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[0], "tmdbID,Title,Points");
        assert_eq!(lines[1], format!("{},a 1,20", catalog_id("a 1")));
        assert_eq!(lines[2], "none,\"Lost, the reel\",19");
        assert_eq!(lines[20], format!("{},a 19,1", catalog_id("a 19")));
    }

    #[test]
    fn empty_list_has_a_header() {
        let list = DecadeList::new(ListId::new(1990, 0), "Nineties");
        assert_eq!(to_csv_string(&list).unwrap(), "tmdbID,Title,Points\n");
    }
}
