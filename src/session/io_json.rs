// Ballots written as a JSON array.

use std::fs;

use serde::Deserialize;

use crate::session::*;

#[derive(Debug, Deserialize)]
struct JsonBallot {
    #[serde(rename = "voterId")]
    voter_id: String,
    #[serde(rename = "voterName")]
    voter_name: Option<String>,
    movies: Vec<ParsedChoice>,
}

pub fn read_json_ballots(path: &str) -> SessionResult<Vec<ParsedBallot>> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let ballots: Vec<JsonBallot> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_json_ballots: {} ballots in {}", ballots.len(), path);
    Ok(ballots
        .into_iter()
        .map(|b| ParsedBallot {
            voter_name: b
                .voter_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| b.voter_id.clone()),
            voter_id: b.voter_id,
            choices: b.movies,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ballots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ballots.json");
        fs::write(
            &path,
            r#"[
                {"voterId": "ana", "voterName": "Ana", "movies": [
                    {"title": "Heat"},
                    {"title": "Lost reel", "year": "1994", "director": "Someone"}
                ]},
                {"voterId": "bia", "movies": []}
            ]"#,
        )
        .unwrap();
        let ballots = read_json_ballots(&path.display().to_string()).unwrap();
        assert_eq!(ballots.len(), 2);
        assert_eq!(ballots[0].choices[1].year.as_deref(), Some("1994"));
        assert_eq!(ballots[1].voter_name, "bia");
    }

    #[test]
    fn malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ballots.json");
        fs::write(&path, r#"{"voterId": "ana"}"#).unwrap();
        let err = read_json_ballots(&path.display().to_string()).unwrap_err();
        assert!(matches!(err, SessionError::ParsingJson { .. }));
        let missing = dir.path().join("nope.json").display().to_string();
        assert!(matches!(
            read_json_ballots(&missing),
            Err(SessionError::OpeningJson { .. })
        ));
    }
}
