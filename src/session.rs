use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use ballot_engine::builder::BallotBuilder;
use ballot_engine::export::write_csv;
use ballot_engine::lifecycle::ListManager;
use ballot_engine::resolver::{MovieCatalog, MovieResolver, StaticCatalog};
use ballot_engine::store::MemoryStore;
use ballot_engine::*;

use crate::session::config_reader::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_json;

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error formatting the summary"))]
    FormattingJson { source: serde_json::Error },
    #[snafu(display("The session file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Line {lineno}: could not read the CSV record"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno}: expected a voter id, a voter name and movies, found {found} columns"))]
    CsvLineTooShort { lineno: usize, found: usize },
    #[snafu(display("Provider not implemented {provider:?}"))]
    UnknownProvider { provider: String },
    #[snafu(display("Ballot of {voter_id}: {source}"))]
    InvalidBallot {
        voter_id: String,
        source: EngineError,
    },
    #[snafu(display("{source}"))]
    Engine { source: EngineError },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// A ballot as parsed by the readers, before its movies are resolved.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParsedBallot {
    pub voter_id: String,
    pub voter_name: String,
    pub choices: Vec<ParsedChoice>,
}

/// A movie as written in a ballot source. Year and director are only given
/// for movies missing from the catalog.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ParsedChoice {
    pub title: String,
    pub year: Option<String>,
    pub director: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SessionOptions {
    pub config_path: String,
    /// 'stdout' or a file path.
    pub out_path: Option<String>,
    pub csv_path: Option<String>,
    pub check_summary_path: Option<String>,
    pub force_close: bool,
}

fn read_ballot_source(root_path: &Path, source: &BallotSource) -> SessionResult<Vec<ParsedBallot>> {
    let p: PathBuf = root_path.join(&source.file_path);
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read ballot file {:?}", p2);
    match source.provider.as_str() {
        "csv" => io_csv::read_csv_ballots(&p2, source),
        "json" => io_json::read_json_ballots(&p2),
        x => UnknownProviderSnafu { provider: x }.fail(),
    }
}

/// Fills a ballot the way a voter would: every title is searched in the
/// catalog and a candidate picked, unless the movie comes with its year and
/// director, in which case it is declared as not found.
async fn resolve_ballot<C: MovieCatalog>(
    resolver: &MovieResolver<C>,
    decade: Decade,
    pb: &ParsedBallot,
) -> SessionResult<Ballot> {
    let voter_id = pb.voter_id.as_str();
    let mut builder = BallotBuilder::new(decade).context(InvalidBallotSnafu { voter_id })?;
    for (idx, choice) in pb.choices.iter().enumerate() {
        let rank = idx + 1;
        builder
            .enter_text(rank, &choice.title)
            .context(InvalidBallotSnafu { voter_id })?;
        if choice.title.trim().is_empty() {
            continue;
        }
        let resolved = match (&choice.year, &choice.director) {
            (Some(year), Some(director)) => builder.mark_not_found(rank, year, director),
            _ => {
                let candidates = resolver
                    .resolve_candidate(&choice.title, decade)
                    .await
                    .context(InvalidBallotSnafu { voter_id })?;
                match io_common::pick_candidate(&choice.title, &candidates) {
                    Some(c) => builder.select(rank, c),
                    None => whatever!(
                        "Ballot of {}: slot #{}: {} catalog movies of the {}s match {:?}",
                        voter_id,
                        rank,
                        candidates.len(),
                        decade,
                        choice.title
                    ),
                }
            }
        };
        resolved.context(InvalidBallotSnafu { voter_id })?;
    }
    builder.finish().context(InvalidBallotSnafu { voter_id })
}

async fn build_summary_js<C: MovieCatalog>(
    list: &DecadeList,
    ballots: usize,
    resolver: &MovieResolver<C>,
) -> SessionResult<JSValue> {
    let c = OutputConfig {
        list: list.id.to_string(),
        name: list.name.clone(),
        decade: list.decade,
        status: list.status,
        ballots,
    };
    let mut results: Vec<JSValue> = Vec::new();
    for (idx, entry) in list.entries.iter().enumerate() {
        let director = resolver
            .director_for(&entry.movie)
            .await
            .context(EngineSnafu {})?;
        results.push(json!({
            "place": idx + 1,
            "externalId": entry.movie.external_id,
            "title": entry.movie.title,
            "director": director,
            "points": entry.points,
            "voters": entry.attributions,
        }));
    }
    Ok(json!({ "config": c, "results": results }))
}

fn write_output(path: &Path, contents: &str) -> SessionResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context(WritingOutputSnafu {
            path: dir.display().to_string(),
        })?;
    }
    fs::write(path, contents).context(WritingOutputSnafu {
        path: path.display().to_string(),
    })
}

pub async fn run_session(options: &SessionOptions) -> SessionResult<()> {
    let config_p = Path::new(options.config_path.as_str());
    let config = read_session_config(&options.config_path)?;
    info!("config: {:?}", config.output_settings);
    let rules = config.engine_rules()?;

    if config.ballot_sources.is_empty() {
        whatever!("No ballot sources detected");
    }
    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let decade = config.output_settings.decade;
    let resolver = MovieResolver::new(StaticCatalog::new(config.catalog.clone()));
    let manager = ListManager::with_rules(MemoryStore::new(), rules);
    let list = manager
        .create_list(decade, &config.output_settings.list_name)
        .await
        .context(EngineSnafu {})?;

    let mut data: Vec<ParsedBallot> = Vec::new();
    for source in config.ballot_sources.iter() {
        let mut file_data = read_ballot_source(root_p, source)?;
        data.append(&mut file_data);
    }
    info!("Read {} ballots", data.len());

    for pb in data.iter() {
        let ballot = resolve_ballot(&resolver, decade, pb).await?;
        let voter = Voter::new(&pb.voter_id, &pb.voter_name);
        let voter_id = pb.voter_id.as_str();
        manager
            .enter_voting(&voter, decade)
            .await
            .context(InvalidBallotSnafu { voter_id })?;
        manager
            .submit_ballot(&voter, list.id, &ballot)
            .await
            .context(InvalidBallotSnafu { voter_id })?;
    }

    if options.force_close || config.output_settings.close_list.unwrap_or(false) {
        manager.close_list(list.id).await.context(EngineSnafu {})?;
    }
    let list = manager.list(list.id).await.context(EngineSnafu {})?;

    // Assemble the final json
    let result_js = build_summary_js(&list, data.len(), &resolver).await?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(FormattingJsonSnafu {})?;

    let output_dir = config
        .output_settings
        .output_directory
        .as_ref()
        .map(|d| root_p.join(d));
    match (options.out_path.as_deref(), output_dir.as_ref()) {
        (Some("stdout"), _) | (None, None) => println!("{}", pretty_js_stats),
        (Some(out), _) => write_output(Path::new(out), &pretty_js_stats)?,
        (None, Some(dir)) => {
            let out = dir.join(format!("{}_summary.json", list.id));
            write_output(&out, &pretty_js_stats)?;
            info!("Summary written to {:?}", out);
        }
    }

    if let Some(csv_path) = options.csv_path.as_ref() {
        let file = fs::File::create(csv_path).context(WritingOutputSnafu {
            path: csv_path.as_str(),
        })?;
        write_csv(&list, file).context(EngineSnafu {})?;
        debug!("Leaderboard written to {:?}", csv_path);
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = options.check_summary_path.as_ref() {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(FormattingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(())
}
