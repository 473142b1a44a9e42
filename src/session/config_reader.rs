use crate::session::*;

use ballot_engine::resolver::CatalogMovie;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "listName")]
    pub list_name: String,
    pub decade: Decade,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "closeList")]
    pub close_list: Option<bool>,
}

/// The `config` section of the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub list: String,
    pub name: String,
    pub decade: Decade,
    pub status: ListStatus,
    pub ballots: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// CSV only: whether the first row holds the column names. Defaults to true.
    #[serde(rename = "hasHeader")]
    pub has_header: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesSettings {
    #[serde(rename = "maxMergeAttempts")]
    pub max_merge_attempts: Option<u32>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<usize>,
    #[serde(rename = "earliestDecade")]
    pub earliest_decade: Option<Decade>,
    #[serde(rename = "latestDecade")]
    pub latest_decade: Option<Decade>,
}

impl RulesSettings {
    pub fn engine_rules(&self) -> SessionResult<EngineRules> {
        let defaults = EngineRules::DEFAULT_RULES;
        let max_merge_attempts = match self.max_merge_attempts {
            Some(0) => whatever!("maxMergeAttempts must be at least 1"),
            Some(x) => x,
            None => defaults.max_merge_attempts,
        };
        let page_size = match self.page_size {
            Some(0) => whatever!("pageSize must be at least 1"),
            Some(x) => x,
            None => defaults.page_size,
        };
        let rules = EngineRules {
            max_merge_attempts,
            page_size,
            earliest_decade: self.earliest_decade.unwrap_or(defaults.earliest_decade),
            latest_decade: self.latest_decade.or(defaults.latest_decade),
        };
        if let Some(latest) = rules.latest_decade {
            if latest < rules.earliest_decade {
                whatever!(
                    "latestDecade {} comes before earliestDecade {}",
                    latest,
                    rules.earliest_decade
                )
            }
        }
        Ok(rules)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub catalog: Vec<CatalogMovie>,
    #[serde(rename = "ballotSources")]
    pub ballot_sources: Vec<BallotSource>,
    pub rules: Option<RulesSettings>,
}

impl SessionConfig {
    pub fn engine_rules(&self) -> SessionResult<EngineRules> {
        self.rules.clone().unwrap_or_default().engine_rules()
    }
}

pub fn read_session_config(path: &str) -> SessionResult<SessionConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

pub fn read_summary(path: &str) -> SessionResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!(
        "read_summary: {} results in {}",
        js["results"].as_array().map(|a| a.len()).unwrap_or(0),
        path
    );
    Ok(js)
}
