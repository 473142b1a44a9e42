// ********* Ballot data structures ***********

use std::fmt::Display;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::prelude::*;

/// Number of ranked slots on every ballot.
pub const BALLOT_SIZE: usize = 20;

/// The textual sentinel stored in place of a catalog id for unlisted movies.
pub const UNLISTED_ID: &str = "none";

/// The first year of a decade (1990 for the nineties).
pub type Decade = u16;

/// A stable identifier in the external movie catalog.
pub type CatalogId = u64;

/// How a movie is identified.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ExternalId {
    /// A movie known to the catalog.
    Catalog(CatalogId),
    /// A movie the voter could not find in the catalog.
    /// Director and year are then supplied by the voter.
    Unlisted,
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalId::Catalog(id) => write!(f, "{}", id),
            ExternalId::Unlisted => write!(f, "{}", UNLISTED_ID),
        }
    }
}

impl Serialize for ExternalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExternalId::Catalog(id) => serializer.serialize_u64(*id),
            ExternalId::Unlisted => serializer.serialize_str(UNLISTED_ID),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExternalId {
    Id(u64),
    Label(String),
}

impl<'de> Deserialize<'de> for ExternalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawExternalId::deserialize(deserializer)? {
            RawExternalId::Id(id) => Ok(ExternalId::Catalog(id)),
            RawExternalId::Label(s) if s == UNLISTED_ID => Ok(ExternalId::Unlisted),
            RawExternalId::Label(s) => Err(serde::de::Error::custom(format!(
                "unknown external id {:?}",
                s
            ))),
        }
    }
}

/// A movie, as it appears on a ballot and on a leaderboard.
///
/// Catalog movies only carry their id and title: the director is looked up
/// from the catalog when results are displayed. Unlisted movies carry the
/// director and year typed by the voter.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MovieReference {
    #[serde(rename = "externalId")]
    pub external_id: ExternalId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

impl MovieReference {
    pub fn catalog(id: CatalogId, title: &str) -> MovieReference {
        MovieReference {
            external_id: ExternalId::Catalog(id),
            title: title.to_string(),
            director: None,
            year: None,
        }
    }

    /// Builds an unlisted movie. No validation happens here, see
    /// `resolver::unlisted_movie` for the checked version.
    pub fn unlisted(title: &str, director: &str, year: u16) -> MovieReference {
        MovieReference {
            external_id: ExternalId::Unlisted,
            title: title.to_string(),
            director: Some(director.to_string()),
            year: Some(year),
        }
    }

    pub fn is_unlisted(&self) -> bool {
        self.external_id == ExternalId::Unlisted
    }

    /// Checks the invariants between the id and the manual fields.
    pub fn check(&self) -> EngineResult<()> {
        ensure!(
            !self.title.trim().is_empty(),
            InvalidMovieSnafu {
                title: self.title.clone(),
                reason: "the title is empty",
            }
        );
        match self.external_id {
            ExternalId::Catalog(_) => {
                ensure!(
                    self.director.is_none() && self.year.is_none(),
                    InvalidMovieSnafu {
                        title: self.title.clone(),
                        reason: "catalog movies do not store a director or a year",
                    }
                );
            }
            ExternalId::Unlisted => {
                let has_director = self
                    .director
                    .as_deref()
                    .map(|d| !d.trim().is_empty())
                    .unwrap_or(false);
                ensure!(
                    has_director,
                    MissingDirectorSnafu {
                        title: self.title.clone()
                    }
                );
                ensure!(
                    self.year.is_some(),
                    InvalidMovieSnafu {
                        title: self.title.clone(),
                        reason: "unlisted movies need a year",
                    }
                );
            }
        }
        Ok(())
    }

    /// The identity used to match a ballot slot against leaderboard entries.
    pub(crate) fn key(&self) -> MovieKey {
        match self.external_id {
            ExternalId::Catalog(id) => MovieKey::Catalog(id),
            ExternalId::Unlisted => MovieKey::Unlisted(normalize_title(&self.title)),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub(crate) enum MovieKey {
    Catalog(CatalogId),
    Unlisted(String),
}

pub(crate) fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// The points given to a rank: 20 for the first place, 1 for the last one.
pub fn points_for_rank(rank: u8) -> u32 {
    (BALLOT_SIZE as u32 + 1).saturating_sub(rank as u32)
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotSlot {
    pub rank: u8,
    pub points: u32,
    pub movie: MovieReference,
}

/// A complete ballot: exactly 20 distinct movies, ranked.
///
/// The slots are private so that a ballot can only be obtained through
/// `Ballot::from_movies`, the builder, or deserialization followed by `check`.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    slots: Vec<BallotSlot>,
}

impl Ballot {
    /// Ranks the movies in the given order.
    pub fn from_movies(movies: Vec<MovieReference>) -> EngineResult<Ballot> {
        let slots = movies
            .into_iter()
            .enumerate()
            .map(|(idx, movie)| {
                let rank = (idx + 1) as u8;
                BallotSlot {
                    rank,
                    points: points_for_rank(rank),
                    movie,
                }
            })
            .collect();
        let ballot = Ballot { slots };
        ballot.check()?;
        Ok(ballot)
    }

    pub fn slots(&self) -> &[BallotSlot] {
        &self.slots
    }

    pub fn total_points(&self) -> u32 {
        self.slots.iter().map(|s| s.points).sum()
    }

    /// Verifies the completeness and distinctness invariants.
    pub fn check(&self) -> EngineResult<()> {
        ensure!(
            self.slots.len() == BALLOT_SIZE,
            IncompleteBallotSnafu {
                filled: self.slots.len(),
                expected: BALLOT_SIZE,
            }
        );
        let mut seen_titles: Vec<String> = Vec::with_capacity(BALLOT_SIZE);
        let mut seen_ids: Vec<CatalogId> = Vec::with_capacity(BALLOT_SIZE);
        for (idx, slot) in self.slots.iter().enumerate() {
            let rank = (idx + 1) as u8;
            ensure!(
                slot.rank == rank,
                InvalidRankSnafu {
                    rank: slot.rank as usize,
                    max: BALLOT_SIZE,
                }
            );
            ensure!(
                slot.points == points_for_rank(rank),
                InvalidPointsSnafu {
                    rank,
                    points: slot.points,
                    expected: points_for_rank(rank),
                }
            );
            ensure!(!slot.movie.title.trim().is_empty(), MissingTitleSnafu { rank });
            slot.movie.check()?;

            let title = normalize_title(&slot.movie.title);
            let duplicate_id = match slot.movie.external_id {
                ExternalId::Catalog(id) => seen_ids.contains(&id),
                ExternalId::Unlisted => false,
            };
            ensure!(
                !duplicate_id && !seen_titles.contains(&title),
                DuplicateMovieSnafu {
                    rank,
                    title: slot.movie.title.clone(),
                }
            );
            seen_titles.push(title);
            if let ExternalId::Catalog(id) = slot.movie.external_id {
                seen_ids.push(id);
            }
        }
        Ok(())
    }
}

// ******** Leaderboard data structures *********

/// A rank on a ballot, displayed as `#3`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Place(pub u8);

impl Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for Place {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('#')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| *n >= 1 && (*n as usize) <= BALLOT_SIZE)
            .map(Place)
            .ok_or_else(|| format!("invalid place {:?}", s))
    }
}

impl Serialize for Place {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Place {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The voters who put a movie at a given place, in submission order.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoterAttribution {
    pub place: Place,
    #[serde(rename = "name")]
    pub voters: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub movie: MovieReference,
    pub points: u32,
    #[serde(rename = "voters")]
    pub attributions: Vec<VoterAttribution>,
}

impl LeaderboardEntry {
    /// The entry created by the first vote a movie receives.
    pub fn first_vote(slot: &BallotSlot, voter: &str) -> LeaderboardEntry {
        LeaderboardEntry {
            movie: slot.movie.clone(),
            points: slot.points,
            attributions: vec![VoterAttribution {
                place: Place(slot.rank),
                voters: vec![voter.to_string()],
            }],
        }
    }

    pub fn attribution(&self, place: Place) -> Option<&VoterAttribution> {
        self.attributions.iter().find(|a| a.place == place)
    }

    /// Appends the voter to the attribution of this place, creating it if needed.
    pub fn attribute(&mut self, place: Place, voter: &str) {
        match self.attributions.iter_mut().find(|a| a.place == place) {
            Some(attribution) => attribution.voters.push(voter.to_string()),
            None => self.attributions.push(VoterAttribution {
                place,
                voters: vec![voter.to_string()],
            }),
        }
    }

    pub fn voter_count(&self) -> usize {
        self.attributions.iter().map(|a| a.voters.len()).sum()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Open,
    Closed,
}

/// Identifier of a decade list: `<decade>-<index>`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ListId {
    pub decade: Decade,
    pub index: u32,
}

impl ListId {
    pub fn new(decade: Decade, index: u32) -> ListId {
        ListId { decade, index }
    }
}

impl Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.decade, self.index)
    }
}

impl FromStr for ListId {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s.split_once('-').and_then(|(decade, index)| {
            Some(ListId {
                decade: decade.parse().ok()?,
                index: index.parse().ok()?,
            })
        });
        parsed.context(MalformedListIdSnafu { id: s })
    }
}

impl Serialize for ListId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ListId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The running leaderboard of one voting round for a decade.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DecadeList {
    pub id: ListId,
    pub decade: Decade,
    pub name: String,
    pub status: ListStatus,
    #[serde(rename = "movies")]
    pub entries: Vec<LeaderboardEntry>,
}

impl DecadeList {
    pub fn new(id: ListId, name: &str) -> DecadeList {
        DecadeList {
            id,
            decade: id.decade,
            name: name.to_string(),
            status: ListStatus::Open,
            entries: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ListStatus::Open
    }

    pub fn total_points(&self) -> u64 {
        self.entries.iter().map(|e| e.points as u64).sum()
    }
}

// ******** Voters and their ballots *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Voter {
    pub fn new(id: &str, display_name: &str) -> Voter {
        Voter {
            id: id.to_string(),
            display_name: display_name.to_string(),
        }
    }

    pub(crate) fn check(&self) -> EngineResult<()> {
        ensure!(
            !self.id.is_empty() && !self.id.contains('/'),
            InvalidVoterSnafu {
                voter_id: self.id.clone()
            }
        );
        ensure!(
            !self.display_name.trim().is_empty(),
            InvalidVoterSnafu {
                voter_id: self.id.clone()
            }
        );
        Ok(())
    }
}

/// The persisted copy of a voter's ballot, kept for the personal history.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotRecord {
    #[serde(rename = "voterId")]
    pub voter_id: String,
    #[serde(rename = "voterName")]
    pub voter_name: String,
    #[serde(rename = "listId")]
    pub list_id: ListId,
    pub ballot: Ballot,
}

// ********* Configuration **********

/// The inclusive range of release years that belong to a decade.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DecadeWindow {
    pub start: u16,
    pub end: u16,
}

/// Decades are named after their first year, written with four digits.
pub const LAST_DECADE: Decade = 9990;

impl DecadeWindow {
    pub fn of(decade: Decade) -> DecadeWindow {
        DecadeWindow {
            start: decade,
            end: decade.saturating_add(9),
        }
    }

    /// The window of a well-formed decade: a multiple of ten with four digits.
    pub fn checked(decade: Decade) -> EngineResult<DecadeWindow> {
        ensure!(
            decade % 10 == 0 && (1000..=LAST_DECADE).contains(&decade),
            InvalidDecadeSnafu { decade }
        );
        Ok(DecadeWindow::of(decade))
    }

    pub fn contains(&self, year: u16) -> bool {
        self.start <= year && year <= self.end
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EngineRules {
    /// How many times a list update is attempted when other writers keep
    /// winning the race on the same list.
    pub max_merge_attempts: u32,
    pub page_size: usize,
    pub earliest_decade: Decade,
    /// The most recent decade a list may be created for.
    /// Defaults to the decade of the current year.
    pub latest_decade: Option<Decade>,
}

impl EngineRules {
    pub const DEFAULT_RULES: EngineRules = EngineRules {
        max_merge_attempts: 5,
        page_size: 10,
        earliest_decade: 1890,
        latest_decade: None,
    };

    pub fn check_decade(&self, decade: Decade) -> EngineResult<()> {
        DecadeWindow::checked(decade)?;
        let latest = self.latest_decade.unwrap_or_else(current_decade);
        ensure!(
            decade >= self.earliest_decade && decade <= latest,
            InvalidDecadeSnafu { decade }
        );
        Ok(())
    }
}

impl Default for EngineRules {
    fn default() -> Self {
        EngineRules::DEFAULT_RULES
    }
}

pub fn current_decade() -> Decade {
    let year = chrono::Utc::now().year();
    ((year / 10) * 10) as Decade
}

// ********* Errors **********

/// The classes of failures, which decide how a caller should react.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    /// The input can be corrected by the user and submitted again.
    Validation,
    /// The request contradicts the current state (list already open, second vote).
    Conflict,
    NotFound,
    /// Lost a race against another writer, may be retried.
    Concurrency,
    /// The store or the catalog failed, may be retried.
    Dependency,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("the ballot has {filled} resolved slots out of {expected}"))]
    IncompleteBallot { filled: usize, expected: usize },
    #[snafu(display("slot #{rank}: {title:?} is already on this ballot"))]
    DuplicateMovie { rank: u8, title: String },
    #[snafu(display("rank {rank} is outside 1..={max}"))]
    InvalidRank { rank: usize, max: usize },
    #[snafu(display("slot #{rank} carries {points} points instead of {expected}"))]
    InvalidPoints { rank: u8, points: u32, expected: u32 },
    #[snafu(display("slot #{rank} has no title"))]
    MissingTitle { rank: u8 },
    #[snafu(display("{title:?}: {reason}"))]
    InvalidMovie { title: String, reason: String },
    #[snafu(display("year {literal:?} does not belong to the {decade}s"))]
    InvalidYear { literal: String, decade: Decade },
    #[snafu(display("a director is required for {title:?}"))]
    MissingDirector { title: String },
    #[snafu(display("{decade} is not a decade open to voting"))]
    InvalidDecade { decade: Decade },
    #[snafu(display("the list needs a name"))]
    MissingListName {},
    #[snafu(display("malformed list id {id:?}"))]
    MalformedListId { id: String },
    #[snafu(display("invalid voter {voter_id:?}"))]
    InvalidVoter { voter_id: String },

    #[snafu(display("voting for the {decade}s is still open in list {list_id}"))]
    DecadeAlreadyOpen { decade: Decade, list_id: ListId },
    #[snafu(display("list {list_id} must be closed before another one opens"))]
    AnotherListOpen { list_id: ListId },
    #[snafu(display("voter {voter_id} already voted in list {list_id}"))]
    AlreadyVoted { voter_id: String, list_id: ListId },
    #[snafu(display("list {list_id} is closed"))]
    ListClosed { list_id: ListId },
    #[snafu(display("no list is open for voting"))]
    NoOpenList {},
    #[snafu(display("{count} lists are open at the same time"))]
    SeveralOpenLists { count: usize },
    #[snafu(display("the open list is for the {open}s, not the {requested}s"))]
    WrongDecade { requested: Decade, open: Decade },

    #[snafu(display("list {list_id} does not exist"))]
    ListNotFound { list_id: ListId },
    #[snafu(display("voter {voter_id} is not registered"))]
    VoterNotFound { voter_id: String },

    #[snafu(display("document {collection}/{key} changed while it was being written"))]
    VersionConflict { collection: String, key: String },
    #[snafu(display("gave up updating list {list_id} after {attempts} attempts"))]
    MergeContention { list_id: ListId, attempts: u32 },

    #[snafu(display("document store failure: {message}"))]
    Storage { message: String },
    #[snafu(display("movie catalog failure: {message}"))]
    Catalog { message: String },
    #[snafu(display("document {collection}/{key} could not be encoded or decoded"))]
    Codec {
        collection: String,
        key: String,
        source: serde_json::Error,
    },
    #[snafu(display("could not write the leaderboard export"))]
    Export { source: csv::Error },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            IncompleteBallot { .. }
            | DuplicateMovie { .. }
            | InvalidRank { .. }
            | InvalidPoints { .. }
            | MissingTitle { .. }
            | InvalidMovie { .. }
            | InvalidYear { .. }
            | MissingDirector { .. }
            | InvalidDecade { .. }
            | MissingListName { .. }
            | MalformedListId { .. }
            | InvalidVoter { .. } => ErrorKind::Validation,
            DecadeAlreadyOpen { .. }
            | AnotherListOpen { .. }
            | AlreadyVoted { .. }
            | ListClosed { .. }
            | NoOpenList { .. }
            | SeveralOpenLists { .. }
            | WrongDecade { .. } => ErrorKind::Conflict,
            ListNotFound { .. } | VoterNotFound { .. } => ErrorKind::NotFound,
            VersionConflict { .. } | MergeContention { .. } => ErrorKind::Concurrency,
            Storage { .. } | Catalog { .. } | Codec { .. } | Export { .. } => {
                ErrorKind::Dependency
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Concurrency | ErrorKind::Dependency
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
