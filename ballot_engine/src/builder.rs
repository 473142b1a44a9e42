use log::debug;
use snafu::prelude::*;

use crate::config::*;
use crate::resolver::{unlisted_movie, Candidate};

/// The state of one ranked slot while a voter fills a ballot.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SlotState {
    Empty,
    /// Some text was typed but no movie was picked yet.
    Pending(String),
    Resolved(MovieReference),
}

impl SlotState {
    fn title(&self) -> Option<&str> {
        match self {
            SlotState::Empty => None,
            SlotState::Pending(text) => Some(text.as_str()),
            SlotState::Resolved(movie) => Some(movie.title.as_str()),
        }
    }
}

/// A builder for the ballot of one voter.
///
/// ```
/// # use ballot_engine::builder::BallotBuilder;
/// # use ballot_engine::resolver::Candidate;
/// # use ballot_engine::EngineError;
/// let mut builder = BallotBuilder::new(1990)?;
/// builder.enter_text(1, "heat")?;
/// builder.select(
///     1,
///     &Candidate { external_id: 949, title: "Heat".to_string(), year: Some(1995) },
/// )?;
/// builder.enter_text(2, "A movie nobody indexed")?;
/// builder.mark_not_found(2, "1997", "Someone")?;
///
/// assert_eq!(builder.resolved_count(), 2);
/// assert!(builder.finish().is_err());
/// # Ok::<(), EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BallotBuilder {
    pub(crate) _decade: Decade,
    pub(crate) _window: DecadeWindow,
    pub(crate) _slots: Vec<SlotState>,
}

impl BallotBuilder {
    pub fn new(decade: Decade) -> EngineResult<BallotBuilder> {
        Ok(BallotBuilder {
            _decade: decade,
            _window: DecadeWindow::checked(decade)?,
            _slots: vec![SlotState::Empty; BALLOT_SIZE],
        })
    }

    pub fn decade(&self) -> Decade {
        self._decade
    }

    /// The slot at a 1-based rank.
    pub fn slot(&self, rank: usize) -> EngineResult<&SlotState> {
        let idx = slot_index(rank)?;
        Ok(&self._slots[idx])
    }

    pub fn slots(&self) -> &[SlotState] {
        &self._slots
    }

    /// Records what the voter typed. Any previous resolution of the slot is
    /// dropped; blank text empties the slot.
    pub fn enter_text(&mut self, rank: usize, text: &str) -> EngineResult<()> {
        let idx = slot_index(rank)?;
        self._slots[idx] = if text.trim().is_empty() {
            SlotState::Empty
        } else {
            SlotState::Pending(text.to_string())
        };
        Ok(())
    }

    /// Resolves a slot with a catalog candidate picked by the voter.
    ///
    /// The slot must hold some text, and the candidate must be released
    /// during the decade. A movie already present in another slot is
    /// rejected and the slot is emptied.
    pub fn select(&mut self, rank: usize, candidate: &Candidate) -> EngineResult<()> {
        let idx = slot_index(rank)?;
        ensure!(
            self._slots[idx].title().is_some(),
            MissingTitleSnafu { rank: rank as u8 }
        );
        ensure!(
            candidate.year.map(|y| self._window.contains(y)).unwrap_or(false),
            InvalidMovieSnafu {
                title: candidate.title.clone(),
                reason: format!("not released in the {}s", self._decade),
            }
        );
        self.resolve(rank, candidate.to_reference())
    }

    /// Resolves a slot with a movie that the catalog does not know. The slot
    /// must already hold a title.
    pub fn mark_not_found(&mut self, rank: usize, year: &str, director: &str) -> EngineResult<()> {
        let idx = slot_index(rank)?;
        let title = self._slots[idx]
            .title()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.to_string())
            .context(MissingTitleSnafu { rank: rank as u8 })?;
        let movie = unlisted_movie(&title, year, director, self._decade)?;
        self.resolve(rank, movie)
    }

    pub fn clear(&mut self, rank: usize) -> EngineResult<()> {
        let idx = slot_index(rank)?;
        self._slots[idx] = SlotState::Empty;
        Ok(())
    }

    pub fn resolved_count(&self) -> usize {
        self._slots
            .iter()
            .filter(|s| matches!(s, SlotState::Resolved(_)))
            .count()
    }

    /// All the slots are resolved: the ballot may be submitted.
    pub fn is_complete(&self) -> bool {
        self.resolved_count() == BALLOT_SIZE
    }

    pub fn finish(&self) -> EngineResult<Ballot> {
        let movies: Vec<MovieReference> = self
            ._slots
            .iter()
            .filter_map(|s| match s {
                SlotState::Resolved(movie) => Some(movie.clone()),
                _ => None,
            })
            .collect();
        ensure!(
            movies.len() == BALLOT_SIZE,
            IncompleteBallotSnafu {
                filled: movies.len(),
                expected: BALLOT_SIZE,
            }
        );
        Ballot::from_movies(movies)
    }

    fn resolve(&mut self, rank: usize, movie: MovieReference) -> EngineResult<()> {
        let idx = slot_index(rank)?;
        let title = normalize_title(&movie.title);
        let collides = self._slots.iter().enumerate().any(|(other, s)| match s {
            SlotState::Resolved(m) if other != idx => {
                normalize_title(&m.title) == title
                    || (m.external_id == movie.external_id
                        && movie.external_id != ExternalId::Unlisted)
            }
            _ => false,
        });
        if collides {
            debug!(
                "BallotBuilder: {:?} is already on the ballot, clearing slot {}",
                movie.title, rank
            );
            self._slots[idx] = SlotState::Empty;
            return DuplicateMovieSnafu {
                rank: rank as u8,
                title: movie.title,
            }
            .fail();
        }
        self._slots[idx] = SlotState::Resolved(movie);
        Ok(())
    }
}

fn slot_index(rank: usize) -> EngineResult<usize> {
    ensure!(
        (1..=BALLOT_SIZE).contains(&rank),
        InvalidRankSnafu {
            rank,
            max: BALLOT_SIZE,
        }
    );
    Ok(rank - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn candidate(title: &str, year: u16) -> Candidate {
        Candidate {
            external_id: catalog_id(title),
            title: title.to_string(),
            year: Some(year),
        }
    }

    fn fill(builder: &mut BallotBuilder, prefix: &str) {
        for (idx, title) in titles(prefix, BALLOT_SIZE).iter().enumerate() {
            builder.enter_text(idx + 1, title).unwrap();
            builder.select(idx + 1, &candidate(title, 1991)).unwrap();
        }
    }

    #[test]
    fn complete_ballot() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        assert!(!builder.is_complete());
        fill(&mut builder, "film");
        assert!(builder.is_complete());
        let ballot = builder.finish().unwrap();
        assert_eq!(ballot, ballot_of(&titles("film", BALLOT_SIZE)));
    }

    #[test]
    fn pending_slots_block_submission() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        fill(&mut builder, "film");
        builder.enter_text(7, "something else").unwrap();
        assert_eq!(builder.slot(7).unwrap(), &SlotState::Pending("something else".to_string()));
        assert!(!builder.is_complete());
        assert!(matches!(
            builder.finish(),
            Err(EngineError::IncompleteBallot { filled: 19, .. })
        ));
    }

    #[test]
    fn duplicate_selection_resets_the_slot() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        builder.enter_text(1, "heat").unwrap();
        builder.select(1, &candidate("Heat", 1995)).unwrap();
        builder.enter_text(2, "HEAT").unwrap();
        let err = builder.select(2, &candidate("HEAT", 1995)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateMovie { rank: 2, .. }));
        assert_eq!(builder.slot(2).unwrap(), &SlotState::Empty);
        // Selecting again the same movie in its own slot is fine.
        builder.select(1, &candidate("Heat", 1995)).unwrap();
        assert_eq!(builder.resolved_count(), 1);
    }

    #[test]
    fn same_catalog_id_is_a_duplicate() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        builder.enter_text(1, "heat").unwrap();
        builder.select(1, &candidate("Heat", 1995)).unwrap();
        let renamed = Candidate {
            title: "Fogo contra Fogo".to_string(),
            ..candidate("Heat", 1995)
        };
        builder.enter_text(3, "fogo").unwrap();
        assert!(builder.select(3, &renamed).is_err());
        assert_eq!(builder.slot(3).unwrap(), &SlotState::Empty);
    }

    #[test]
    fn selection_follows_the_typed_text() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        assert!(matches!(
            builder.select(1, &candidate("Heat", 1995)),
            Err(EngineError::MissingTitle { rank: 1 })
        ));
        builder.enter_text(1, "heat").unwrap();
        for outside in [candidate("Heat", 1986), candidate("Heat", 2000)] {
            assert!(matches!(
                builder.select(1, &outside),
                Err(EngineError::InvalidMovie { .. })
            ));
        }
        let undated = Candidate {
            year: None,
            ..candidate("Heat", 1995)
        };
        assert!(builder.select(1, &undated).is_err());
        assert_eq!(builder.slot(1).unwrap(), &SlotState::Pending("heat".to_string()));
        builder.select(1, &candidate("Heat", 1999)).unwrap();
        assert_eq!(builder.resolved_count(), 1);
    }

    #[test]
    fn decades_are_checked() {
        for decade in [1995, 65530] {
            assert!(matches!(
                BallotBuilder::new(decade),
                Err(EngineError::InvalidDecade { .. })
            ));
        }
        assert_eq!(BallotBuilder::new(1960).unwrap().decade(), 1960);
    }

    #[test]
    fn not_found_movies() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        assert!(matches!(
            builder.mark_not_found(4, "1994", "Someone"),
            Err(EngineError::MissingTitle { rank: 4 })
        ));
        builder.enter_text(4, "Lost reel").unwrap();
        assert!(matches!(
            builder.mark_not_found(4, "1984", "Someone"),
            Err(EngineError::InvalidYear { .. })
        ));
        assert_eq!(builder.slot(4).unwrap(), &SlotState::Pending("Lost reel".to_string()));
        builder.mark_not_found(4, "1994", "Someone").unwrap();
        assert_eq!(
            builder.slot(4).unwrap(),
            &SlotState::Resolved(MovieReference::unlisted("Lost reel", "Someone", 1994))
        );

        builder.enter_text(5, "lost REEL").unwrap();
        assert!(matches!(
            builder.mark_not_found(5, "1994", "Someone"),
            Err(EngineError::DuplicateMovie { rank: 5, .. })
        ));
    }

    #[test]
    fn ranks_are_checked() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        assert!(matches!(
            builder.enter_text(0, "x"),
            Err(EngineError::InvalidRank { rank: 0, .. })
        ));
        assert!(builder.enter_text(21, "x").is_err());
        assert!(builder.slot(20).is_ok());
    }

    #[test]
    fn blank_text_empties_the_slot() {
        let mut builder = BallotBuilder::new(1990).unwrap();
        builder.enter_text(1, "heat").unwrap();
        builder.select(1, &candidate("Heat", 1995)).unwrap();
        builder.enter_text(1, "   ").unwrap();
        assert_eq!(builder.slot(1).unwrap(), &SlotState::Empty);
        builder.enter_text(1, "heat").unwrap();
        builder.select(1, &candidate("Heat", 1995)).unwrap();
        builder.clear(1).unwrap();
        assert_eq!(builder.resolved_count(), 0);
    }
}
