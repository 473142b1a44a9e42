//! Turning what a voter typed into a movie reference.
//!
//! Text never resolves by itself: the catalog proposes candidates within the
//! decade and the voter picks one, or the voter declares the movie as not
//! found and supplies the year and the director.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::*;

/// A catalog movie proposed for a search.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "externalId")]
    pub external_id: CatalogId,
    pub title: String,
    /// The release year, when the catalog knows it.
    pub year: Option<u16>,
}

impl Candidate {
    pub fn to_reference(&self) -> MovieReference {
        MovieReference::catalog(self.external_id, &self.title)
    }
}

/// The external movie metadata catalog.
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Movies matching the query. Implementations may ignore the window, the
    /// resolver filters the answer again.
    async fn search(&self, query: &str, window: DecadeWindow) -> EngineResult<Vec<Candidate>>;

    async fn director_of(&self, id: CatalogId) -> EngineResult<Option<String>>;
}

pub struct MovieResolver<C> {
    catalog: C,
}

impl<C: MovieCatalog> MovieResolver<C> {
    pub fn new(catalog: C) -> MovieResolver<C> {
        MovieResolver { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The candidates released during the decade. An empty answer means
    /// "no result" and leaves the slot unresolved.
    pub async fn resolve_candidate(
        &self,
        text: &str,
        decade: Decade,
    ) -> EngineResult<Vec<Candidate>> {
        let window = DecadeWindow::checked(decade)?;
        let query = text.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.catalog.search(query, window).await?;
        let total = found.len();
        let in_window: Vec<Candidate> = found
            .into_iter()
            .filter(|c| c.year.map(|y| window.contains(y)).unwrap_or(false))
            .collect();
        debug!(
            "resolve_candidate: {:?}: {} results, {} in {:?}",
            query,
            total,
            in_window.len(),
            window
        );
        Ok(in_window)
    }

    /// See `unlisted_movie`.
    pub fn mark_not_found(
        &self,
        title: &str,
        director: &str,
        year: &str,
        decade: Decade,
    ) -> EngineResult<MovieReference> {
        unlisted_movie(title, year, director, decade)
    }

    /// The director of a movie: the one typed by the voter for unlisted
    /// movies, or the one known by the catalog.
    pub async fn director_for(&self, movie: &MovieReference) -> EngineResult<Option<String>> {
        match movie.external_id {
            ExternalId::Unlisted => Ok(movie.director.clone()),
            ExternalId::Catalog(id) => self.catalog.director_of(id).await,
        }
    }
}

/// Builds the reference of a movie that the catalog does not know.
///
/// The title must not be empty, the year must be written with four digits
/// and fall in the decade, and the director must be given.
pub fn unlisted_movie(
    title: &str,
    year: &str,
    director: &str,
    decade: Decade,
) -> EngineResult<MovieReference> {
    let title = title.trim();
    ensure!(!title.is_empty(), MissingTitleSnafu { rank: 0u8 });
    let year = check_year_literal(year, decade)?;
    let director = director.trim();
    ensure!(!director.is_empty(), MissingDirectorSnafu { title });
    Ok(MovieReference::unlisted(title, director, year))
}

/// Parses a year typed by a voter. It must be four digits long and start
/// with the first three digits of the decade.
pub fn check_year_literal(literal: &str, decade: Decade) -> EngineResult<u16> {
    DecadeWindow::checked(decade)?;
    let literal = literal.trim();
    let prefix: String = decade.to_string().chars().take(3).collect();
    let well_formed = literal.len() == 4
        && literal.chars().all(|c| c.is_ascii_digit())
        && literal.starts_with(prefix.as_str());
    let year = literal.parse::<u16>().ok().filter(|_| well_formed);
    year.context(InvalidYearSnafu { literal, decade })
}

/// A movie known to a `StaticCatalog`.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMovie {
    pub id: CatalogId,
    pub title: String,
    pub year: Option<u16>,
    pub director: Option<String>,
}

/// A catalog held in memory. Searching matches the query as a
/// case-insensitive substring of the titles.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct StaticCatalog {
    movies: Vec<CatalogMovie>,
}

impl StaticCatalog {
    pub fn new(movies: Vec<CatalogMovie>) -> StaticCatalog {
        StaticCatalog { movies }
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

#[async_trait]
impl MovieCatalog for StaticCatalog {
    async fn search(&self, query: &str, _window: DecadeWindow) -> EngineResult<Vec<Candidate>> {
        let needle = query.to_lowercase();
        Ok(self
            .movies
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .map(|m| Candidate {
                external_id: m.id,
                title: m.title.clone(),
                year: m.year,
            })
            .collect())
    }

    async fn director_of(&self, id: CatalogId) -> EngineResult<Option<String>> {
        Ok(self
            .movies
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.director.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownCatalog {}

    #[async_trait]
    impl MovieCatalog for DownCatalog {
        async fn search(&self, _q: &str, _w: DecadeWindow) -> EngineResult<Vec<Candidate>> {
            Err(EngineError::Catalog {
                message: "timeout".to_string(),
            })
        }
        async fn director_of(&self, _id: CatalogId) -> EngineResult<Option<String>> {
            Err(EngineError::Catalog {
                message: "timeout".to_string(),
            })
        }
    }

    fn catalog() -> StaticCatalog {
        let m = |id: CatalogId, title: &str, year: Option<u16>, director: &str| CatalogMovie {
            id,
            title: title.to_string(),
            year,
            director: Some(director.to_string()),
        };
        StaticCatalog::new(vec![
            m(1, "Heat", Some(1995), "Michael Mann"),
            m(2, "Heat", Some(1986), "Dick Richards"),
            m(3, "Heathers", Some(1989), "Michael Lehmann"),
            m(4, "The Heat", Some(2013), "Paul Feig"),
            m(5, "Heat Wave", None, "Unknown"),
        ])
    }

    #[tokio::test]
    async fn candidates_are_limited_to_the_decade() {
        let resolver = MovieResolver::new(catalog());
        let found = resolver.resolve_candidate("heat", 1980).await.unwrap();
        let ids: Vec<CatalogId> = found.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![2, 3]);
        let found = resolver.resolve_candidate("  heat ", 1990).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_reference(), MovieReference::catalog(1, "Heat"));
    }

    #[tokio::test]
    async fn no_result_is_not_an_error() {
        let resolver = MovieResolver::new(catalog());
        assert!(resolver.resolve_candidate("heat", 1950).await.unwrap().is_empty());
        assert!(resolver.resolve_candidate("   ", 1990).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolving_twice_gives_the_same_identity() {
        let resolver = MovieResolver::new(catalog());
        let a = resolver.resolve_candidate("Heat", 1990).await.unwrap();
        let b = resolver.resolve_candidate("heat", 1990).await.unwrap();
        assert_eq!(a[0].to_reference(), b[0].to_reference());
    }

    #[tokio::test]
    async fn catalog_failures_are_dependency_errors() {
        let resolver = MovieResolver::new(DownCatalog {});
        let err = resolver.resolve_candidate("heat", 1990).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn directors_are_resolved_lazily() {
        let resolver = MovieResolver::new(catalog());
        let heat = MovieReference::catalog(1, "Heat");
        assert_eq!(
            resolver.director_for(&heat).await.unwrap().as_deref(),
            Some("Michael Mann")
        );
        let lost = resolver.mark_not_found("Lost", "Someone", "1993", 1990).unwrap();
        assert_eq!(
            resolver.director_for(&lost).await.unwrap().as_deref(),
            Some("Someone")
        );
        let unknown = MovieReference::catalog(77, "Nope");
        assert_eq!(resolver.director_for(&unknown).await.unwrap(), None);
    }

    #[test]
    fn year_literals() {
        assert_eq!(check_year_literal("1994", 1990).unwrap(), 1994);
        assert_eq!(check_year_literal(" 1990 ", 1990).unwrap(), 1990);
        assert!(check_year_literal("1989", 1990).is_err());
        assert!(check_year_literal("2199", 1990).is_err());
        assert!(check_year_literal("199", 1990).is_err());
        assert!(check_year_literal("19945", 1990).is_err());
        assert!(check_year_literal("199x", 1990).is_err());
        assert!(check_year_literal("+199", 1990).is_err());
        assert!(matches!(
            check_year_literal("1994", 1995),
            Err(EngineError::InvalidDecade { decade: 1995 })
        ));
    }

    #[tokio::test]
    async fn malformed_decades_are_rejected() {
        let resolver = MovieResolver::new(StaticCatalog::default());
        for decade in [65530, 1995, 0] {
            let err = resolver.resolve_candidate("heat", decade).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidDecade { .. }));
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert!(matches!(
            resolver.mark_not_found("Lost", "Someone", "6553", 65530),
            Err(EngineError::InvalidDecade { .. })
        ));
    }

    #[test]
    fn not_found_needs_all_fields() {
        let m = unlisted_movie("Lost", "1994", "Someone", 1990).unwrap();
        assert_eq!(m, MovieReference::unlisted("Lost", "Someone", 1994));
        assert!(matches!(
            unlisted_movie("  ", "1994", "Someone", 1990),
            Err(EngineError::MissingTitle { .. })
        ));
        assert!(matches!(
            unlisted_movie("Lost", "1994", "", 1990),
            Err(EngineError::MissingDirector { .. })
        ));
        assert!(matches!(
            unlisted_movie("Lost", "2004", "Someone", 1990),
            Err(EngineError::InvalidYear { decade: 1990, .. })
        ));
    }
}
