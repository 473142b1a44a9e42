// Shared helpers for the unit tests.

use crate::config::*;

/// `n` titles: "<prefix> 1", "<prefix> 2", ...
pub fn titles(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{} {}", prefix, i)).collect()
}

/// A catalog movie whose id is derived from the title.
pub fn movie(title: &str) -> MovieReference {
    MovieReference::catalog(catalog_id(title), title)
}

pub fn catalog_id(title: &str) -> CatalogId {
    title
        .bytes()
        .fold(1469598103934665603u64, |acc, b| {
            (acc ^ b as u64).wrapping_mul(1099511628211)
        })
        % 1_000_000_000
}

pub fn ballot_of<S: AsRef<str>>(titles: &[S]) -> Ballot {
    let movies = titles.iter().map(|t| movie(t.as_ref())).collect();
    Ballot::from_movies(movies).unwrap()
}

/// A ballot starting with `top`, completed with "<filler> N" titles.
pub fn ballot_with_top(top: &[&str], filler: &str) -> Ballot {
    let mut all: Vec<String> = top.iter().map(|s| s.to_string()).collect();
    all.extend(titles(filler, BALLOT_SIZE - top.len()));
    ballot_of(&all)
}
