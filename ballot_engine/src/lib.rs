mod config;

pub mod builder;
pub mod export;
pub mod lifecycle;
pub mod manual;
pub mod pagination;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod testing;

use log::debug;

use std::collections::HashMap;

pub use crate::config::*;

/// Merges one ballot into the current leaderboard of a list.
///
/// Arguments:
/// * `entries` the current leaderboard, empty if this is the first ballot of the list
/// * `ballot` a complete ballot
/// * `voter_name` the display name recorded in the voter attributions
///
/// Every slot either adds its points to the entry of the same movie, or
/// becomes a new entry. Slots match entries by catalog id; unlisted movies
/// match unlisted entries by title, ignoring case and surrounding spaces.
///
/// The result is sorted by decreasing points. The sort is stable over the
/// sequence "new entries in ballot order, then the previous entries in their
/// previous order", so entries with the same points keep that order.
pub fn merge_ballot(
    entries: &[LeaderboardEntry],
    ballot: &Ballot,
    voter_name: &str,
) -> Vec<LeaderboardEntry> {
    if entries.is_empty() {
        debug!(
            "merge_ballot: empty leaderboard, initializing from the ballot of {:?}",
            voter_name
        );
        return initial_leaderboard(ballot, voter_name);
    }

    let positions = index_entries(entries);
    let mut previous: Vec<LeaderboardEntry> = entries.to_vec();
    let mut inserted: Vec<LeaderboardEntry> = Vec::new();

    for slot in ballot.slots() {
        let place = Place(slot.rank);
        match positions.get(&slot.movie.key()) {
            Some(&idx) => {
                let entry = &mut previous[idx];
                entry.points += slot.points;
                entry.attribute(place, voter_name);
                debug!(
                    "merge_ballot: {:?} matched at {}, now {} points",
                    entry.movie.title, place, entry.points
                );
            }
            None => {
                debug!(
                    "merge_ballot: {:?} is new to the leaderboard at {}",
                    slot.movie.title, place
                );
                inserted.push(LeaderboardEntry::first_vote(slot, voter_name));
            }
        }
    }

    inserted.extend(previous);
    sort_leaderboard(&mut inserted);
    inserted
}

fn initial_leaderboard(ballot: &Ballot, voter_name: &str) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = ballot
        .slots()
        .iter()
        .map(|slot| LeaderboardEntry::first_vote(slot, voter_name))
        .collect();
    sort_leaderboard(&mut entries);
    entries
}

// If the leaderboard somehow holds the same movie twice, the first occurence
// receives the points.
fn index_entries(entries: &[LeaderboardEntry]) -> HashMap<MovieKey, usize> {
    let mut positions: HashMap<MovieKey, usize> = HashMap::new();
    for (idx, e) in entries.iter().enumerate() {
        positions.entry(e.movie.key()).or_insert(idx);
    }
    positions
}

fn sort_leaderboard(entries: &mut [LeaderboardEntry]) {
    // sort_by is stable.
    entries.sort_by(|a, b| b.points.cmp(&a.points));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn merge_all(ballots: &[(&str, Ballot)]) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = Vec::new();
        for (voter, ballot) in ballots {
            entries = merge_ballot(&entries, ballot, voter);
        }
        entries
    }

    fn find<'a>(entries: &'a [LeaderboardEntry], title: &str) -> &'a LeaderboardEntry {
        entries
            .iter()
            .find(|e| e.movie.title == title)
            .unwrap_or_else(|| panic!("{} not on the leaderboard", title))
    }

    #[test]
    fn first_ballot_initializes_leaderboard() {
        let ballot = ballot_of(&titles("m", 20));
        let entries = merge_ballot(&[], &ballot, "Ana");
        assert_eq!(entries.len(), 20);
        for (idx, e) in entries.iter().enumerate() {
            assert_eq!(e.movie, ballot.slots()[idx].movie);
            assert_eq!(e.points, 20 - idx as u32);
            assert_eq!(e.attributions.len(), 1);
            assert_eq!(e.attributions[0].place, Place(idx as u8 + 1));
            assert_eq!(e.attributions[0].voters, vec!["Ana".to_string()]);
        }
    }

    #[test]
    fn swapped_top_two() {
        let a = ballot_with_top(&["Alpha", "Beta"], "a");
        let b = ballot_with_top(&["Beta", "Alpha"], "b");
        let entries = merge_all(&[("voterA", a), ("voterB", b)]);

        let alpha = find(&entries, "Alpha");
        assert_eq!(alpha.points, 39);
        assert_eq!(alpha.attribution(Place(1)).unwrap().voters, vec!["voterA"]);
        assert_eq!(alpha.attribution(Place(2)).unwrap().voters, vec!["voterB"]);
        assert_eq!(alpha.attributions.len(), 2);

        let beta = find(&entries, "Beta");
        assert_eq!(beta.points, 39);
        assert_eq!(beta.attribution(Place(2)).unwrap().voters, vec!["voterA"]);
        assert_eq!(beta.attribution(Place(1)).unwrap().voters, vec!["voterB"]);

        // Equal points keep the previous leaderboard order.
        assert_eq!(entries[0].movie.title, "Alpha");
        assert_eq!(entries[1].movie.title, "Beta");
        assert_eq!(entries.len(), 2 + 18 + 18);
    }

    #[test]
    fn same_place_voters_in_submission_order() {
        let first = ballot_with_top(&["x1", "x2", "Gamma"], "p");
        let second = ballot_with_top(&["y1", "y2", "Gamma"], "q");
        let third = ballot_with_top(&["Gamma"], "r");
        let entries = merge_all(&[("Ana", first), ("Bia", second), ("Caio", third)]);

        let gamma = find(&entries, "Gamma");
        assert_eq!(gamma.points, 18 + 18 + 20);
        let third_place: Vec<&VoterAttribution> = gamma
            .attributions
            .iter()
            .filter(|a| a.place == Place(3))
            .collect();
        assert_eq!(third_place.len(), 1);
        assert_eq!(third_place[0].voters, vec!["Ana", "Bia"]);
        assert_eq!(gamma.attribution(Place(1)).unwrap().voters, vec!["Caio"]);
        assert_eq!(gamma.voter_count(), 3);
    }

    #[test]
    fn points_are_conserved() {
        let mut ballots: Vec<(&str, Ballot)> = Vec::new();
        let voters = ["v0", "v1", "v2", "v3", "v4", "v5", "v6"];
        for (n, voter) in voters.iter().enumerate() {
            // Overlapping windows of a shared pool of titles.
            let pool: Vec<String> = (n..n + 20).map(|i| format!("film {}", (i * 7) % 31)).collect();
            ballots.push((*voter, ballot_of(&pool)));
        }
        let list = DecadeList {
            entries: merge_all(&ballots),
            ..DecadeList::new(ListId::new(1990, 0), "pool")
        };
        assert_eq!(list.total_points(), voters.len() as u64 * 210);
        let entries = list.entries;
        let votes: usize = entries.iter().map(|e| e.voter_count()).sum();
        assert_eq!(votes, voters.len() * 20);
        assert!(entries.windows(2).all(|w| w[0].points >= w[1].points));
    }

    #[test]
    fn new_entries_precede_equal_existing_ones() {
        let first = ballot_of(&titles("old", 20));
        let mut second_titles = titles("new", 19);
        second_titles.push("old 20".to_string());
        let second = ballot_of(&second_titles);
        let entries = merge_all(&[("Ana", first), ("Bia", second)]);

        // "new 1" (20 points, inserted) ties with "old 1" (20 points, existing).
        let pos_new = entries.iter().position(|e| e.movie.title == "new 1").unwrap();
        let pos_old = entries.iter().position(|e| e.movie.title == "old 1").unwrap();
        assert!(pos_new < pos_old);
        assert_eq!(find(&entries, "old 20").points, 2);
    }

    #[test]
    fn new_entry_uses_its_own_rank() {
        let first = ballot_of(&titles("a", 20));
        let second = ballot_with_top(&["a 1", "Fresh"], "b");
        let entries = merge_all(&[("Ana", first), ("Bia", second)]);
        let fresh = find(&entries, "Fresh");
        assert_eq!(fresh.points, 19);
        assert_eq!(fresh.attributions[0].place, Place(2));
        assert_eq!(fresh.attributions[0].voters, vec!["Bia"]);
    }

    #[test]
    fn unlisted_movies_match_by_normalized_title() {
        let mut m1: Vec<MovieReference> = titles("a", 19).iter().map(|t| movie(t)).collect();
        m1.insert(0, MovieReference::unlisted("Lost Reel", "Someone", 1994));
        let mut m2: Vec<MovieReference> = titles("b", 19).iter().map(|t| movie(t)).collect();
        m2.insert(0, MovieReference::unlisted(" lost reel ", "Someone", 1994));
        let entries = merge_all(&[
            ("Ana", Ballot::from_movies(m1).unwrap()),
            ("Bia", Ballot::from_movies(m2).unwrap()),
        ]);
        let lost = find(&entries, "Lost Reel");
        assert_eq!(lost.points, 40);
        assert_eq!(lost.attribution(Place(1)).unwrap().voters, vec!["Ana", "Bia"]);
        assert_eq!(lost.movie.director.as_deref(), Some("Someone"));
    }

    #[test]
    fn catalog_and_unlisted_movies_stay_apart() {
        let first = ballot_with_top(&["Heat"], "a");
        let mut m2: Vec<MovieReference> = titles("b", 19).iter().map(|t| movie(t)).collect();
        m2.insert(0, MovieReference::unlisted("Heat", "Someone else", 1995));
        let entries = merge_all(&[("Ana", first), ("Bia", Ballot::from_movies(m2).unwrap())]);
        let heats: Vec<&LeaderboardEntry> =
            entries.iter().filter(|e| e.movie.title == "Heat").collect();
        assert_eq!(heats.len(), 2);
        assert!(heats.iter().all(|e| e.points == 20));
    }

    #[test]
    fn catalog_id_wins_over_title() {
        let first = Ballot::from_movies(
            std::iter::once(MovieReference::catalog(1, "Heat"))
                .chain(titles("a", 19).iter().map(|t| movie(t)))
                .collect(),
        )
        .unwrap();
        // Same id with a different title.
        let second = Ballot::from_movies(
            std::iter::once(MovieReference::catalog(1, "Fogo contra Fogo"))
                .chain(titles("b", 19).iter().map(|t| movie(t)))
                .collect(),
        )
        .unwrap();
        let entries = merge_all(&[("Ana", first), ("Bia", second)]);
        assert_eq!(entries[0].movie.title, "Heat");
        assert_eq!(entries[0].points, 40);
        assert!(!entries.iter().any(|e| e.movie.title == "Fogo contra Fogo"));
    }
}
