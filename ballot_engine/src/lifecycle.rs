//! Creating, voting in, and closing decade lists.
//!
//! Two invariants are enforced here:
//! - at most one list is open at any time, across all decades;
//! - a voter holds at most one ballot record per list.
//!
//! Every update of a list is a read-modify-write guarded by the document
//! version, retried a bounded number of times when another writer got in
//! between. The merge of a ballot is the body of such an update.
//!
//! Creations of lists go through a single guard document naming the list
//! opened last. A creation claims it with a versioned write before the list
//! is written, so two creations racing each other cannot both succeed.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::*;
use crate::merge_ballot;
use crate::pagination::{page, Direction, Page, PageCursor};
use crate::store::*;

const OPEN_LIST_KEY: &str = "open_list";

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpenListGuard {
    #[serde(rename = "openList")]
    open_list: Option<ListId>,
}

fn ballot_key(voter_id: &str, list_id: ListId) -> String {
    format!("{}/{}", voter_id, list_id)
}

/// Failures after which the list is known to be unchanged.
fn merge_not_written(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::ListClosed { .. }
            | EngineError::ListNotFound { .. }
            | EngineError::MergeContention { .. }
            | EngineError::Codec { .. }
    )
}

/// Rejects a new list for `decade` if any list is still open.
///
/// Voting is only ever live for a single list: a list open for the same
/// decade and a list open for another decade both block the creation.
pub fn check_single_open_list(lists: &[DecadeList], decade: Decade) -> EngineResult<()> {
    if let Some(same) = lists.iter().find(|l| l.is_open() && l.decade == decade) {
        return DecadeAlreadyOpenSnafu {
            decade,
            list_id: same.id,
        }
        .fail();
    }
    if let Some(other) = lists.iter().find(|l| l.is_open()) {
        return AnotherListOpenSnafu { list_id: other.id }.fail();
    }
    Ok(())
}

/// The index of the next list for a decade.
pub fn next_list_index(lists: &[DecadeList], decade: Decade) -> u32 {
    lists
        .iter()
        .filter(|l| l.decade == decade)
        .map(|l| l.id.index + 1)
        .max()
        .unwrap_or(0)
}

pub struct ListManager<S> {
    store: S,
    rules: EngineRules,
}

impl<S: DocumentStore> ListManager<S> {
    pub fn new(store: S) -> ListManager<S> {
        ListManager::with_rules(store, EngineRules::DEFAULT_RULES)
    }

    pub fn with_rules(store: S, rules: EngineRules) -> ListManager<S> {
        ListManager { store, rules }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rules(&self) -> &EngineRules {
        &self.rules
    }

    // ********* Lists **********

    /// All the lists, ordered by decade then index.
    pub async fn lists(&self) -> EngineResult<Vec<DecadeList>> {
        let docs = self.store.list(LISTS, &KeyRange::All, None).await?;
        let mut lists: Vec<DecadeList> = docs
            .iter()
            .map(|d| decode(LISTS, d))
            .collect::<EngineResult<_>>()?;
        lists.sort_by_key(|l| l.id);
        Ok(lists)
    }

    pub async fn list(&self, list_id: ListId) -> EngineResult<DecadeList> {
        Ok(self.load_list(list_id).await?.0)
    }

    async fn load_list(&self, list_id: ListId) -> EngineResult<(DecadeList, u64)> {
        let doc = self
            .store
            .get(LISTS, &list_id.to_string())
            .await?
            .context(ListNotFoundSnafu { list_id })?;
        let list: DecadeList = decode(LISTS, &doc)?;
        Ok((list, doc.version))
    }

    /// The list currently open for voting, if any.
    pub async fn open_list(&self) -> EngineResult<Option<DecadeList>> {
        let mut open: Vec<DecadeList> = self
            .lists()
            .await?
            .into_iter()
            .filter(|l| l.is_open())
            .collect();
        ensure!(open.len() <= 1, SeveralOpenListsSnafu { count: open.len() });
        Ok(open.pop())
    }

    /// Opens a new list for a decade.
    ///
    /// Fails with a conflict while another list is open. When another
    /// creation claims the guard first, the checks run again on what it
    /// wrote, up to `max_merge_attempts` times.
    pub async fn create_list(&self, decade: Decade, name: &str) -> EngineResult<DecadeList> {
        let name = name.trim();
        ensure!(!name.is_empty(), MissingListNameSnafu {});
        self.rules.check_decade(decade)?;

        let max_attempts = self.rules.max_merge_attempts.max(1);
        for attempt in 1..=max_attempts {
            let (guard, condition) = self.load_guard().await?;
            let lists = self.lists().await?;
            let checked = match guard.open_list {
                Some(held) => self.check_guard(held, decade).await,
                None => Ok(()),
            }
            .and_then(|_| check_single_open_list(&lists, decade));
            if let Err(e) = checked {
                warn!("create_list: rejected list {:?} for {}: {}", name, decade, e);
                return Err(e);
            }

            let list_id = ListId::new(decade, next_list_index(&lists, decade));
            let list = DecadeList::new(list_id, name);
            let key = list_id.to_string();
            let body = encode(LISTS, &key, &list)?;
            let claim = encode(
                META,
                OPEN_LIST_KEY,
                &OpenListGuard {
                    open_list: Some(list_id),
                },
            )?;
            match self.store.put(META, OPEN_LIST_KEY, claim, condition).await {
                Ok(_) => {}
                Err(EngineError::VersionConflict { .. }) => {
                    warn!(
                        "create_list: another list was opened meanwhile, attempt {}/{}",
                        attempt, max_attempts
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }

            if let Err(e) = self.store.put(LISTS, &key, body, WriteCondition::Absent).await {
                warn!("create_list: could not write list {}: {}", list_id, e);
                self.release_guard(list_id).await;
                return Err(e);
            }
            info!("create_list: created list {} ({:?})", list_id, name);
            return Ok(list);
        }
        VersionConflictSnafu {
            collection: META,
            key: OPEN_LIST_KEY,
        }
        .fail()
    }

    async fn load_guard(&self) -> EngineResult<(OpenListGuard, WriteCondition)> {
        match self.store.get(META, OPEN_LIST_KEY).await? {
            Some(doc) => Ok((decode(META, &doc)?, WriteCondition::Version(doc.version))),
            None => Ok((OpenListGuard::default(), WriteCondition::Absent)),
        }
    }

    /// The guard blocks a creation while the list it names is open, or not
    /// written yet.
    async fn check_guard(&self, held: ListId, decade: Decade) -> EngineResult<()> {
        let open = match self.store.get(LISTS, &held.to_string()).await? {
            Some(doc) => decode::<DecadeList>(LISTS, &doc)?.is_open(),
            None => true,
        };
        if !open {
            return Ok(());
        }
        if held.decade == decade {
            DecadeAlreadyOpenSnafu {
                decade,
                list_id: held,
            }
            .fail()
        } else {
            AnotherListOpenSnafu { list_id: held }.fail()
        }
    }

    /// Empties the guard if it still names `list_id`. A guard left behind on
    /// a closed list does not block anything, so failures are only logged.
    async fn release_guard(&self, list_id: ListId) {
        let released = match self.load_guard().await {
            Ok((guard, condition)) if guard.open_list == Some(list_id) => {
                match encode(META, OPEN_LIST_KEY, &OpenListGuard::default()) {
                    Ok(body) => self
                        .store
                        .put(META, OPEN_LIST_KEY, body, condition)
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = released {
            warn!("release_guard: guard of {} not released: {}", list_id, e);
        }
    }

    /// Closes a list. Closed lists stay closed.
    pub async fn close_list(&self, list_id: ListId) -> EngineResult<DecadeList> {
        let list = self
            .update_list(list_id, |list| {
                ensure!(list.is_open(), ListClosedSnafu { list_id });
                list.status = ListStatus::Closed;
                Ok(())
            })
            .await?;
        self.release_guard(list_id).await;
        info!(
            "close_list: closed list {} with {} movies and {} points",
            list_id,
            list.entries.len(),
            list.total_points()
        );
        Ok(list)
    }

    /// Applies `apply` to the latest version of the list and writes it back
    /// if nobody wrote the list in the meantime. Otherwise starts over, up
    /// to `max_merge_attempts` times.
    async fn update_list<F>(&self, list_id: ListId, mut apply: F) -> EngineResult<DecadeList>
    where
        F: FnMut(&mut DecadeList) -> EngineResult<()>,
    {
        let key = list_id.to_string();
        let max_attempts = self.rules.max_merge_attempts.max(1);
        for attempt in 1..=max_attempts {
            let (mut list, version) = self.load_list(list_id).await?;
            apply(&mut list)?;
            let body = encode(LISTS, &key, &list)?;
            match self
                .store
                .put(LISTS, &key, body, WriteCondition::Version(version))
                .await
            {
                Ok(new_version) => {
                    debug!(
                        "update_list: {} written at version {} (attempt {})",
                        list_id, new_version, attempt
                    );
                    return Ok(list);
                }
                Err(EngineError::VersionConflict { .. }) => {
                    warn!(
                        "update_list: {} changed since version {}, attempt {}/{}",
                        list_id, version, attempt, max_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }
        MergeContentionSnafu {
            list_id,
            attempts: max_attempts,
        }
        .fail()
    }

    // ********* Voting **********

    /// Lets a voter into the voting of a decade.
    ///
    /// Requires a single open list, for that decade, in which the voter has
    /// not voted yet. The voter's registration is refreshed on the way.
    pub async fn enter_voting(&self, voter: &Voter, decade: Decade) -> EngineResult<DecadeList> {
        voter.check()?;
        let list = self.open_list().await?.context(NoOpenListSnafu {})?;
        ensure!(
            list.decade == decade,
            WrongDecadeSnafu {
                requested: decade,
                open: list.decade,
            }
        );
        ensure!(
            self.ballot_of(&voter.id, list.id).await?.is_none(),
            AlreadyVotedSnafu {
                voter_id: voter.id.clone(),
                list_id: list.id,
            }
        );
        self.register_voter(voter).await?;
        Ok(list)
    }

    /// Records the ballot of a voter and merges it into the list.
    ///
    /// The ballot record is reserved first with a create-only write, which
    /// is what rejects a second vote. If the merge fails in a way that leaves
    /// the list untouched, the reservation is removed again. After a store
    /// failure the merge may have been written, so the record is kept and
    /// the voter cannot vote a second time.
    pub async fn submit_ballot(
        &self,
        voter: &Voter,
        list_id: ListId,
        ballot: &Ballot,
    ) -> EngineResult<DecadeList> {
        voter.check()?;
        ballot.check()?;
        let (list, _) = self.load_list(list_id).await?;
        ensure!(list.is_open(), ListClosedSnafu { list_id });

        let key = ballot_key(&voter.id, list_id);
        let record = BallotRecord {
            voter_id: voter.id.clone(),
            voter_name: voter.display_name.clone(),
            list_id,
            ballot: ballot.clone(),
        };
        let body = encode(BALLOTS, &key, &record)?;
        match self.store.put(BALLOTS, &key, body, WriteCondition::Absent).await {
            Ok(_) => {}
            Err(EngineError::VersionConflict { .. }) => {
                warn!("submit_ballot: {} already voted in {}", voter.id, list_id);
                return AlreadyVotedSnafu {
                    voter_id: voter.id.clone(),
                    list_id,
                }
                .fail();
            }
            Err(e) => return Err(e),
        }

        let merged = self
            .update_list(list_id, |list| {
                ensure!(list.is_open(), ListClosedSnafu { list_id });
                list.entries = merge_ballot(&list.entries, ballot, &voter.display_name);
                Ok(())
            })
            .await;

        match merged {
            Ok(list) => {
                info!(
                    "submit_ballot: ballot of {} merged into {}, {} movies, {} points",
                    voter.id,
                    list_id,
                    list.entries.len(),
                    list.total_points()
                );
                Ok(list)
            }
            Err(e) if !merge_not_written(&e) => {
                warn!(
                    "submit_ballot: merge of the ballot of {} into {} is unknown, keeping {}: {}",
                    voter.id, list_id, key, e
                );
                Err(e)
            }
            Err(e) => {
                warn!(
                    "submit_ballot: ballot of {} not merged into {}: {}",
                    voter.id, list_id, e
                );
                if let Err(rollback) = self.store.delete(BALLOTS, &key).await {
                    warn!(
                        "submit_ballot: could not release the ballot record {}: {}",
                        key, rollback
                    );
                }
                Err(e)
            }
        }
    }

    // ********* Voters **********

    pub async fn register_voter(&self, voter: &Voter) -> EngineResult<()> {
        voter.check()?;
        let body = encode(VOTERS, &voter.id, voter)?;
        self.store
            .put(VOTERS, &voter.id, body, WriteCondition::Overwrite)
            .await?;
        Ok(())
    }

    pub async fn voter(&self, voter_id: &str) -> EngineResult<Voter> {
        let doc = self
            .store
            .get(VOTERS, voter_id)
            .await?
            .context(VoterNotFoundSnafu { voter_id })?;
        decode(VOTERS, &doc)
    }

    pub async fn ballot_of(
        &self,
        voter_id: &str,
        list_id: ListId,
    ) -> EngineResult<Option<BallotRecord>> {
        let key = ballot_key(voter_id, list_id);
        match self.store.get(BALLOTS, &key).await? {
            Some(doc) => Ok(Some(decode(BALLOTS, &doc)?)),
            None => Ok(None),
        }
    }

    /// The ballots of a voter, ordered by decade then list index.
    pub async fn ballots_of(&self, voter_id: &str) -> EngineResult<Vec<BallotRecord>> {
        let range = KeyRange::Prefix(format!("{}/", voter_id));
        let docs = self.store.list(BALLOTS, &range, None).await?;
        let mut records: Vec<BallotRecord> = docs
            .iter()
            .map(|d| decode(BALLOTS, d))
            .collect::<EngineResult<_>>()?;
        records.sort_by_key(|r| r.list_id);
        Ok(records)
    }

    /// Removes a voter account and its ballot records. The leaderboards keep
    /// the points already merged. Returns the number of removed ballots.
    pub async fn remove_voter(&self, voter_id: &str) -> EngineResult<usize> {
        ensure!(
            self.store.get(VOTERS, voter_id).await?.is_some(),
            VoterNotFoundSnafu { voter_id }
        );
        let removed = self.store.delete_all(BALLOTS, voter_id).await?;
        self.store.delete(VOTERS, voter_id).await?;
        info!("remove_voter: removed {} and {} ballots", voter_id, removed);
        Ok(removed)
    }

    // ********* Paging **********

    /// A cursor before the first page, sized by the rules.
    pub fn cursor(&self) -> PageCursor {
        PageCursor::new(self.rules.page_size)
    }

    pub async fn lists_page(
        &self,
        cursor: &PageCursor,
        direction: Direction,
    ) -> EngineResult<(Page<DecadeList>, PageCursor)> {
        page(&self.store, LISTS, cursor, direction).await
    }

    pub async fn voters_page(
        &self,
        cursor: &PageCursor,
        direction: Direction,
    ) -> EngineResult<(Page<Voter>, PageCursor)> {
        page(&self.store, VOTERS, cursor, direction).await
    }

    pub async fn ballots_page(
        &self,
        cursor: &PageCursor,
        direction: Direction,
    ) -> EngineResult<(Page<BallotRecord>, PageCursor)> {
        page(&self.store, BALLOTS, cursor, direction).await
    }
}
