//! The document store consumed by the engine.
//!
//! Documents are JSON values addressed by `(collection, key)`. Every write
//! bumps a per-document version, and writes may be conditioned on that
//! version: this is what serializes concurrent merges into the same list.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::config::*;

/// Decade lists, keyed by list id.
pub const LISTS: &str = "decade_lists";
/// Ballot records, keyed by `<voter id>/<list id>`.
pub const BALLOTS: &str = "ballots";
/// Registered voters, keyed by voter id.
pub const VOTERS: &str = "voters";
/// Bookkeeping of the engine itself.
pub const META: &str = "meta";

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Document {
    pub key: String,
    pub version: u64,
    pub body: JSValue,
}

/// The precondition of a write.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum WriteCondition {
    /// Unconditional overwrite.
    Overwrite,
    /// The document must not exist yet.
    Absent,
    /// The document must still be at this version.
    Version(u64),
}

/// Keys selected by `DocumentStore::list`, always in lexicographic order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum KeyRange {
    All,
    /// Keys strictly greater than this one.
    StartAfter(String),
    /// Keys between the bounds, both included.
    Between { start: String, end: String },
    Prefix(String),
}

impl KeyRange {
    fn contains(&self, key: &str) -> bool {
        match self {
            KeyRange::All => true,
            KeyRange::StartAfter(start) => key > start.as_str(),
            KeyRange::Between { start, end } => start.as_str() <= key && key <= end.as_str(),
            KeyRange::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> EngineResult<Option<Document>>;

    /// Writes the whole document and returns its new version.
    ///
    /// Fails with `EngineError::VersionConflict` when the condition does not hold.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: JSValue,
        condition: WriteCondition,
    ) -> EngineResult<u64>;

    /// Returns false if there was nothing to delete.
    async fn delete(&self, collection: &str, key: &str) -> EngineResult<bool>;

    async fn list(
        &self,
        collection: &str,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Document>>;

    /// Deletes every document keyed `<parent_key>/...` and returns how many
    /// were removed.
    async fn delete_all(&self, collection: &str, parent_key: &str) -> EngineResult<usize>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn get(&self, collection: &str, key: &str) -> EngineResult<Option<Document>> {
        (**self).get(collection, key).await
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: JSValue,
        condition: WriteCondition,
    ) -> EngineResult<u64> {
        (**self).put(collection, key, body, condition).await
    }

    async fn delete(&self, collection: &str, key: &str) -> EngineResult<bool> {
        (**self).delete(collection, key).await
    }

    async fn list(
        &self,
        collection: &str,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Document>> {
        (**self).list(collection, range, limit).await
    }

    async fn delete_all(&self, collection: &str, parent_key: &str) -> EngineResult<usize> {
        (**self).delete_all(collection, parent_key).await
    }
}

pub(crate) fn encode<T: Serialize>(collection: &str, key: &str, value: &T) -> EngineResult<JSValue> {
    serde_json::to_value(value).context(CodecSnafu { collection, key })
}

pub(crate) fn decode<T: DeserializeOwned>(collection: &str, doc: &Document) -> EngineResult<T> {
    serde_json::from_value(doc.body.clone()).context(CodecSnafu {
        collection,
        key: doc.key.as_str(),
    })
}

type Collection = BTreeMap<String, (u64, JSValue)>;

/// A document store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> EngineResult<Option<Document>> {
        let collections = self.collections.lock();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .map(|(version, body)| Document {
                key: key.to_string(),
                version: *version,
                body: body.clone(),
            }))
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: JSValue,
        condition: WriteCondition,
    ) -> EngineResult<u64> {
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(key).map(|(version, _)| *version);
        let accepted = match (condition, current) {
            (WriteCondition::Overwrite, _) => true,
            (WriteCondition::Absent, current) => current.is_none(),
            (WriteCondition::Version(expected), Some(version)) => expected == version,
            (WriteCondition::Version(_), None) => false,
        };
        ensure!(accepted, VersionConflictSnafu { collection, key });
        let version = current.unwrap_or(0) + 1;
        docs.insert(key.to_string(), (version, body));
        Ok(version)
    }

    async fn delete(&self, collection: &str, key: &str) -> EngineResult<bool> {
        let mut collections = self.collections.lock();
        Ok(collections
            .get_mut(collection)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn list(
        &self,
        collection: &str,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Document>> {
        let collections = self.collections.lock();
        let docs = match collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        let lower: Bound<&str> = match range {
            KeyRange::All => Bound::Unbounded,
            KeyRange::StartAfter(start) => Bound::Excluded(start.as_str()),
            KeyRange::Between { start, .. } => Bound::Included(start.as_str()),
            KeyRange::Prefix(prefix) => Bound::Included(prefix.as_str()),
        };
        Ok(docs
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| match range {
                KeyRange::Between { end, .. } => key.as_str() <= end.as_str(),
                KeyRange::Prefix(prefix) => key.starts_with(prefix.as_str()),
                _ => true,
            })
            .filter(|(key, _)| range.contains(key))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, (version, body))| Document {
                key: key.clone(),
                version: *version,
                body: body.clone(),
            })
            .collect())
    }

    async fn delete_all(&self, collection: &str, parent_key: &str) -> EngineResult<usize> {
        let prefix = format!("{}/", parent_key);
        let mut collections = self.collections.lock();
        let docs = match collections.get_mut(collection) {
            Some(docs) => docs,
            None => return Ok(0),
        };
        let before = docs.len();
        docs.retain(|key, _| !key.starts_with(prefix.as_str()));
        Ok(before - docs.len())
    }
}
