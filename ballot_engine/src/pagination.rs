//! Keyset pagination over a collection ordered by document key.
//!
//! `fetch_page` is the stateless primitive. `PageCursor` is the state kept by
//! the caller between calls: the bounds of the page on screen and the stacks
//! of bounds of the pages before it, so that going back is a bounded range
//! query instead of an offset.

use log::debug;
use serde::de::DeserializeOwned;

use crate::config::*;
use crate::store::{decode, DocumentStore, KeyRange};

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PageRequest {
    First,
    /// The page following the given key.
    After(String),
    /// A previously seen page, by its first and last keys.
    Span { start: String, end: String },
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub async fn fetch_page<S, T>(
    store: &S,
    collection: &str,
    request: &PageRequest,
    size: usize,
) -> EngineResult<Page<T>>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    let range = match request {
        PageRequest::First => KeyRange::All,
        PageRequest::After(key) => KeyRange::StartAfter(key.clone()),
        PageRequest::Span { start, end } => KeyRange::Between {
            start: start.clone(),
            end: end.clone(),
        },
    };
    let docs = store.list(collection, &range, Some(size.max(1))).await?;
    let items = docs
        .iter()
        .map(|d| decode(collection, d))
        .collect::<EngineResult<Vec<T>>>()?;
    Ok(Page {
        items,
        first_key: docs.first().map(|d| d.key.clone()),
        last_key: docs.last().map(|d| d.key.clone()),
    })
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Direction {
    First,
    Next,
    Previous,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PageCursor {
    pub page_size: usize,
    /// 1-based number of the current page, 0 before the first fetch.
    pub page_number: usize,
    current: Option<(String, String)>,
    previous_firsts: Vec<String>,
    previous_lasts: Vec<String>,
}

impl PageCursor {
    pub fn new(page_size: usize) -> PageCursor {
        PageCursor {
            page_size,
            page_number: 0,
            current: None,
            previous_firsts: Vec::new(),
            previous_lasts: Vec::new(),
        }
    }

    pub fn has_previous(&self) -> bool {
        !self.previous_firsts.is_empty()
    }

    fn at_first(page_size: usize, bounds: Option<(String, String)>) -> PageCursor {
        PageCursor {
            page_size,
            page_number: 1,
            current: bounds,
            previous_firsts: Vec::new(),
            previous_lasts: Vec::new(),
        }
    }
}

fn bounds<T>(page: &Page<T>) -> Option<(String, String)> {
    match (&page.first_key, &page.last_key) {
        (Some(first), Some(last)) => Some((first.clone(), last.clone())),
        _ => None,
    }
}

/// Moves the cursor and returns the page it lands on, with the new cursor.
///
/// Going forward past the last page returns an empty page and leaves the
/// cursor where it was. Going back from the first page reloads it.
pub async fn page<S, T>(
    store: &S,
    collection: &str,
    cursor: &PageCursor,
    direction: Direction,
) -> EngineResult<(Page<T>, PageCursor)>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    let size = cursor.page_size;
    match (direction, &cursor.current) {
        (Direction::Next, Some((first, last))) => {
            let p: Page<T> =
                fetch_page(store, collection, &PageRequest::After(last.clone()), size).await?;
            if p.is_empty() {
                debug!("page: no page after {:?} in {}", last, collection);
                return Ok((p, cursor.clone()));
            }
            let mut next = cursor.clone();
            next.previous_firsts.push(first.clone());
            next.previous_lasts.push(last.clone());
            next.current = bounds(&p);
            next.page_number += 1;
            Ok((p, next))
        }
        (Direction::Previous, Some(_)) if cursor.has_previous() => {
            let mut prev = cursor.clone();
            let (start, end) = match (prev.previous_firsts.pop(), prev.previous_lasts.pop()) {
                (Some(start), Some(end)) => (start, end),
                _ => return first_page(store, collection, size).await,
            };
            let p: Page<T> = fetch_page(
                store,
                collection,
                &PageRequest::Span {
                    start: start.clone(),
                    end: end.clone(),
                },
                size,
            )
            .await?;
            prev.current = Some((start, end));
            prev.page_number = prev.page_number.saturating_sub(1).max(1);
            Ok((p, prev))
        }
        _ => first_page(store, collection, size).await,
    }
}

async fn first_page<S, T>(
    store: &S,
    collection: &str,
    size: usize,
) -> EngineResult<(Page<T>, PageCursor)>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    let p: Page<T> = fetch_page(store, collection, &PageRequest::First, size).await?;
    let cursor = PageCursor::at_first(size, bounds(&p));
    Ok((p, cursor))
}
