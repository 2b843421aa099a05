//! Paged API access
//!
//! Every remote listing this crate talks to has the same shape: send an
//! optional continuation cursor, get back a page of items and maybe the next
//! cursor. [`PageFetcher`] is that single round trip. Looping over pages is
//! the [`Paginator`](crate::paginate::Paginator)'s job, not the fetcher's.
//!
//! Two fetchers live here and in [`directory`](crate::directory):
//! - [`SearchClient`]: protected-asset search (`searchAfter` cursor)
//! - [`HttpDirectoryLister`](crate::directory::HttpDirectoryLister): account
//!   listing (`nextMarker` token)
//!
//! Fetchers never retry. A failed call comes back as a [`FetchFailure`]
//! holding the cursor that was attempted.

mod credentials;
#[cfg(test)]
pub(crate) mod mock;
mod search;

pub use credentials::{ApiCredentials, ConfigCredentials, CredentialProvider};
pub use search::{SearchClient, SearchResponse};

use async_trait::async_trait;

use crate::error::FetchFailure;
use crate::types::Cursor;

/// One page of results plus the cursor for the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when this is the last page. An empty cursor also ends the listing.
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.filter(|c| !c.is_empty()),
        }
    }

    /// A final page with no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// A single paged request against a remote listing.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Item: Send;

    /// Fetch the page at `cursor`, or the first page when `cursor` is `None`.
    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<Page<Self::Item>, FetchFailure>;
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    type Item = F::Item;

    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<Page<Self::Item>, FetchFailure> {
        (**self).fetch(cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_drops_empty_cursor() {
        let page: Page<u32> = Page::new(vec![1], Some(Cursor::from(json!([]))));
        assert!(page.is_last());

        let page: Page<u32> = Page::new(vec![], Some(Cursor::from("m2")));
        assert!(!page.is_last());
    }
}
