//! `Link` header driven traversal of paginated listings.

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::http::ApiClient;

/// Upper bound on pages fetched by one traversal.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// A decoded page body that yields its elements.
pub trait Page: DeserializeOwned {
    type Item;

    fn into_items(self) -> Vec<Self::Item>;
}

impl<T: DeserializeOwned> Page for Vec<T> {
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self
    }
}

/// Extracts the `rel="next"` target from a `Link` header value.
///
/// Accepts quoted or bare `next`, matches the `rel` name case-insensitively
/// and ignores every other relation.
pub fn next_link(header: Option<&str>) -> Option<String> {
    header?.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("rel") && {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                value == "next"
            }
        });
        is_next.then(|| url.to_string())
    })
}

/// Iterative cursor over the pages of one listing.
pub struct Paginator<'c> {
    client: &'c ApiClient,
    start: String,
    next: Option<String>,
    fetched: usize,
    max_pages: usize,
}

impl<'c> Paginator<'c> {
    pub fn new(client: &'c ApiClient, start_url: impl Into<String>) -> Self {
        let start = start_url.into();
        Self {
            client,
            next: Some(start.clone()),
            start,
            fetched: 0,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetches the next page, or `None` once the chain has ended.
    pub async fn next_page<P: Page>(&mut self) -> Result<Option<Vec<P::Item>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };
        if self.fetched == self.max_pages {
            return Err(Error::PageLimit {
                url: self.start.clone(),
                limit: self.max_pages,
            });
        }
        let (page, next) = self.client.get_page::<P>(&url).await?;
        self.fetched += 1;
        self.next = next;
        debug!(page = self.fetched, has_next = self.next.is_some(), "page fetched");
        Ok(Some(page.into_items()))
    }
}

/// Returns the first element accepted by `matcher`, fetching no further pages
/// once it is found.
#[instrument(skip(client, matcher))]
pub async fn traverse<P, F>(client: &ApiClient, start_url: &str, mut matcher: F) -> Result<Option<P::Item>>
where
    P: Page,
    F: FnMut(&P::Item) -> bool,
{
    let mut pages = Paginator::new(client, start_url);
    while let Some(items) = pages.next_page::<P>().await? {
        if let Some(found) = items.into_iter().find(|item| matcher(item)) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Collects every element of every page.
#[instrument(skip(client))]
pub async fn collect_all<P: Page>(client: &ApiClient, start_url: &str) -> Result<Vec<P::Item>> {
    let mut pages = Paginator::new(client, start_url);
    let mut all = Vec::new();
    while let Some(items) = pages.next_page::<P>().await? {
        all.extend(items);
    }
    Ok(all)
}
