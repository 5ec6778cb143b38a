//! Marker-paged listing over a fixed set of names.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nimbus_core::headers::error_code as code;
use nimbus_core::paging::{ContinuationToken, NEXT_MARKER, PageRequest, PageResponse};
use nimbus_core::{PageFetcher, Result};

/// Page size used when the request carries no hint.
const DEFAULT_PAGE_SIZE: usize = 5000;

#[derive(Debug, Default)]
struct ListingState {
    names: Vec<String>,
    max_page_size: Option<usize>,
    failure: Option<(usize, u16)>,
    leading_empty_page: bool,
    requests: Vec<PageRequest>,
}

/// A [`PageFetcher`] over a sorted list of names.
///
/// Pages continue at a `NextMarker` holding the first name of the next
/// page, so re-sending a token always yields the same page. Clones share
/// the same state.
#[derive(Debug, Clone, Default)]
pub struct MockListing {
    state: Arc<Mutex<ListingState>>,
}

impl MockListing {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();

        Self {
            state: Arc::new(Mutex::new(ListingState {
                names,
                ..ListingState::default()
            })),
        }
    }

    /// Caps every page at `size` items regardless of the hint.
    #[must_use]
    pub fn with_max_page_size(self, size: usize) -> Self {
        self.lock().max_page_size = Some(size);
        self
    }

    /// Fails the request with zero-based index `index` with `status`.
    #[must_use]
    pub fn with_failure_on_request(self, index: usize, status: u16) -> Self {
        self.lock().failure = Some((index, status));
        self
    }

    /// Answers every request without a token with an empty page whose
    /// token points at the first item.
    #[must_use]
    pub fn with_leading_empty_page(self) -> Self {
        self.lock().leading_empty_page = true;
        self
    }

    /// Every page request received so far, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ListingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListingState {
    fn page(&mut self, request: PageRequest) -> PageResponse<String> {
        let index = self.requests.len();
        self.requests.push(request.clone());

        if let Some((failing, status)) = self.failure
            && failing == index
        {
            let error_code = match status {
                503 => code::SERVER_BUSY,
                _ => "InternalError",
            };
            return PageResponse::error(status, Some(error_code.to_owned()));
        }

        let prefix = request.prefix.as_deref().unwrap_or_default();
        let marker = request
            .continuation_token
            .as_ref()
            .and_then(|token| token.get(NEXT_MARKER));
        let mut matching = self
            .names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| marker.is_none_or(|marker| name.as_str() >= marker))
            .peekable();

        if marker.is_none() && self.leading_empty_page {
            let next = matching.peek().map(|name| ContinuationToken::marker(name.as_str()));
            return PageResponse::ok(Vec::new(), next);
        }

        let hint = request
            .page_size_hint
            .map_or(DEFAULT_PAGE_SIZE, |hint| hint.get() as usize);
        let size = self.max_page_size.map_or(hint, |max| hint.min(max));

        let items: Vec<String> = matching.by_ref().take(size).cloned().collect();
        let next = matching.next().map(|name| ContinuationToken::marker(name.as_str()));
        PageResponse::ok(items, next)
    }
}

#[async_trait::async_trait]
impl PageFetcher for MockListing {
    type Item = String;

    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<String>> {
        Ok(self.lock().page(request))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    #[tokio::test]
    async fn test_pages_follow_markers() {
        let listing = MockListing::new(["c", "a", "b"]);

        let first = listing
            .fetch_page(PageRequest {
                page_size_hint: NonZeroU32::new(2),
                ..PageRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(first.items, ["a", "b"]);
        assert_eq!(first.next, Some(ContinuationToken::marker("c")));

        let second = listing
            .fetch_page(PageRequest {
                page_size_hint: NonZeroU32::new(2),
                continuation_token: first.next,
                ..PageRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(second.items, ["c"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_failure_on_request() {
        let listing = MockListing::new(["a"]).with_failure_on_request(0, 503);

        let page = listing.fetch_page(PageRequest::default()).await.unwrap();
        assert_eq!(page.status, 503);
        assert_eq!(page.error_code.as_deref(), Some("ServerBusy"));
    }
}
