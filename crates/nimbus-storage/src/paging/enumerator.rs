use std::num::NonZeroU32;

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use nimbus_core::paging::{ContinuationToken, ListOptions, PageRequest, Segment};
use nimbus_core::{Error, PageFetcher, Result};

use crate::TRACING_TARGET_PAGING;
use crate::classify::classify;

/// Produces listing segments on demand from a [`PageFetcher`].
///
/// [`fetch_segment`](Self::fetch_segment) fetches exactly one page for a
/// caller-held continuation token. [`segments`](Self::segments) and
/// [`stream`](Self::stream) drive the same engine lazily: a page is fetched
/// only when the consumer asks for more, and only the current page is held
/// in memory. Each call to them starts over from the first page.
///
/// The page size is a hint. The server decides how many items a page holds.
#[derive(Debug, Clone)]
pub struct SegmentedEnumerator<F> {
    fetcher: F,
}

impl<F: PageFetcher> SegmentedEnumerator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetches the page that starts at `continuation_token`.
    ///
    /// The prefix is re-sent with every page because the token encodes only
    /// a position. An empty token in the response is normalized to `None`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when `page_size_hint` is zero, before any request.
    /// - The classified error of a non-2xx page response.
    pub async fn fetch_segment(
        &self,
        prefix: Option<&str>,
        page_size_hint: Option<u32>,
        continuation_token: Option<&ContinuationToken>,
        options: &ListOptions,
    ) -> Result<Segment<F::Item>> {
        let page_size_hint = validate_hint(page_size_hint)?;
        let request = PageRequest {
            prefix: prefix.map(str::to_owned),
            page_size_hint,
            continuation_token: ContinuationToken::non_empty(continuation_token.cloned()),
            options: options.clone(),
        };

        tracing::debug!(
            target: TRACING_TARGET_PAGING,
            prefix = ?request.prefix,
            page_size_hint = ?page_size_hint,
            resumed = request.continuation_token.is_some(),
            "Fetching segment"
        );

        let response = self.fetcher.fetch_page(request).await?;
        if !response.is_success() {
            let kind = classify(None, response.status, response.error_code.as_deref());
            let mut error = Error::new(kind).with_status(response.status);
            if let Some(code) = response.error_code {
                error = error.with_code(code);
            }

            tracing::warn!(
                target: TRACING_TARGET_PAGING,
                status = response.status,
                code = ?error.code(),
                "Segment fetch failed"
            );
            return Err(error);
        }

        let segment = Segment::new(response.items, response.next);
        tracing::debug!(
            target: TRACING_TARGET_PAGING,
            items = segment.len(),
            has_more = segment.has_more_results(),
            "Segment fetched"
        );

        Ok(segment)
    }

    /// Lazily yields every segment from the first page to the last.
    ///
    /// A page-fetch error is yielded as the final item.
    pub fn segments<'a>(
        &'a self,
        prefix: Option<&str>,
        page_size_hint: Option<u32>,
        options: &ListOptions,
    ) -> BoxStream<'a, Result<Segment<F::Item>>>
    where
        F::Item: 'a,
    {
        let prefix = prefix.map(str::to_owned);
        Box::pin(self.segment_stream(prefix, page_size_hint, options.clone()))
    }

    /// Lazily yields every item across all pages, in server order.
    ///
    /// Empty pages that still carry a token are skipped. A page-fetch error
    /// ends the stream as its final item, so "no more data" and "failed
    /// midway" stay distinguishable.
    pub fn stream<'a>(
        &'a self,
        prefix: Option<&str>,
        page_size_hint: Option<u32>,
        options: &ListOptions,
    ) -> BoxStream<'a, Result<F::Item>>
    where
        F::Item: 'a,
    {
        let segments = self.segments(prefix, page_size_hint, options);
        Box::pin(item_stream(segments))
    }

    fn segment_stream<'a>(
        &'a self,
        prefix: Option<String>,
        page_size_hint: Option<u32>,
        options: ListOptions,
    ) -> impl Stream<Item = Result<Segment<F::Item>>> + Send + 'a
    where
        F::Item: 'a,
    {
        try_stream! {
            let mut token: Option<ContinuationToken> = None;
            loop {
                let segment = self
                    .fetch_segment(prefix.as_deref(), page_size_hint, token.as_ref(), &options)
                    .await?;

                token = segment.continuation_token.clone();
                let finished = token.is_none();
                yield segment;

                if finished {
                    break;
                }
            }
        }
    }
}

fn item_stream<'a, T: Send + 'a>(
    mut segments: BoxStream<'a, Result<Segment<T>>>,
) -> impl Stream<Item = Result<T>> + Send + 'a {
    try_stream! {
        while let Some(segment) = segments.next().await {
            let segment = segment?;
            for item in segment.results {
                yield item;
            }
        }
    }
}

fn validate_hint(page_size_hint: Option<u32>) -> Result<Option<NonZeroU32>> {
    match page_size_hint {
        None => Ok(None),
        Some(hint) => NonZeroU32::new(hint).map(Some).ok_or_else(|| {
            Error::invalid_argument().with_message("page size hint must be a positive integer")
        }),
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use nimbus_core::ErrorKind;
    use nimbus_core::paging::ListInclude;
    use nimbus_test::MockListing;

    use super::*;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("item-{i:02}")).collect()
    }

    #[tokio::test]
    async fn test_twenty_items_in_pages_of_five() {
        let enumerator = SegmentedEnumerator::new(MockListing::new(names(20)));
        let options = ListOptions::default();

        let segments: Vec<_> = enumerator
            .segments(None, Some(5), &options)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(|s| s.len() == 5));
        assert!(segments[..3].iter().all(Segment::has_more_results));
        assert!(segments[3].continuation_token.is_none());

        let concatenated: Vec<String> = segments.into_iter().flat_map(|s| s.results).collect();
        let streamed: Vec<String> = enumerator
            .stream(None, Some(5), &options)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(concatenated, names(20));
        assert_eq!(streamed, concatenated);
    }

    #[tokio::test]
    async fn test_manual_paging_with_tokens() {
        let enumerator = SegmentedEnumerator::new(MockListing::new(names(12)));
        let options = ListOptions::default();

        let mut token = None;
        let mut collected = Vec::new();
        loop {
            let segment = enumerator
                .fetch_segment(None, Some(5), token.as_ref(), &options)
                .await
                .unwrap();
            let (results, next) = segment.into_parts();
            collected.extend(results);
            token = next;
            if token.is_none() {
                break;
            }
        }

        assert_eq!(collected, names(12));
    }

    #[tokio::test]
    async fn test_refetch_with_same_token_is_idempotent() {
        let enumerator = SegmentedEnumerator::new(MockListing::new(names(20)));
        let options = ListOptions::default();

        let first = enumerator
            .fetch_segment(Some("item"), Some(5), None, &options)
            .await
            .unwrap();
        let token = first.continuation_token.clone().unwrap();

        let a = enumerator
            .fetch_segment(Some("item"), Some(5), Some(&token), &options)
            .await
            .unwrap();
        let b = enumerator
            .fetch_segment(Some("item"), Some(5), Some(&token), &options)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.results[0], "item-05");
    }

    #[tokio::test]
    async fn test_prefix_is_resent_with_every_page() {
        let mut all = names(6);
        all.extend(["other-1".to_owned(), "other-2".to_owned()]);
        let listing = MockListing::new(all);
        let enumerator = SegmentedEnumerator::new(listing.clone());
        let options = ListOptions::default().with_include(ListInclude::Metadata);

        let items: Vec<String> = enumerator
            .stream(Some("item-"), Some(2), &options)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items, names(6));

        let requests = listing.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.prefix.as_deref() == Some("item-")));
        assert!(requests.iter().all(|r| r.options == options));
        assert!(requests[0].continuation_token.is_none());
        assert!(requests[1].continuation_token.is_some());
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected_before_fetching() {
        let listing = MockListing::new(names(3));
        let enumerator = SegmentedEnumerator::new(listing.clone());

        let err = enumerator
            .fetch_segment(None, Some(0), None, &ListOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(listing.requests().is_empty());
    }

    #[tokio::test]
    async fn test_hint_is_passed_through_and_server_decides() {
        let listing = MockListing::new(names(10)).with_max_page_size(3);
        let enumerator = SegmentedEnumerator::new(listing.clone());

        let segment = enumerator
            .fetch_segment(None, Some(5), None, &ListOptions::default())
            .await
            .unwrap();

        assert_eq!(segment.len(), 3);
        assert_eq!(listing.requests()[0].page_size_hint.map(NonZeroU32::get), Some(5));
    }

    #[tokio::test]
    async fn test_fetch_error_terminates_stream() {
        let listing = MockListing::new(names(20)).with_failure_on_request(2, 503);
        let enumerator = SegmentedEnumerator::new(listing);

        let results: Vec<Result<String>> = enumerator
            .stream(None, Some(5), &ListOptions::default())
            .collect()
            .await;

        assert_eq!(results.len(), 11);
        assert!(results[..10].iter().all(Result::is_ok));

        let err = results[10].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status, Some(503));
    }

    #[tokio::test]
    async fn test_empty_pages_with_token_are_skipped() {
        let listing = MockListing::new(names(4)).with_leading_empty_page();
        let enumerator = SegmentedEnumerator::new(listing.clone());

        let items: Vec<String> = enumerator
            .stream(None, Some(2), &ListOptions::default())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items, names(4));
        assert_eq!(listing.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_is_restartable() {
        let enumerator = SegmentedEnumerator::new(MockListing::new(names(7)));
        let options = ListOptions::default();

        let first: Vec<String> = enumerator
            .stream(None, Some(3), &options)
            .take(4)
            .try_collect()
            .await
            .unwrap();
        let second: Vec<String> = enumerator
            .stream(None, Some(3), &options)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(first, names(4));
        assert_eq!(second, names(7));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let enumerator = SegmentedEnumerator::new(MockListing::new(Vec::<String>::new()));

        let segments: Vec<_> = enumerator
            .segments(None, None, &ListOptions::default())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_empty());
        assert!(!segments[0].has_more_results());
    }
}
