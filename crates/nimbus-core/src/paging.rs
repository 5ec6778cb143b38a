//! Continuation tokens, segments and page requests for listing operations.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Field name used by blob and container listings.
pub const NEXT_MARKER: &str = "NextMarker";

/// Field names used by table listings.
pub const NEXT_TABLE_NAME: &str = "NextTableName";
pub const NEXT_PARTITION_KEY: &str = "NextPartitionKey";
pub const NEXT_ROW_KEY: &str = "NextRowKey";

/// Opaque server cursor identifying where the next page starts.
///
/// The token is an ordered list of named string fields that the client
/// round-trips verbatim and never interprets. It serializes with serde so a
/// caller can persist a resume point and continue in another process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken {
    fields: Vec<(String, String)>,
}

impl ContinuationToken {
    /// Creates an empty token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a single-field `NextMarker` token.
    pub fn marker(value: impl Into<String>) -> Self {
        Self::new().with_field(NEXT_MARKER, value)
    }

    /// Sets a field, replacing an existing value in place.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every field in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// A token is empty when it has no field with a non-empty value.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_empty())
    }

    /// Normalizes an empty token to `None`.
    pub fn non_empty(token: Option<Self>) -> Option<Self> {
        token.filter(|t| !t.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContinuationToken {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |token, (k, v)| token.with_field(k, v))
    }
}

/// One page of results plus the cursor for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment<T> {
    /// Items in server order.
    pub results: Vec<T>,
    /// Cursor for the next page; `None` when the listing is complete.
    pub continuation_token: Option<ContinuationToken>,
}

impl<T> Segment<T> {
    /// Creates a segment, normalizing an empty token to `None`.
    pub fn new(results: Vec<T>, continuation_token: Option<ContinuationToken>) -> Self {
        Self {
            results,
            continuation_token: ContinuationToken::non_empty(continuation_token),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns `true` if the server indicated more pages follow.
    pub fn has_more_results(&self) -> bool {
        self.continuation_token.is_some()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<ContinuationToken>) {
        (self.results, self.continuation_token)
    }
}

/// Additional datasets a listing may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListInclude {
    Metadata,
    Snapshots,
    UncommittedBlobs,
    Copy,
}

/// Listing options forwarded to the page fetcher untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Hierarchy delimiter, e.g. `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// Extra datasets to include.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<ListInclude>,
}

impl ListOptions {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    #[must_use]
    pub fn with_include(mut self, include: ListInclude) -> Self {
        if !self.include.contains(&include) {
            self.include.push(include);
        }
        self
    }

    /// Value of the `include` query parameter, if any dataset is requested.
    pub fn include_query(&self) -> Option<String> {
        if self.include.is_empty() {
            return None;
        }

        let values: Vec<&str> = self.include.iter().map(|i| i.as_ref()).collect();
        Some(values.join(","))
    }
}

/// Request for a single page, handed to a [`PageFetcher`](crate::PageFetcher).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub prefix: Option<String>,
    pub page_size_hint: Option<NonZeroU32>,
    pub continuation_token: Option<ContinuationToken>,
    pub options: ListOptions,
}

/// Raw page returned by a [`PageFetcher`](crate::PageFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse<T> {
    /// HTTP status of the listing response.
    pub status: u16,
    /// Items on this page; empty for non-2xx responses.
    pub items: Vec<T>,
    /// Cursor the server returned, if any.
    pub next: Option<ContinuationToken>,
    /// Server error code for non-2xx responses.
    pub error_code: Option<String>,
}

impl<T> PageResponse<T> {
    /// A successful page.
    pub fn ok(items: Vec<T>, next: Option<ContinuationToken>) -> Self {
        Self {
            status: 200,
            items,
            next,
            error_code: None,
        }
    }

    /// A failed page with the server's status and error code.
    pub fn error(status: u16, error_code: Option<String>) -> Self {
        Self {
            status,
            items: Vec::new(),
            next: None,
            error_code,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
