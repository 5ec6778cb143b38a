//! Server-side copy state and request types.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use url::Url;

use crate::condition::AccessCondition;
use http::header::{HeaderMap, HeaderValue};

use crate::headers::{HeaderMapExt, format_http_date, header, header_value};
use crate::{Error, Result};

/// Status of an asynchronous server-side copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    /// A copy is terminal once it left `pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Copy state as reported by the destination resource's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOperationState {
    /// Identifier the server assigned to the copy.
    pub copy_id: String,
    pub status: CopyStatus,
    pub bytes_copied: Option<u64>,
    pub total_bytes: Option<u64>,
    pub source: Option<Url>,
    pub completion_time: Option<Timestamp>,
    /// Server-reported reason for a failed or aborted copy.
    pub status_description: Option<String>,
}

impl CopyOperationState {
    /// Creates a pending state with no progress yet.
    pub fn pending(copy_id: impl Into<String>) -> Self {
        Self {
            copy_id: copy_id.into(),
            status: CopyStatus::Pending,
            bytes_copied: None,
            total_bytes: None,
            source: None,
            completion_time: None,
            status_description: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of bytes copied, when the server reported progress.
    pub fn progress(&self) -> Option<f64> {
        match (self.bytes_copied, self.total_bytes) {
            (Some(_), Some(0)) => Some(1.0),
            (Some(copied), Some(total)) => Some(copied as f64 / total as f64),
            _ => None,
        }
    }

    /// Decodes the `x-ms-copy-*` headers.
    ///
    /// Returns `Ok(None)` when the resource carries no copy id, i.e. it was
    /// never the destination of a copy.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>> {
        let Some(copy_id) = headers.try_get_str(&header::COPY_ID)? else {
            return Ok(None);
        };

        let status = match headers.try_get_str(&header::COPY_STATUS)? {
            Some(value) => value.parse::<CopyStatus>().map_err(|e| {
                Error::transport()
                    .with_message(format!("invalid copy status '{value}'"))
                    .with_source(e)
            })?,
            None => CopyStatus::Pending,
        };

        let (bytes_copied, total_bytes) = match headers.try_get_str(&header::COPY_PROGRESS)? {
            Some(progress) => parse_progress(progress)?,
            None => (None, None),
        };

        let source = headers
            .try_get_str(&header::COPY_SOURCE)?
            .map(|value| {
                Url::parse(value).map_err(|e| {
                    Error::transport()
                        .with_message(format!("invalid copy source '{value}'"))
                        .with_source(e)
                })
            })
            .transpose()?;

        Ok(Some(Self {
            copy_id: copy_id.to_owned(),
            status,
            bytes_copied,
            total_bytes,
            source,
            completion_time: headers.get_http_date(&header::COPY_COMPLETION_TIME)?,
            status_description: headers
                .try_get_str(&header::COPY_STATUS_DESCRIPTION)?
                .map(str::to_owned),
        }))
    }

    /// Encodes this state as `x-ms-copy-*` headers.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::COPY_ID, header_value(&header::COPY_ID, &self.copy_id)?);
        headers.insert(header::COPY_STATUS, HeaderValue::from_static(self.status.into()));

        if let (Some(copied), Some(total)) = (self.bytes_copied, self.total_bytes) {
            let progress = format!("{copied}/{total}");
            headers.insert(header::COPY_PROGRESS, header_value(&header::COPY_PROGRESS, progress)?);
        }
        if let Some(source) = &self.source {
            headers.insert(header::COPY_SOURCE, header_value(&header::COPY_SOURCE, source)?);
        }
        if let Some(completed) = self.completion_time {
            let completed = format_http_date(completed);
            headers.insert(
                header::COPY_COMPLETION_TIME,
                header_value(&header::COPY_COMPLETION_TIME, completed)?,
            );
        }
        if let Some(description) = &self.status_description {
            headers.insert(
                header::COPY_STATUS_DESCRIPTION,
                header_value(&header::COPY_STATUS_DESCRIPTION, description)?,
            );
        }

        Ok(headers)
    }
}

fn parse_progress(value: &str) -> Result<(Option<u64>, Option<u64>)> {
    let invalid = || Error::transport().with_message(format!("invalid copy progress '{value}'"));

    let (copied, total) = value.split_once('/').ok_or_else(invalid)?;
    let copied = copied.trim().parse::<u64>().map_err(|_| invalid())?;
    let total = total.trim().parse::<u64>().map_err(|_| invalid())?;
    Ok((Some(copied), Some(total)))
}

/// Attributes of a resource, as returned by a `HEAD` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    pub etag: Option<String>,
    pub last_modified: Option<Timestamp>,
    pub content_length: Option<u64>,
    /// Copy state, when the resource was the destination of a copy.
    pub copy: Option<CopyOperationState>,
}

impl ResourceAttributes {
    /// Decodes attributes from response headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        Ok(Self {
            etag: headers.try_get_str(&header::ETAG)?.map(str::to_owned),
            last_modified: headers.get_http_date(&header::LAST_MODIFIED)?,
            content_length: headers.get_u64(&header::CONTENT_LENGTH)?,
            copy: CopyOperationState::from_headers(headers)?,
        })
    }
}

/// A request to copy `source` onto `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: Url,
    pub destination: Url,
    /// Preconditions on the source, sent as `x-ms-source-*` headers.
    pub source_condition: Option<AccessCondition>,
    /// Preconditions on the destination (including its lease).
    pub destination_condition: Option<AccessCondition>,
}

impl CopyRequest {
    pub fn new(source: Url, destination: Url) -> Self {
        Self {
            source,
            destination,
            source_condition: None,
            destination_condition: None,
        }
    }

    #[must_use]
    pub fn with_source_condition(mut self, condition: AccessCondition) -> Self {
        self.source_condition = Some(condition);
        self
    }

    #[must_use]
    pub fn with_destination_condition(mut self, condition: AccessCondition) -> Self {
        self.destination_condition = Some(condition);
        self
    }

    /// Headers for the initiating `PUT`.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::COPY_SOURCE, header_value(&header::COPY_SOURCE, &self.source)?);
        if let Some(condition) = &self.destination_condition {
            headers.extend(condition.to_headers()?);
        }
        if let Some(condition) = &self.source_condition {
            headers.extend(condition.to_source_headers()?);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use http::header::HeaderName;

    use super::*;
    use crate::ErrorKind;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn headers(pairs: &[(HeaderName, &'static str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(name, value)| (name.clone(), HeaderValue::from_static(*value)))
            .collect()
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("pending".parse::<CopyStatus>().unwrap(), CopyStatus::Pending);
        assert_eq!("Success".parse::<CopyStatus>().unwrap(), CopyStatus::Success);
        assert!(!CopyStatus::Pending.is_terminal());
        assert!(CopyStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_from_headers() {
        let headers = headers(&[
            (header::COPY_ID, "c-1"),
            (header::COPY_STATUS, "success"),
            (header::COPY_PROGRESS, "512/1024"),
            (header::COPY_SOURCE, "https://acct.blob.example/src/a"),
            (header::COPY_COMPLETION_TIME, "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]);

        let state = CopyOperationState::from_headers(&headers).unwrap().unwrap();
        assert_eq!(state.copy_id, "c-1");
        assert_eq!(state.status, CopyStatus::Success);
        assert_eq!(state.bytes_copied, Some(512));
        assert_eq!(state.total_bytes, Some(1024));
        assert_eq!(state.progress(), Some(0.5));
        assert_eq!(state.source, Some(url("https://acct.blob.example/src/a")));
        assert!(state.completion_time.is_some());
    }

    #[test]
    fn test_from_headers_without_copy() {
        let headers = headers(&[(header::ETAG, "\"0x1\"")]);
        assert!(CopyOperationState::from_headers(&headers).unwrap().is_none());
    }

    #[test]
    fn test_invalid_progress() {
        let headers = headers(&[(header::COPY_ID, "c-1"), (header::COPY_PROGRESS, "half")]);
        let err = CopyOperationState::from_headers(&headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_headers_decode_back() {
        let mut state = CopyOperationState::pending("c-2");
        state.bytes_copied = Some(0);
        state.total_bytes = Some(10);
        state.status_description = Some("queued".into());

        let decoded = CopyOperationState::from_headers(&state.to_headers().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_copy_request_headers() {
        let request = CopyRequest::new(url("https://a/src"), url("https://a/dst"))
            .with_source_condition(AccessCondition::if_match("\"s\""))
            .with_destination_condition(AccessCondition::lease("L"));

        let headers = request.to_headers().unwrap();
        assert_eq!(headers[header::COPY_SOURCE], "https://a/src");
        assert_eq!(headers[header::SOURCE_IF_MATCH], "\"s\"");
        assert_eq!(headers[header::LEASE_ID], "L");
        assert!(!headers.contains_key(header::IF_MATCH));
    }

    #[test]
    fn test_attributes_from_headers() {
        let headers = headers(&[
            (header::ETAG, "\"0x1\""),
            (header::CONTENT_LENGTH, "42"),
            (header::LAST_MODIFIED, "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]);

        let attributes = ResourceAttributes::from_headers(&headers).unwrap();
        assert_eq!(attributes.etag.as_deref(), Some("\"0x1\""));
        assert_eq!(attributes.content_length, Some(42));
        assert!(attributes.copy.is_none());
    }

    #[test]
    fn test_undecodable_copy_id_is_an_error() {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_bytes("c-\u{e9}".as_bytes()).unwrap();
        headers.insert(header::COPY_ID, value);

        let err = ResourceAttributes::from_headers(&headers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
