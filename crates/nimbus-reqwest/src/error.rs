//! Internal error types for nimbus-reqwest.

use thiserror::Error;

/// Result type alias for nimbus-reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type for nimbus-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The configured shared access signature cannot be used.
    #[error("Invalid SAS token: {0}")]
    SasToken(String),
}

impl From<Error> for nimbus_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    nimbus_core::Error::transport()
                        .with_message("Request timed out")
                        .with_source(e)
                } else if e.is_connect() {
                    nimbus_core::Error::transport()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_builder() {
                    nimbus_core::Error::invalid_argument()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    nimbus_core::Error::transport()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::SasToken(message) => nimbus_core::Error::invalid_argument().with_message(message),
        }
    }
}
