use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or validating SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Structurally malformed message (bad start-line, bad header line, etc.)
    #[error("Malformed SIP message: {0}")]
    Malformed(String),

    /// Start-line carried a SIP version other than SIP/2.0
    #[error("Unknown SIP version: {0}")]
    UnknownVersion(String),

    /// Content-Length announced more body bytes than the message carries
    #[error("Truncated body: Content-Length {expected} but only {actual} bytes present")]
    TruncatedBody {
        /// Length announced by the Content-Length header
        expected: usize,
        /// Body bytes actually present
        actual: usize,
    },

    /// Invalid SIP method
    #[error("Invalid SIP method: {0}")]
    InvalidMethod(String),

    /// Invalid SIP header value
    #[error("Invalid SIP header: {0}")]
    InvalidHeader(String),

    /// Status code outside the 100..=699 range
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),
}
