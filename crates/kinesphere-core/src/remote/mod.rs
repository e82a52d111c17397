//! REST client for the KineSphere backend.
//!
//! The client owns transport only: URL building, retries, status mapping and
//! JSON decoding into wire records. Translation into domain models happens in
//! [`crate::router::RemoteStore`].

mod client;
mod dto;

pub use client::{RemoteClient, DEFAULT_RETRIES};
pub use dto::{RemoteId, RemotePatient, RemoteSession};

use thiserror::Error;

/// Remote request errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No usable HTTP response (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    #[error("server answered {code}: {body}")]
    Status { code: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    Url(String),
}

impl RemoteError {
    /// Failures worth another attempt: transport errors and server-side
    /// statuses. Client statuses are definite answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Status { code, .. } => *code >= 500,
            RemoteError::Decode(_) | RemoteError::Url(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { code: 404, .. })
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
