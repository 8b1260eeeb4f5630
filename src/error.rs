use std::{path::PathBuf, time::Duration};

use reqwest::StatusCode;

/// The candidate list could not be obtained. Aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Reading playlist {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetching playlist from {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Playlist source {url} answered with HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("Source {0} did not yield any channel")]
    Empty(String),
}

/// A single candidate could not be resolved.
///
/// Never escapes the resolver; it is recorded in the candidate's
/// [`ResolutionOutcome`](crate::channel::ResolutionOutcome).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unaccepted HTTP status {0}")]
    Status(u16),

    #[error("No media manifest URL in response body")]
    NoManifest,

    #[error("Response body is not an HLS playlist")]
    InvalidManifest,

    #[error("Probe resolved to an empty URL")]
    EmptyUrl,

    #[error("Probe resolved to a URL containing whitespace: {0:?}")]
    MalformedUrl(String),

    #[error("Probe cancelled")]
    Cancelled,

    #[error("Probe task panicked")]
    Panicked,
}

impl ProbeError {
    /// Short machine-friendly label, used for the failure breakdown in run summaries
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Status(_) => "status",
            Self::NoManifest => "no-manifest",
            Self::InvalidManifest => "invalid-manifest",
            Self::EmptyUrl => "empty-url",
            Self::MalformedUrl(_) => "malformed-url",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        // Keep the whole source chain, reqwest's top-level message is rarely useful on its own
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(s) = source {
            message.push_str(": ");
            message.push_str(&s.to_string());
            source = s.source();
        }
        Self::Network(message)
    }
}

/// The refined playlist could not be written. Aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Writing temporary playlist in {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Moving {from:?} into place at {to:?}")]
    Persist {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Run cancelled before every channel was probed; output left untouched")]
    Cancelled,
}
