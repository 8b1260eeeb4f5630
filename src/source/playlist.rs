use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{
    channel::Candidate,
    error::{DiscoveryError, ProbeError},
    playlist::parse_playlist,
    source::{ChannelSource, ProbeStrategy},
};

/// Where an existing playlist is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistLocation {
    File(PathBuf),
    Url(String),
}

impl PlaylistLocation {
    /// `http(s)://` inputs are fetched, anything else is a local path
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(input.to_string())
        } else {
            Self::File(PathBuf::from(input))
        }
    }
}

impl fmt::Display for PlaylistLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Candidates parsed from an existing extended M3U playlist
#[derive(Debug, Clone)]
pub struct PlaylistSource {
    location: PlaylistLocation,
    strategy: ProbeStrategy,
    client: reqwest::Client,
}

impl PlaylistSource {
    #[must_use]
    pub const fn new(
        location: PlaylistLocation,
        strategy: ProbeStrategy,
        client: reqwest::Client,
    ) -> Self {
        Self {
            location,
            strategy,
            client,
        }
    }

    async fn read_playlist(&self) -> Result<String, DiscoveryError> {
        match &self.location {
            PlaylistLocation::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| DiscoveryError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            PlaylistLocation::Url(url) => {
                let http_err = |source| DiscoveryError::Http {
                    url: url.clone(),
                    source,
                };
                let res = self.client.get(url).send().await.map_err(http_err)?;
                if !res.status().is_success() {
                    return Err(DiscoveryError::Status {
                        url: url.clone(),
                        status: res.status(),
                    });
                }
                res.text().await.map_err(http_err)
            }
        }
    }
}

#[async_trait]
impl ChannelSource for PlaylistSource {
    fn describe(&self) -> String {
        self.location.to_string()
    }

    #[instrument(skip(self), fields(source = %self.location))]
    async fn discover(&self) -> Result<Vec<Candidate>, DiscoveryError> {
        let text = self.read_playlist().await?;
        let candidates = parse_playlist(&text);
        if candidates.is_empty() {
            return Err(DiscoveryError::Empty(self.describe()));
        }

        info!("Found {} channels in playlist", candidates.len());
        Ok(candidates)
    }

    async fn probe(&self, candidate: &Candidate) -> Result<String, ProbeError> {
        self.strategy.probe(&self.client, candidate).await
    }
}
