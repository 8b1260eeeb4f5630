use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use reqwest::{
    StatusCode,
    header::{REFERER, USER_AGENT},
};
use tokio_stream::StreamExt;
use tracing::{instrument, trace};

use crate::{
    channel::{Candidate, HTTP_REFERRER, HTTP_USER_AGENT},
    error::ProbeError,
};

/// First `.m3u8` URL found in a player page
pub static MANIFEST_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+\.m3u8[^\s"'<>]*"#).unwrap());

/// Response bodies are never read past this
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// HTTP statuses a probe treats as "alive"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedStatus(Vec<u16>);

impl AcceptedStatus {
    #[must_use]
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        let mut codes = codes.into_iter().collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        Self(codes)
    }

    #[must_use]
    pub fn accepts(&self, status: StatusCode) -> bool {
        self.0.binary_search(&status.as_u16()).is_ok()
    }
}

impl Default for AcceptedStatus {
    fn default() -> Self {
        Self(vec![200])
    }
}

impl FromStr for AcceptedStatus {
    type Err = String;

    /// `"200,451"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codes = s
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| {
                c.parse::<u16>()
                    .ok()
                    .filter(|c| (100..=999).contains(c))
                    .ok_or_else(|| format!("`{c}` is not an HTTP status code"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if codes.is_empty() {
            return Err("At least one accepted status code is required".to_string());
        }
        Ok(Self::new(codes))
    }
}

impl fmt::Display for AcceptedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes = self.0.iter().map(u16::to_string).collect::<Vec<_>>();
        f.write_str(&codes.join(","))
    }
}

/// How a candidate's `probe_target` is turned into a stream URL
#[derive(Debug, Clone)]
pub enum ProbeStrategy {
    /// The target is the stream; it is alive iff it answers with an accepted status
    Liveness { accepted: AcceptedStatus },

    /// Like [`ProbeStrategy::Liveness`], and the body must parse as an HLS playlist
    Manifest { accepted: AcceptedStatus },

    /// The target is a player page; the stream is the first match of `pattern` in it.
    /// When `pattern` has a capture group, the first group is used instead of the whole match.
    Extract {
        accepted: AcceptedStatus,
        pattern: Regex,
    },
}

impl ProbeStrategy {
    #[must_use]
    pub fn extract(accepted: AcceptedStatus) -> Self {
        Self::Extract {
            accepted,
            pattern: MANIFEST_URL_REGEX.clone(),
        }
    }

    #[must_use]
    pub const fn accepted(&self) -> &AcceptedStatus {
        match self {
            Self::Liveness { accepted }
            | Self::Manifest { accepted }
            | Self::Extract { accepted, .. } => accepted,
        }
    }

    /// Issues a single probe request for `candidate`
    ///
    /// # Errors
    /// Errors on network failure, unaccepted status, or when the body doesn't hold what the strategy looks for.
    #[instrument(skip(self, client, candidate), fields(channel = %candidate.display_name))]
    pub async fn probe(
        &self,
        client: &reqwest::Client,
        candidate: &Candidate,
    ) -> Result<String, ProbeError> {
        let mut req = client.get(&candidate.probe_target);
        if let Some(user_agent) = candidate.attributes.get(HTTP_USER_AGENT) {
            req = req.header(USER_AGENT, user_agent);
        }
        if let Some(referrer) = candidate.attributes.get(HTTP_REFERRER) {
            req = req.header(REFERER, referrer);
        }

        let res = req.send().await?;
        let status = res.status();
        trace!("HTTP {status}");
        if !self.accepted().accepts(status) {
            return Err(ProbeError::Status(status.as_u16()));
        }

        match self {
            Self::Liveness { .. } => Ok(candidate.probe_target.clone()),
            Self::Manifest { .. } => {
                let body = read_capped(res).await?;
                m3u8_rs::parse_playlist_res(&body).map_err(|_| ProbeError::InvalidManifest)?;
                Ok(candidate.probe_target.clone())
            }
            Self::Extract { pattern, .. } => {
                let body = read_capped(res).await?;
                extract_manifest_url(pattern, &String::from_utf8_lossy(&body))
                    .ok_or(ProbeError::NoManifest)
            }
        }
    }
}

/// Finds the media manifest URL in a page body
#[must_use]
pub fn extract_manifest_url(pattern: &Regex, body: &str) -> Option<String> {
    let captures = pattern.captures(body)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
}

async fn read_capped(res: reqwest::Response) -> Result<Vec<u8>, ProbeError> {
    let mut body = Vec::new();
    let mut stream = res.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = MAX_BODY_BYTES - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= MAX_BODY_BYTES {
            break;
        }
    }

    Ok(body)
}
