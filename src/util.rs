use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, USER_AGENT};
use rlimit::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File descriptors kept aside for everything that isn't a probe connection
const FD_HEADROOM: u64 = 64;

#[must_use]
pub fn default_user_agent() -> String {
    format!(
        "{}/{} (+{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_REPOSITORY")
    )
}

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("Invalid user agent")]
    UserAgent(#[from] InvalidHeaderValue),

    #[error("Unable to build HTTP client")]
    Build(#[from] reqwest::Error),
}

/// Builds the client shared by discovery and every probe
///
/// # Errors
/// Errors when `user_agent` isn't a valid header value or the TLS backend fails to initialize
pub fn init_http_client(
    user_agent: Option<&str>,
    connect_timeout: Duration,
) -> Result<reqwest::Client, HttpClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent.unwrap_or(&default_user_agent()))?,
    );

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .build()?)
}

/// Warns when the open file limit is too low for `max_in_flight` simultaneous probe connections
pub fn warn_ulimit(max_in_flight: usize) {
    let limit = match rlimit::getrlimit(Resource::NOFILE) {
        Ok((limit, _)) => limit,
        Err(e) => {
            debug!("Unable to read file limit: {e}");
            return;
        }
    };

    let needed = max_in_flight as u64 + FD_HEADROOM;
    if limit < needed {
        warn!(
            "Your file limit ({limit}) is too low for {max_in_flight} parallel probes, some will fail with network errors. Consider raising it via `ulimit -n {}` or lowering --max-in-flight",
            needed.next_power_of_two()
        );
    }
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal!");
        ct.cancel();
    });
}
