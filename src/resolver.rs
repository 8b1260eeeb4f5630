use std::{sync::Arc, time::Duration};

use tokio::{select, sync::Semaphore, task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    channel::{Candidate, ResolutionOutcome},
    error::ProbeError,
    source::ChannelSource,
};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Upper bound of probes running at the same time
    pub max_in_flight: usize,
    /// Bound of a single probe attempt
    pub per_probe_timeout: Duration,
    /// Extra attempts after a failed one. 0 means a single attempt.
    pub retries: u32,
    pub retry_delay: Duration,
    pub show_progress: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 50,
            per_probe_timeout: Duration::from_secs(10),
            retries: 0,
            retry_delay: Duration::from_millis(500),
            show_progress: false,
        }
    }
}

/// Probes every candidate with at most `options.max_in_flight` probes running at once
///
/// Returns one outcome per candidate, in the same order as `candidates`, whatever order probes finish in.
/// A failing, slow or panicking probe only affects its own outcome.
///
/// Once `ct` is cancelled no new probe starts and in-flight ones are dropped;
/// their outcomes are [`ProbeError::Cancelled`].
#[instrument(skip_all, fields(candidates = candidates.len(), max_in_flight = options.max_in_flight))]
pub async fn resolve<S>(
    candidates: &[Candidate],
    source: Arc<S>,
    options: &ResolveOptions,
    ct: &CancellationToken,
) -> Vec<ResolutionOutcome>
where
    S: ChannelSource + ?Sized + 'static,
{
    let permits = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
    let pb = progress_bar(candidates.len(), options.show_progress);
    let mut probe_tasks = JoinSet::new();

    for (slot, candidate) in candidates.iter().enumerate() {
        let candidate = candidate.clone();
        let source = source.clone();
        let permits = permits.clone();
        let options = options.clone();
        let ct = ct.clone();

        probe_tasks.spawn(async move {
            let result = select! {
                biased;
                () = ct.cancelled() => Err(ProbeError::Cancelled),
                result = async {
                    let Ok(_permit) = permits.acquire().await else {
                        return Err(ProbeError::Cancelled);
                    };
                    probe_with_retries(source.as_ref(), &candidate, &options).await
                } => result,
            };

            (
                slot,
                ResolutionOutcome {
                    candidate_index: candidate.index,
                    result,
                },
            )
        });
    }

    let mut slots: Vec<Option<ResolutionOutcome>> = vec![None; candidates.len()];
    while let Some(joined) = probe_tasks.join_next().await {
        match joined {
            Ok((slot, outcome)) => {
                match &outcome.result {
                    Ok(url) => debug!("Channel #{} resolved to {url}", outcome.candidate_index),
                    Err(e) => debug!("Channel #{} failed: {e}", outcome.candidate_index),
                }
                slots[slot] = Some(outcome);
            }
            Err(e) => error!("Probe task crashed: {e}"),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let outcomes = slots
        .into_iter()
        .zip(candidates)
        .map(|(outcome, candidate)| {
            outcome.unwrap_or_else(|| ResolutionOutcome {
                candidate_index: candidate.index,
                result: Err(ProbeError::Panicked),
            })
        })
        .collect::<Vec<_>>();

    info!(
        "Probed {} channels, {} answered",
        outcomes.len(),
        outcomes.iter().filter(|o| o.result.is_ok()).count()
    );
    outcomes
}

async fn probe_with_retries<S>(
    source: &S,
    candidate: &Candidate,
    options: &ResolveOptions,
) -> Result<String, ProbeError>
where
    S: ChannelSource + ?Sized,
{
    let mut attempt = 0;
    loop {
        let result = match timeout(options.per_probe_timeout, source.probe(candidate)).await {
            Ok(Ok(url)) if url.trim().is_empty() => Err(ProbeError::EmptyUrl),
            // Would break the one-URL-per-line playlist layout
            Ok(Ok(url)) if url.contains(char::is_whitespace) => {
                Err(ProbeError::MalformedUrl(url))
            }
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(options.per_probe_timeout)),
        };

        match result {
            Err(e) if attempt < options.retries && e != ProbeError::Cancelled => {
                attempt += 1;
                debug!(
                    "Channel #{} attempt {attempt} failed ({e}), retrying in {:?}",
                    candidate.index, options.retry_delay
                );
                tokio::time::sleep(options.retry_delay).await;
            }
            result => return result,
        }
    }
}

fn progress_bar(len: usize, visible: bool) -> indicatif::ProgressBar {
    if !visible {
        return indicatif::ProgressBar::hidden();
    }

    let pb = indicatif::ProgressBar::new(len as u64);
    if let Ok(style) = indicatif::ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} channels probed ({eta})",
    ) {
        pb.set_style(style);
    }
    pb
}
