use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace, warn};

use crate::{
    channel::{Candidate, PlaylistEntry, ResolutionOutcome, TVG_LANGUAGE},
    error::{DiscoveryError, PipelineError},
    playlist::{RenderOptions, render_playlist, write_atomically},
    resolver::{ResolveOptions, resolve},
    source::ChannelSource,
};

/// Rare tag collapsing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Attribute holding the tag, e.g. `tvg-language`
    pub tag_attribute: String,
    /// Tags seen this many times or fewer are replaced by `sentinel`
    pub threshold: usize,
    pub sentinel: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            tag_attribute: TVG_LANGUAGE.to_string(),
            threshold: 3,
            sentinel: "Unknown".to_string(),
        }
    }
}

/// Everything a run needs. Built once by the caller and passed down.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolve: ResolveOptions,
    pub normalize: NormalizeOptions,
    pub render: RenderOptions,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Candidates probed
    pub attempted: usize,
    /// Candidates that resolved to a stream URL
    pub resolved: usize,
    /// Entries written after dropping duplicate URLs
    pub unique: usize,
    /// Entries whose tag was replaced by the sentinel
    pub collapsed_tags: usize,
    /// Failed probes by error kind
    pub failures: BTreeMap<&'static str, usize>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} resolved, {} unique, {} rare tags collapsed",
            self.attempted, self.resolved, self.unique, self.collapsed_tags
        )?;
        if !self.failures.is_empty() {
            let failures = self
                .failures
                .iter()
                .map(|(kind, n)| format!("{kind}: {n}"))
                .collect::<Vec<_>>();
            write!(f, " (failures: {})", failures.join(", "))?;
        }
        Ok(())
    }
}

/// Discovers, probes, and consolidates a source's channels, then writes the playlist to `config.output`
///
/// Succeeds whenever the pipeline completes, however many probes failed.
///
/// # Errors
/// * Discovery failed or found no channel
/// * The playlist couldn't be written (a previous file is left intact)
/// * `ct` was cancelled while probing; nothing is written then
#[instrument(skip_all, fields(source = %source.describe(), output = ?config.output))]
pub async fn run<S>(
    source: Arc<S>,
    config: &PipelineConfig,
    ct: &CancellationToken,
) -> Result<RunSummary, PipelineError>
where
    S: ChannelSource + ?Sized + 'static,
{
    let candidates = source.discover().await?;
    if candidates.is_empty() {
        return Err(DiscoveryError::Empty(source.describe()).into());
    }

    info!(
        "Probing {} channels, {} at a time",
        candidates.len(),
        config.resolve.max_in_flight
    );
    let outcomes = resolve(&candidates, source, &config.resolve, ct).await;
    if ct.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let (entries, summary) = consolidate(outcomes, &candidates, &config.normalize);

    let text = render_playlist(&entries, &config.render);
    write_atomically(&config.output, &text).await?;

    info!("Playlist written to {:?}: {summary}", config.output);
    Ok(summary)
}

/// Aggregates, deduplicates and normalizes resolver outcomes into the entries to write
#[must_use]
pub fn consolidate(
    outcomes: Vec<ResolutionOutcome>,
    candidates: &[Candidate],
    options: &NormalizeOptions,
) -> (Vec<PlaylistEntry>, RunSummary) {
    let mut failures = BTreeMap::new();
    for e in outcomes.iter().filter_map(|o| o.result.as_ref().err()) {
        *failures.entry(e.kind()).or_default() += 1;
    }

    let entries = aggregate(outcomes, candidates);
    let resolved = entries.len();
    let mut entries = dedup(entries);
    let collapsed_tags = normalize(&mut entries, options);

    let summary = RunSummary {
        attempted: candidates.len(),
        resolved,
        unique: entries.len(),
        collapsed_tags,
        failures,
    };
    (entries, summary)
}

/// Pairs successful outcomes with their candidate, in ascending candidate index
///
/// Failed outcomes, empty URLs and outcomes pointing at an unknown candidate are dropped.
#[must_use]
pub fn aggregate(
    mut outcomes: Vec<ResolutionOutcome>,
    candidates: &[Candidate],
) -> Vec<PlaylistEntry> {
    let by_index = candidates
        .iter()
        .map(|c| (c.index, c))
        .collect::<HashMap<_, _>>();

    outcomes.sort_by_key(|o| o.candidate_index);
    outcomes
        .into_iter()
        .filter_map(|outcome| {
            let Some(candidate) = by_index.get(&outcome.candidate_index) else {
                warn!(
                    "Outcome for unknown channel #{}, ignoring",
                    outcome.candidate_index
                );
                return None;
            };

            match outcome.result {
                Ok(url) if !url.is_empty() => Some(PlaylistEntry {
                    candidate: (*candidate).clone(),
                    url,
                }),
                Ok(_) => None,
                Err(e) => {
                    trace!("Dropping {:?}: {e}", candidate.display_name);
                    None
                }
            }
        })
        .collect()
}

/// Keeps the first entry of every URL, preserving order
#[must_use]
pub fn dedup(entries: Vec<PlaylistEntry>) -> Vec<PlaylistEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.url.clone()))
        .collect()
}

/// Replaces tags shared by `threshold` entries or fewer with the sentinel
///
/// Must run on deduplicated entries, duplicates would inflate tag counts.
/// Entries without the tag (or with an empty one) count as carrying the sentinel.
///
/// Returns how many entries had their tag rewritten.
pub fn normalize(entries: &mut [PlaylistEntry], options: &NormalizeOptions) -> usize {
    let tag_of = |entry: &PlaylistEntry| -> String {
        entry
            .attribute(&options.tag_attribute)
            .filter(|t| !t.is_empty())
            .unwrap_or(&options.sentinel)
            .to_string()
    };

    let mut counts = HashMap::<String, usize>::new();
    for entry in entries.iter() {
        *counts.entry(tag_of(entry)).or_default() += 1;
    }

    let mut rewritten = 0;
    for entry in entries.iter_mut() {
        if counts[&tag_of(&*entry)] > options.threshold {
            continue;
        }
        if entry.attribute(&options.tag_attribute) != Some(options.sentinel.as_str()) {
            entry
                .candidate
                .attributes
                .set(options.tag_attribute.clone(), options.sentinel.clone());
            rewritten += 1;
        }
    }

    rewritten
}
