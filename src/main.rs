#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use m3u_refinery::{
    NormalizeOptions, PipelineConfig, PlaylistLocation, PlaylistSource, ProbeStrategy,
    ResolveOptions,
    playlist::RenderOptions,
    source::{AcceptedStatus, probe::MANIFEST_URL_REGEX},
    util::{init_http_client, spawn_ct_watcher, warn_ulimit},
};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_REMOTE_OUTPUT: &str = "playlist.m3u";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProbeKind {
    /// The channel URL must answer with an accepted status
    Liveness,
    /// The channel URL must answer with an accepted status and an HLS playlist
    Manifest,
    /// The channel URL is a player page holding the stream's .m3u8 URL
    Extract,
}

/// Probes every channel of an IPTV playlist and writes back the working ones,
/// deduplicated and with rare tags folded together
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Playlist to refine, a local path or an http(s) URL
    #[arg(env = "INPUT")]
    input: String,

    /// Where to write the refined playlist [default: the input file, or `playlist.m3u` for a URL]
    #[arg(short, long, env = "OUTPUT_PATH")]
    output: Option<PathBuf>,

    /// How channels are confirmed
    #[arg(long, value_enum, env = "PROBE_KIND", default_value_t = ProbeKind::Liveness)]
    probe: ProbeKind,

    /// The amount of probes running at once
    #[arg(short = 'j', long, env = "MAX_IN_FLIGHT", default_value_t = 50)]
    max_in_flight: usize,

    /// Seconds a single probe may take
    #[arg(short = 't', long, env = "PROBE_TIMEOUT_SECS", default_value_t = 10)]
    probe_timeout: u64,

    /// Comma separated HTTP statuses counted as alive
    #[arg(long, env = "ACCEPTED_STATUS", default_value = "200")]
    accepted_status: AcceptedStatus,

    /// Extra attempts for a failed probe
    #[arg(long, env = "PROBE_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Milliseconds to wait between attempts
    #[arg(long, env = "PROBE_RETRY_DELAY_MS", default_value_t = 500)]
    retry_delay_ms: u64,

    /// Pattern locating the stream URL in player pages (`--probe extract`)
    #[arg(long, env = "MANIFEST_PATTERN")]
    manifest_pattern: Option<Regex>,

    /// Attribute whose rare values get folded into the sentinel
    #[arg(long, env = "TAG_ATTRIBUTE", default_value = "tvg-language")]
    tag_attribute: String,

    /// Tags used by this many channels or fewer are replaced by the sentinel
    #[arg(long, env = "RARITY_THRESHOLD", default_value_t = 3)]
    rarity_threshold: usize,

    /// Replacement for rare tags
    #[arg(long, env = "SENTINEL_TAG", default_value = "Unknown")]
    sentinel_tag: String,

    /// User agent sent with every request, unless a channel sets its own
    #[arg(long, env = "USER_AGENT")]
    user_agent: Option<String>,

    /// `group-title` given to channels that have none
    #[arg(long, env = "DEFAULT_GROUP")]
    default_group: Option<String>,

    /// Adds a `# Generated at` line to the playlist (output then differs between runs)
    #[arg(long)]
    timestamp: bool,

    /// Hides the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Prints the run summary as JSON on stdout
    #[arg(long)]
    json_summary: bool,
}

impl Args {
    fn strategy(&self) -> ProbeStrategy {
        let accepted = self.accepted_status.clone();
        match self.probe {
            ProbeKind::Liveness => ProbeStrategy::Liveness { accepted },
            ProbeKind::Manifest => ProbeStrategy::Manifest { accepted },
            ProbeKind::Extract => ProbeStrategy::Extract {
                accepted,
                pattern: self
                    .manifest_pattern
                    .clone()
                    .unwrap_or_else(|| MANIFEST_URL_REGEX.clone()),
            },
        }
    }

    fn pipeline_config(&self, location: &PlaylistLocation) -> PipelineConfig {
        let output = self.output.clone().unwrap_or_else(|| match location {
            PlaylistLocation::File(path) => path.clone(),
            PlaylistLocation::Url(_) => PathBuf::from(DEFAULT_REMOTE_OUTPUT),
        });

        PipelineConfig {
            resolve: ResolveOptions {
                max_in_flight: self.max_in_flight.max(1),
                per_probe_timeout: Duration::from_secs(self.probe_timeout),
                retries: self.retries,
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                show_progress: !self.no_progress,
            },
            normalize: NormalizeOptions {
                tag_attribute: self.tag_attribute.clone(),
                threshold: self.rarity_threshold,
                sentinel: self.sentinel_tag.clone(),
            },
            render: RenderOptions {
                generated_at: self.timestamp.then(chrono::Utc::now),
                default_group: self.default_group.clone(),
            },
            output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    debug!("{args:?}");
    warn_ulimit(args.max_in_flight);

    let client = init_http_client(args.user_agent.as_deref(), Duration::from_secs(10))
        .context("Initializing HTTP client")?;
    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());

    let location = PlaylistLocation::from_input(&args.input);
    let config = args.pipeline_config(&location);
    info!("Refining {location} into {:?}", config.output);

    let source = Arc::new(PlaylistSource::new(location, args.strategy(), client));
    let summary = m3u_refinery::run(source, &config, &ct)
        .await
        .context("Refining playlist")?;

    if args.json_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Encoding run summary")?
        );
    }

    info!("All done successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_follow_input_kind() {
        let args = Args::parse_from(["m3u-refinery", "lists/channels.m3u"]);
        let location = PlaylistLocation::from_input(&args.input);
        let config = args.pipeline_config(&location);
        assert_eq!(config.output, PathBuf::from("lists/channels.m3u"));
        assert!(config.render.default_group.is_none());

        let args = Args::parse_from(["m3u-refinery", "https://host/list.m3u"]);
        let location = PlaylistLocation::from_input(&args.input);
        assert_eq!(
            args.pipeline_config(&location).output,
            PathBuf::from(DEFAULT_REMOTE_OUTPUT)
        );
    }

    #[test]
    fn flags_reach_the_pipeline() {
        let args = Args::parse_from([
            "m3u-refinery",
            "in.m3u",
            "-o",
            "out.m3u",
            "-j",
            "75",
            "-t",
            "6",
            "--accepted-status",
            "200,451",
            "--rarity-threshold",
            "5",
            "--sentinel-tag",
            "Other",
            "--probe",
            "extract",
            "--no-progress",
            "--default-group",
            "Uncategorized",
        ]);
        let config = args.pipeline_config(&PlaylistLocation::from_input(&args.input));

        assert_eq!(config.output, PathBuf::from("out.m3u"));
        assert_eq!(config.resolve.max_in_flight, 75);
        assert_eq!(config.resolve.per_probe_timeout, Duration::from_secs(6));
        assert!(!config.resolve.show_progress);
        assert_eq!(config.normalize.threshold, 5);
        assert_eq!(config.normalize.sentinel, "Other");
        assert!(config.render.generated_at.is_none());
        assert_eq!(config.render.default_group.as_deref(), Some("Uncategorized"));

        let ProbeStrategy::Extract { accepted, pattern } = args.strategy() else {
            panic!("expected the extract strategy");
        };
        assert_eq!(accepted.to_string(), "200,451");
        assert_eq!(pattern.as_str(), MANIFEST_URL_REGEX.as_str());
    }
}
