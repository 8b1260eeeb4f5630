//! Probes the channels of an IPTV playlist and writes back a deduplicated,
//! tidied playlist of the streams that answered.
//!
//! Data flows one way: a [`ChannelSource`](source::ChannelSource) discovers
//! [`Candidate`](channel::Candidate)s, the [`resolver`] probes them concurrently,
//! then the [`pipeline`] aggregates, deduplicates, normalizes and writes them.

pub mod channel;
pub mod error;
pub mod pipeline;
pub mod playlist;
pub mod resolver;
pub mod source;
pub mod util;

pub use channel::{Attributes, Candidate, PlaylistEntry, ResolutionOutcome};
pub use error::{DiscoveryError, PipelineError, ProbeError, SerializationError};
pub use pipeline::{NormalizeOptions, PipelineConfig, RunSummary, run};
pub use resolver::{ResolveOptions, resolve};
pub use source::{ChannelSource, PlaylistLocation, PlaylistSource, ProbeStrategy};
