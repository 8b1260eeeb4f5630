//! Where candidates come from and how each one is confirmed

use async_trait::async_trait;

use crate::{
    channel::Candidate,
    error::{DiscoveryError, ProbeError},
};

pub mod playlist;
pub mod probe;

pub use playlist::{PlaylistLocation, PlaylistSource};
pub use probe::{AcceptedStatus, ProbeStrategy};

/// A pluggable channel provider: hands the pipeline a batch of candidates,
/// then turns each one into a usable stream URL
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Human readable name, used in logs and errors
    fn describe(&self) -> String;

    /// Produces the candidate batch, numbered from 0 in discovery order
    async fn discover(&self) -> Result<Vec<Candidate>, DiscoveryError>;

    /// Confirms or derives the final stream URL of a candidate
    async fn probe(&self, candidate: &Candidate) -> Result<String, ProbeError>;
}
