use async_trait::async_trait;
use govwatch_core::{NewChoice, Proposal, ProposalId, Space, SpaceId, UnresolvedObservation};
pub mod snapshot_hub;

pub use snapshot_hub::SnapshotHub;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("unexpected payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

/// Read-only access to the current state of the remote governance platform.
///
/// Records returned have `watched` unset and `created_at` stamped with the
/// time they were fetched.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_spaces(&self) -> Result<Vec<Space>, FetchError>;
    async fn fetch_proposals(&self, space: &SpaceId) -> Result<Vec<Proposal>, FetchError>;
    /// Choice declarations in remote order, numbered from 1.
    async fn fetch_choices(
        &self,
        proposal: &ProposalId,
        space: &SpaceId,
    ) -> Result<Vec<NewChoice>, FetchError>;
    /// Recounts every vote the remote source currently reports for the
    /// proposal. Ordered by ordinal.
    async fn fetch_vote_observations(
        &self,
        proposal: &ProposalId,
        space: &SpaceId,
    ) -> Result<Vec<UnresolvedObservation>, FetchError>;
}
