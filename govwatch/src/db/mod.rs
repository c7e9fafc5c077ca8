use async_trait::async_trait;
use govwatch_core::{
    chrono::NaiveDateTime, ChoiceId, Network, NewChoice, NewTally, Proposal, ProposalChoice,
    ProposalId, Space, SpaceId, VoteTally,
};
pub mod in_memory;
pub mod postgres;

pub type Error = anyhow::Error;

/// Returned (inside [`Error`]) when an insert would create a second record
/// with an identity that is already stored.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{kind} '{id}' already exists")]
pub struct DuplicateIdentity {
    pub kind: &'static str,
    pub id: String,
}

impl DuplicateIdentity {
    pub fn new(kind: &'static str, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalQuery<'a> {
    pub space: Option<&'a SpaceId>,
    pub watched: Option<bool>,
}

#[async_trait]
pub trait DbRead: Send + Sync {
    async fn list_spaces(&self, watched: Option<bool>) -> Result<Vec<Space>, Error>;
    async fn get_space(&self, id: &SpaceId) -> Result<Option<Space>, Error>;
    async fn list_proposals(&self, query: ProposalQuery<'_>) -> Result<Vec<Proposal>, Error>;
    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, Error>;
    /// Choices of a proposal ordered by ordinal.
    async fn list_choices(&self, proposal: &ProposalId) -> Result<Vec<ProposalChoice>, Error>;
    /// The most recently observed tally of a choice. Ties on the timestamp
    /// go to the tally inserted last.
    async fn latest_tally(&self, choice: ChoiceId) -> Result<Option<VoteTally>, Error>;
    /// The tally history of a choice, oldest first.
    async fn list_tallies(&self, choice: ChoiceId) -> Result<Vec<VoteTally>, Error>;
    async fn list_networks(&self) -> Result<Vec<Network>, Error>;
}

#[async_trait]
pub trait DbWrite: Send + Sync {
    async fn insert_space(&self, space: Space) -> Result<(), Error>;
    /// Deletes the space along with its proposals. Returns whether it existed.
    async fn delete_space(&self, id: &SpaceId) -> Result<bool, Error>;
    async fn insert_proposal(&self, proposal: Proposal) -> Result<(), Error>;
    /// Deletes the proposal along with its choices and their tallies.
    async fn delete_proposal(&self, id: &ProposalId) -> Result<bool, Error>;
    /// Persists the full choice list of a proposal in one go. Fails with
    /// [`DuplicateIdentity`] if the proposal already has choices.
    async fn insert_choices(
        &self,
        proposal: &ProposalId,
        choices: Vec<NewChoice>,
        created_at: NaiveDateTime,
    ) -> Result<Vec<ProposalChoice>, Error>;
    async fn insert_tally(&self, tally: NewTally) -> Result<VoteTally, Error>;
    async fn set_space_watched(&self, id: &SpaceId, watched: bool) -> Result<bool, Error>;
    async fn set_proposal_watched(&self, id: &ProposalId, watched: bool) -> Result<bool, Error>;
}

pub trait Db: DbRead + DbWrite + Send + Sync + 'static {}
