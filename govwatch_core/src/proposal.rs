use crate::{Identified, ProposalId, SpaceId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A vote instance within a [`Space`](crate::Space).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub space: SpaceId,
    /// Address of the submitter.
    pub address: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub name: String,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub watched: bool,
}

impl Identified for Proposal {
    type Id = ProposalId;

    fn id(&self) -> &ProposalId {
        &self.id
    }
}
