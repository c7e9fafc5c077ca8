use crate::{Identified, NetworkId, SpaceId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A governance community.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    /// `None` when the remote source reports a chain we don't know about.
    pub network: Option<NetworkId>,
    pub symbol: String,
    pub created_at: NaiveDateTime,
    /// Set by the operator only.
    pub watched: bool,
}

impl Identified for Space {
    type Id = SpaceId;

    fn id(&self) -> &SpaceId {
        &self.id
    }
}
