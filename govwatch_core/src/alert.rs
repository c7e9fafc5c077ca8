use crate::{Proposal, Space};
use serde::{Deserialize, Serialize};

/// A human readable notification. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
}

impl core::fmt::Display for Change {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Change::Added => "added",
            Change::Removed => "removed",
        })
    }
}

impl Alert {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Alert {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn spaces(change: Change, spaces: &[Space]) -> Self {
        Alert::new(
            format!("Found {} recently {} space(s)", spaces.len(), change),
            spaces
                .iter()
                .map(|space| space.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn proposals(change: Change, space: &Space, proposals: &[Proposal]) -> Self {
        Alert::new(
            format!(
                "Found {} recently {} proposal(s) for {}",
                proposals.len(),
                change,
                space.name
            ),
            proposals
                .iter()
                .map(|proposal| proposal.name.as_str())
                .collect::<Vec<_>>()
                .join(",\n"),
        )
    }
}

impl core::fmt::Display for Alert {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}
