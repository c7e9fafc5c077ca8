use crate::{ChoiceId, ProposalId, TallyId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A selectable option within a proposal as persisted by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalChoice {
    pub id: ChoiceId,
    pub proposal: ProposalId,
    pub name: String,
    /// 1-based position in the remote declaration order. Unique within a
    /// proposal and never changes.
    pub ordinal: u32,
    pub created_at: NaiveDateTime,
}

/// A choice declaration as reported by the remote source, before the store
/// has assigned it an id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChoice {
    pub ordinal: u32,
    pub name: String,
}

impl NewChoice {
    /// Numbers the choices in the order they are declared, starting at 1.
    pub fn from_declarations<I, S>(names: I) -> Vec<NewChoice>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .zip(1..)
            .map(|(name, ordinal)| NewChoice {
                ordinal,
                name: name.into(),
            })
            .collect()
    }
}

/// An aggregate vote count observed remotely for a choice identified only by
/// its ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedObservation {
    pub ordinal: u32,
    pub count: u64,
}

impl UnresolvedObservation {
    /// Counts individual votes by the ordinal they chose. The result is
    /// ordered by ordinal.
    pub fn count_votes(votes: impl IntoIterator<Item = u32>) -> Vec<UnresolvedObservation> {
        let mut counts = BTreeMap::<u32, u64>::new();
        for ordinal in votes {
            *counts.entry(ordinal).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(ordinal, count)| UnresolvedObservation { ordinal, count })
            .collect()
    }
}

/// An observation whose ordinal has been matched to a persisted choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedObservation {
    pub choice: ChoiceId,
    pub ordinal: u32,
    pub count: u64,
}

impl ResolvedObservation {
    pub fn into_tally(self, created_at: NaiveDateTime) -> NewTally {
        NewTally {
            choice: self.choice,
            count: self.count,
            created_at,
        }
    }
}

/// A tally ready to be appended to a choice's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewTally {
    pub choice: ChoiceId,
    pub count: u64,
    pub created_at: NaiveDateTime,
}

/// One point in the append-only count history of a choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub id: TallyId,
    pub choice: ChoiceId,
    pub count: u64,
    pub created_at: NaiveDateTime,
}

/// An observation referred to an ordinal with no persisted choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unresolved {
    pub ordinal: u32,
}

impl core::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "no persisted choice has ordinal {}", self.ordinal)
    }
}

/// Matches every observation to the persisted choice with the same ordinal.
///
/// Resolution is all or nothing: the first ordinal without a matching choice
/// is returned as an error and none of the observations are resolved.
pub fn resolve(
    observations: &[UnresolvedObservation],
    choices: &[ProposalChoice],
) -> Result<Vec<ResolvedObservation>, Unresolved> {
    let by_ordinal = choices
        .iter()
        .map(|choice| (choice.ordinal, choice.id))
        .collect::<BTreeMap<_, _>>();

    observations
        .iter()
        .map(|observation| match by_ordinal.get(&observation.ordinal) {
            Some(choice) => Ok(ResolvedObservation {
                choice: *choice,
                ordinal: observation.ordinal,
                count: observation.count,
            }),
            None => Err(Unresolved {
                ordinal: observation.ordinal,
            }),
        })
        .collect()
}
