use std::{collections::HashSet, hash::Hash};

/// A record that has a stable identity.
pub trait Identified {
    type Id: Eq + Hash + Clone;

    fn id(&self) -> &Self::Id;
}

/// The classification of every identity seen in a remote and a local
/// snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Diff<T> {
    /// Remote records with no local counterpart, in remote order.
    pub added: Vec<T>,
    /// Local records with no remote counterpart, in local order.
    pub removed: Vec<T>,
    /// Local records that are still present remotely.
    pub unchanged: Vec<T>,
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes which identities were added and removed remotely.
///
/// Only presence is compared. A record whose attributes changed remotely
/// stays in `unchanged` with its local attributes. Remote records repeating
/// an identity already seen are ignored.
pub fn diff<T: Identified>(remote: Vec<T>, local: Vec<T>) -> Diff<T> {
    let local_ids = local.iter().map(|l| l.id().clone()).collect::<HashSet<_>>();
    let mut remote_ids = HashSet::with_capacity(remote.len());

    let added = remote
        .into_iter()
        .filter(|r| remote_ids.insert(r.id().clone()))
        .filter(|r| !local_ids.contains(r.id()))
        .collect();

    let (unchanged, removed): (Vec<T>, Vec<T>) = local
        .into_iter()
        .partition(|l| remote_ids.contains(l.id()));

    Diff {
        added,
        removed,
        unchanged,
    }
}
