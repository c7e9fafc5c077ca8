use crate::db::*;
use anyhow::anyhow;
use async_trait::async_trait;
use govwatch_core::{NetworkId, TallyId};
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Clone)]
pub struct InMemory {
    inner: Arc<RwLock<Tables>>,
}

struct Tables {
    networks: BTreeMap<NetworkId, Network>,
    spaces: BTreeMap<SpaceId, Space>,
    proposals: BTreeMap<ProposalId, Proposal>,
    choices: BTreeMap<ChoiceId, ProposalChoice>,
    tallies: BTreeMap<TallyId, VoteTally>,
    last_choice_id: i64,
    last_tally_id: i64,
}

impl Default for InMemory {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tables {
                networks: Network::known()
                    .into_iter()
                    .map(|network| (network.id, network))
                    .collect(),
                spaces: BTreeMap::default(),
                proposals: BTreeMap::default(),
                choices: BTreeMap::default(),
                tallies: BTreeMap::default(),
                last_choice_id: 0,
                last_tally_id: 0,
            })),
        }
    }
}

impl InMemory {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, Error> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory database lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, Error> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory database lock poisoned"))
    }
}

impl Tables {
    fn remove_proposal(&mut self, id: &ProposalId) -> bool {
        let existed = self.proposals.remove(id).is_some();
        let choices = self
            .choices
            .values()
            .filter(|choice| &choice.proposal == id)
            .map(|choice| choice.id)
            .collect::<Vec<_>>();
        for choice in &choices {
            self.choices.remove(choice);
        }
        self.tallies.retain(|_, tally| !choices.contains(&tally.choice));
        existed
    }
}

#[async_trait]
impl DbRead for InMemory {
    async fn list_spaces(&self, watched: Option<bool>) -> Result<Vec<Space>, Error> {
        let db = self.read()?;
        Ok(db
            .spaces
            .values()
            .filter(|space| watched.map_or(true, |watched| space.watched == watched))
            .cloned()
            .collect())
    }

    async fn get_space(&self, id: &SpaceId) -> Result<Option<Space>, Error> {
        Ok(self.read()?.spaces.get(id).cloned())
    }

    async fn list_proposals(&self, query: ProposalQuery<'_>) -> Result<Vec<Proposal>, Error> {
        let ProposalQuery { space, watched } = query;
        let db = self.read()?;
        Ok(db
            .proposals
            .values()
            .filter(|proposal| space.map_or(true, |space| &proposal.space == space))
            .filter(|proposal| watched.map_or(true, |watched| proposal.watched == watched))
            .cloned()
            .collect())
    }

    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, Error> {
        Ok(self.read()?.proposals.get(id).cloned())
    }

    async fn list_choices(&self, proposal: &ProposalId) -> Result<Vec<ProposalChoice>, Error> {
        let db = self.read()?;
        let mut choices = db
            .choices
            .values()
            .filter(|choice| &choice.proposal == proposal)
            .cloned()
            .collect::<Vec<_>>();
        choices.sort_by_key(|choice| choice.ordinal);
        Ok(choices)
    }

    async fn latest_tally(&self, choice: ChoiceId) -> Result<Option<VoteTally>, Error> {
        let db = self.read()?;
        Ok(db
            .tallies
            .values()
            .filter(|tally| tally.choice == choice)
            .max_by_key(|tally| (tally.created_at, tally.id))
            .cloned())
    }

    async fn list_tallies(&self, choice: ChoiceId) -> Result<Vec<VoteTally>, Error> {
        let db = self.read()?;
        let mut tallies = db
            .tallies
            .values()
            .filter(|tally| tally.choice == choice)
            .cloned()
            .collect::<Vec<_>>();
        tallies.sort_by_key(|tally| (tally.created_at, tally.id));
        Ok(tallies)
    }

    async fn list_networks(&self) -> Result<Vec<Network>, Error> {
        Ok(self.read()?.networks.values().cloned().collect())
    }
}

#[async_trait]
impl DbWrite for InMemory {
    async fn insert_space(&self, space: Space) -> Result<(), Error> {
        let mut db = self.write()?;
        if db.spaces.contains_key(&space.id) {
            return Err(DuplicateIdentity::new("space", &space.id).into());
        }
        if let Some(network) = space.network {
            if !db.networks.contains_key(&network) {
                return Err(anyhow!("space {} refers to unknown network {}", space.id, network));
            }
        }
        db.spaces.insert(space.id.clone(), space);
        Ok(())
    }

    async fn delete_space(&self, id: &SpaceId) -> Result<bool, Error> {
        let mut db = self.write()?;
        let existed = db.spaces.remove(id).is_some();
        let proposals = db
            .proposals
            .values()
            .filter(|proposal| &proposal.space == id)
            .map(|proposal| proposal.id.clone())
            .collect::<Vec<_>>();
        for proposal in &proposals {
            db.remove_proposal(proposal);
        }
        Ok(existed)
    }

    async fn insert_proposal(&self, proposal: Proposal) -> Result<(), Error> {
        let mut db = self.write()?;
        if db.proposals.contains_key(&proposal.id) {
            return Err(DuplicateIdentity::new("proposal", &proposal.id).into());
        }
        if !db.spaces.contains_key(&proposal.space) {
            return Err(anyhow!(
                "proposal {} refers to space {} which does not exist",
                proposal.id,
                proposal.space
            ));
        }
        db.proposals.insert(proposal.id.clone(), proposal);
        Ok(())
    }

    async fn delete_proposal(&self, id: &ProposalId) -> Result<bool, Error> {
        Ok(self.write()?.remove_proposal(id))
    }

    async fn insert_choices(
        &self,
        proposal: &ProposalId,
        choices: Vec<NewChoice>,
        created_at: NaiveDateTime,
    ) -> Result<Vec<ProposalChoice>, Error> {
        let mut db = self.write()?;
        if !db.proposals.contains_key(proposal) {
            return Err(anyhow!(
                "cannot add choices to proposal {} which does not exist",
                proposal
            ));
        }
        if db.choices.values().any(|choice| &choice.proposal == proposal) {
            return Err(DuplicateIdentity::new("choices of proposal", proposal).into());
        }
        let mut ordinals = choices.iter().map(|choice| choice.ordinal).collect::<Vec<_>>();
        ordinals.sort_unstable();
        if ordinals.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(DuplicateIdentity::new("choice ordinal of proposal", proposal).into());
        }

        let mut inserted = Vec::with_capacity(choices.len());
        for NewChoice { ordinal, name } in choices {
            db.last_choice_id += 1;
            let choice = ProposalChoice {
                id: ChoiceId::from(db.last_choice_id),
                proposal: proposal.clone(),
                name,
                ordinal,
                created_at,
            };
            db.choices.insert(choice.id, choice.clone());
            inserted.push(choice);
        }
        Ok(inserted)
    }

    async fn insert_tally(&self, tally: NewTally) -> Result<VoteTally, Error> {
        let mut db = self.write()?;
        if !db.choices.contains_key(&tally.choice) {
            return Err(anyhow!(
                "cannot add tally for choice {} which does not exist",
                tally.choice
            ));
        }
        db.last_tally_id += 1;
        let tally = VoteTally {
            id: TallyId::from(db.last_tally_id),
            choice: tally.choice,
            count: tally.count,
            created_at: tally.created_at,
        };
        db.tallies.insert(tally.id, tally.clone());
        Ok(tally)
    }

    async fn set_space_watched(&self, id: &SpaceId, watched: bool) -> Result<bool, Error> {
        Ok(match self.write()?.spaces.get_mut(id) {
            Some(space) => {
                space.watched = watched;
                true
            }
            None => false,
        })
    }

    async fn set_proposal_watched(&self, id: &ProposalId, watched: bool) -> Result<bool, Error> {
        Ok(match self.write()?.proposals.get_mut(id) {
            Some(proposal) => {
                proposal.watched = watched;
                true
            }
            None => false,
        })
    }
}

impl Db for InMemory {}

#[cfg(test)]
crate::run_store_tests! {
    db => db,
    {
        use std::sync::Arc;
        let db: Arc<dyn Db> = Arc::new(InMemory::default());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let db = InMemory::default();
        let other = db.clone();
        other
            .insert_space(crate::db::test::space("shared", "Shared"))
            .await
            .unwrap();
        assert!(db.get_space(&SpaceId::new("shared")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn seeded_with_known_networks() {
        let db = InMemory::default();
        assert_eq!(db.list_networks().await.unwrap().len(), Network::known().len());
    }
}
