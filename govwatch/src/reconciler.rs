use crate::{
    db::{self, Db, DuplicateIdentity, ProposalQuery},
    fetcher::{FetchError, Fetcher},
    notifier::Notifier,
};
use govwatch_core::{
    chrono::{self, NaiveDateTime},
    diff, resolve, Alert, Change, Diff, Proposal, Space, Unresolved,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("remote source unavailable: {0}")]
    RemoteUnavailable(#[from] FetchError),
    #[error("unable to read from database: {0}")]
    DbRead(db::Error),
    #[error("unable to write to database: {0}")]
    DbWrite(db::Error),
    #[error("refusing to insert twice: {0}")]
    DuplicateIdentity(DuplicateIdentity),
}

impl SyncError {
    fn write(e: db::Error) -> Self {
        match e.downcast::<DuplicateIdentity>() {
            Ok(duplicate) => SyncError::DuplicateIdentity(duplicate),
            Err(e) => SyncError::DbWrite(e),
        }
    }
}

/// What a space or proposal sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl<T> From<&Diff<T>> for SyncReport {
    fn from(diff: &Diff<T>) -> Self {
        SyncReport {
            added: diff.added.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// The proposal had no choices and now has this many.
    Populated(usize),
    /// The proposal already had choices so nothing was fetched or written.
    AlreadyPopulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    Recorded { appended: usize, unchanged: usize },
    /// An observed ordinal has no persisted choice yet. Nothing was written.
    Deferred { ordinal: u32 },
}

/// Serializes operations on the same identity.
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    async fn lock(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // nobody else holds or waits on these
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Mirrors the remote governance platform into the store and raises alerts
/// for what changed.
pub struct Reconciler {
    db: Arc<dyn Db>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    logger: slog::Logger,
    locks: IdentityLocks,
}

impl Reconciler {
    pub fn new(
        db: Arc<dyn Db>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        logger: slog::Logger,
    ) -> Self {
        Self {
            db,
            fetcher,
            notifier,
            logger,
            locks: IdentityLocks::default(),
        }
    }

    pub fn db(&self) -> &Arc<dyn Db> {
        &self.db
    }

    async fn alert(&self, alert: Alert) {
        if let Err(e) = self.notifier.deliver(&alert).await {
            warn!(self.logger, "failed to deliver alert";
                  "title" => alert.title, "error" => e.to_string());
        }
    }

    /// Adds spaces that appeared remotely and deletes those that disappeared.
    pub async fn sync_spaces(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.lock("spaces".into()).await;
        let remote = self.fetcher.fetch_spaces().await?;
        let local = self
            .db
            .list_spaces(None)
            .await
            .map_err(SyncError::DbRead)?;

        let diff = diff(remote, local);
        let report = SyncReport::from(&diff);

        if !diff.added.is_empty() {
            self.alert(Alert::spaces(Change::Added, &diff.added)).await;
            for space in diff.added {
                self.db.insert_space(space).await.map_err(SyncError::write)?;
            }
        }

        if !diff.removed.is_empty() {
            self.alert(Alert::spaces(Change::Removed, &diff.removed)).await;
            for space in diff.removed {
                self.db
                    .delete_space(&space.id)
                    .await
                    .map_err(SyncError::DbWrite)?;
            }
        }

        Ok(report)
    }

    /// Mirrors the proposals of a space. Newly added proposals have their
    /// choices populated straight away.
    pub async fn sync_proposals(&self, space: &Space) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.lock(format!("space:{}", space.id)).await;
        let remote = self.fetcher.fetch_proposals(&space.id).await?;
        let local = self
            .db
            .list_proposals(ProposalQuery {
                space: Some(&space.id),
                ..Default::default()
            })
            .await
            .map_err(SyncError::DbRead)?;

        let diff = diff(remote, local);
        let report = SyncReport::from(&diff);

        if !diff.added.is_empty() {
            self.alert(Alert::proposals(Change::Added, space, &diff.added))
                .await;
            for proposal in diff.added {
                self.db
                    .insert_proposal(proposal.clone())
                    .await
                    .map_err(SyncError::write)?;
                // tallies can't be resolved until the choices exist
                if let Err(e) = self.sync_choices(&proposal).await {
                    warn!(self.logger, "choices of new proposal not populated";
                          "proposal" => proposal.id.as_str(), "error" => e.to_string());
                }
            }
        }

        if !diff.removed.is_empty() {
            self.alert(Alert::proposals(Change::Removed, space, &diff.removed))
                .await;
            for proposal in diff.removed {
                self.db
                    .delete_proposal(&proposal.id)
                    .await
                    .map_err(SyncError::DbWrite)?;
            }
        }

        Ok(report)
    }

    /// Persists the remote choice list of a proposal that has no choices yet.
    pub async fn sync_choices(&self, proposal: &Proposal) -> Result<ChoiceOutcome, SyncError> {
        let _guard = self.locks.lock(format!("proposal:{}", proposal.id)).await;
        let existing = self
            .db
            .list_choices(&proposal.id)
            .await
            .map_err(SyncError::DbRead)?;
        if !existing.is_empty() {
            return Ok(ChoiceOutcome::AlreadyPopulated);
        }

        let choices = self
            .fetcher
            .fetch_choices(&proposal.id, &proposal.space)
            .await?;
        if choices.is_empty() {
            return Ok(ChoiceOutcome::Populated(0));
        }

        let inserted = self
            .db
            .insert_choices(&proposal.id, choices, now())
            .await
            .map_err(SyncError::write)?;
        Ok(ChoiceOutcome::Populated(inserted.len()))
    }

    /// Appends a tally for every choice whose observed count differs from
    /// its latest persisted one.
    pub async fn sync_tallies(&self, proposal: &Proposal) -> Result<TallyOutcome, SyncError> {
        let _guard = self.locks.lock(format!("proposal:{}", proposal.id)).await;
        let observations = self
            .fetcher
            .fetch_vote_observations(&proposal.id, &proposal.space)
            .await?;
        let choices = self
            .db
            .list_choices(&proposal.id)
            .await
            .map_err(SyncError::DbRead)?;

        let resolved = match resolve(&observations, &choices) {
            Ok(resolved) => resolved,
            Err(Unresolved { ordinal }) => return Ok(TallyOutcome::Deferred { ordinal }),
        };

        let observed_at = now();
        let (mut appended, mut unchanged) = (0, 0);
        for observation in resolved {
            let latest = self
                .db
                .latest_tally(observation.choice)
                .await
                .map_err(SyncError::DbRead)?;
            if latest.map(|tally| tally.count) == Some(observation.count) {
                unchanged += 1;
                continue;
            }
            self.db
                .insert_tally(observation.into_tally(observed_at))
                .await
                .map_err(SyncError::DbWrite)?;
            appended += 1;
        }

        Ok(TallyOutcome::Recorded {
            appended,
            unchanged,
        })
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::{
        db::{
            in_memory::InMemory,
            test::{proposal, space},
            DbRead, DbWrite,
        },
        fetcher::test::FakeFetcher,
        notifier::test::{FailingNotifier, RecordingNotifier},
    };
    use govwatch_core::{ChoiceId, NewChoice, NewTally, ProposalId, SpaceId};
    use std::sync::atomic::Ordering;

    pub struct Fixture {
        pub db: Arc<InMemory>,
        pub fetcher: Arc<FakeFetcher>,
        pub alerts: RecordingNotifier,
        pub reconciler: Arc<Reconciler>,
    }

    pub fn fixture() -> Fixture {
        let db = Arc::new(InMemory::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let alerts = RecordingNotifier::default();
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            fetcher.clone(),
            Arc::new(alerts.clone()),
            slog::Logger::root(slog::Discard, o!()),
        ));
        Fixture {
            db,
            fetcher,
            alerts,
            reconciler,
        }
    }

    impl Fixture {
        pub async fn stored_proposal(&self, id: &str, choices: Vec<&str>) -> Proposal {
            self.db.insert_space(space("a", "Alpha")).await.ok();
            let proposal = proposal(id, "a", id);
            self.db.insert_proposal(proposal.clone()).await.unwrap();
            if !choices.is_empty() {
                self.db
                    .insert_choices(
                        &proposal.id,
                        NewChoice::from_declarations(choices),
                        crate::db::test::time(0),
                    )
                    .await
                    .unwrap();
            }
            proposal
        }

        async fn counts(&self, proposal: &Proposal) -> Vec<Vec<u64>> {
            let mut counts = vec![];
            for choice in self.db.list_choices(&proposal.id).await.unwrap() {
                counts.push(
                    self.db
                        .list_tallies(choice.id)
                        .await
                        .unwrap()
                        .into_iter()
                        .map(|tally| tally.count)
                        .collect(),
                );
            }
            counts
        }
    }

    #[tokio::test]
    async fn space_added_then_removed() {
        let f = fixture();
        f.fetcher.set_spaces(vec![space("a", "Alpha")]);

        let report = f.reconciler.sync_spaces().await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(
            f.alerts.alerts().last().unwrap().to_string(),
            "Found 1 recently added space(s): Alpha"
        );
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().is_some());

        f.fetcher.set_spaces(vec![]);
        let report = f.reconciler.sync_spaces().await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(
            f.alerts.alerts().last().unwrap().to_string(),
            "Found 1 recently removed space(s): Alpha"
        );
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().is_none());
        assert_eq!(f.alerts.alerts().len(), 2);
    }

    #[tokio::test]
    async fn space_sync_is_idempotent() {
        let f = fixture();
        f.fetcher
            .set_spaces(vec![space("a", "Alpha"), space("b", "Beta")]);
        f.reconciler.sync_spaces().await.unwrap();
        let alerts = f.alerts.alerts().len();

        let report = f.reconciler.sync_spaces().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                added: 0,
                removed: 0,
                unchanged: 2
            }
        );
        assert_eq!(f.alerts.alerts().len(), alerts);
    }

    #[tokio::test]
    async fn watched_flag_survives_sync() {
        let f = fixture();
        f.fetcher.set_spaces(vec![space("a", "Alpha")]);
        f.reconciler.sync_spaces().await.unwrap();
        f.db.set_space_watched(&SpaceId::new("a"), true)
            .await
            .unwrap();

        f.reconciler.sync_spaces().await.unwrap();
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().unwrap().watched);
    }

    #[tokio::test]
    async fn remote_failure_changes_nothing() {
        let f = fixture();
        f.db.insert_space(space("a", "Alpha")).await.unwrap();
        f.fetcher.set_offline(true);

        assert!(matches!(
            f.reconciler.sync_spaces().await,
            Err(SyncError::RemoteUnavailable(_))
        ));
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().is_some());
        assert!(f.alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn alert_failure_does_not_block_persistence() {
        let db = Arc::new(InMemory::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let reconciler = Reconciler::new(
            db.clone(),
            fetcher.clone(),
            Arc::new(FailingNotifier),
            slog::Logger::root(slog::Discard, o!()),
        );
        fetcher.set_spaces(vec![space("a", "Alpha")]);

        assert_eq!(reconciler.sync_spaces().await.unwrap().added, 1);
        assert!(db.get_space(&SpaceId::new("a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn new_proposals_get_their_choices() {
        let f = fixture();
        let alpha = space("a", "Alpha");
        f.db.insert_space(alpha.clone()).await.unwrap();
        f.fetcher.set_proposals(
            "a",
            vec![proposal("p1", "a", "Raise fee"), proposal("p2", "a", "Lower fee")],
        );
        f.fetcher.set_choices("p1", vec!["For", "Against"]);
        f.fetcher.set_choices("p2", vec!["Yes", "No", "Abstain"]);

        let report = f.reconciler.sync_proposals(&alpha).await.unwrap();
        assert_eq!(report.added, 2);

        let alert = f.alerts.alerts().pop().unwrap();
        assert_eq!(alert.title, "Found 2 recently added proposal(s) for Alpha");
        assert_eq!(alert.body, "Raise fee,\nLower fee");

        let p1 = f.db.list_choices(&ProposalId::new("p1")).await.unwrap();
        assert_eq!(
            p1.iter().map(|c| (c.ordinal, c.name.as_str())).collect::<Vec<_>>(),
            vec![(1, "For"), (2, "Against")]
        );
        assert_eq!(f.db.list_choices(&ProposalId::new("p2")).await.unwrap().len(), 3);

        // second run sees nothing new
        f.reconciler.sync_proposals(&alpha).await.unwrap();
        assert_eq!(f.alerts.alerts().len(), 1);
        assert_eq!(f.fetcher.choice_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(f.db.list_choices(&ProposalId::new("p1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn removed_proposal_is_deleted() {
        let f = fixture();
        let alpha = space("a", "Alpha");
        let p1 = f.stored_proposal("p1", vec!["Yes", "No"]).await;
        f.fetcher.set_proposals("a", vec![]);

        let report = f.reconciler.sync_proposals(&alpha).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(
            f.alerts.titles(),
            vec!["Found 1 recently removed proposal(s) for Alpha"]
        );
        assert!(f.db.get_proposal(&p1.id).await.unwrap().is_none());
        assert!(f.db.list_choices(&p1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn proposals_are_scoped_to_their_space() {
        let f = fixture();
        let alpha = space("a", "Alpha");
        f.db.insert_space(alpha.clone()).await.unwrap();
        f.db.insert_space(space("b", "Beta")).await.unwrap();
        f.db.insert_proposal(proposal("pb", "b", "Beta proposal"))
            .await
            .unwrap();
        f.fetcher.set_proposals("a", vec![]);

        let report = f.reconciler.sync_proposals(&alpha).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert!(f.db.get_proposal(&ProposalId::new("pb")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn choices_are_only_populated_once() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec![]).await;
        f.fetcher.set_choices("p1", vec!["Yes", "No"]);

        assert_eq!(
            f.reconciler.sync_choices(&p1).await.unwrap(),
            ChoiceOutcome::Populated(2)
        );
        assert_eq!(
            f.reconciler.sync_choices(&p1).await.unwrap(),
            ChoiceOutcome::AlreadyPopulated
        );
        assert_eq!(f.fetcher.choice_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(f.db.list_choices(&p1.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_choice_population_does_not_duplicate() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec![]).await;
        f.fetcher.set_choices("p1", vec!["Yes", "No"]);

        let (a, b) = tokio::join!(f.reconciler.sync_choices(&p1), f.reconciler.sync_choices(&p1));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|outcome| matches!(outcome, ChoiceOutcome::AlreadyPopulated));
        assert_eq!(
            outcomes,
            vec![ChoiceOutcome::Populated(2), ChoiceOutcome::AlreadyPopulated]
        );
        assert_eq!(f.db.list_choices(&p1.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_insert_is_surfaced() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec![]).await;
        f.db.insert_choices(&p1.id, NewChoice::from_declarations(vec!["Yes"]), crate::db::test::time(0))
            .await
            .unwrap();

        let err = f
            .db
            .insert_choices(&p1.id, NewChoice::from_declarations(vec!["Yes"]), crate::db::test::time(0))
            .await
            .unwrap_err();
        assert!(matches!(SyncError::write(err), SyncError::DuplicateIdentity(_)));
    }

    #[tokio::test]
    async fn tallies_resolve_ordinals() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec!["For", "Against"]).await;
        let choices = f.db.list_choices(&p1.id).await.unwrap();
        f.fetcher.set_votes("p1", vec![1, 1, 2, 1, 1, 2, 1, 2]);

        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Recorded {
                appended: 2,
                unchanged: 0
            }
        );
        let for_tally = f.db.latest_tally(choices[0].id).await.unwrap().unwrap();
        let against_tally = f.db.latest_tally(choices[1].id).await.unwrap().unwrap();
        assert_eq!((for_tally.choice, for_tally.count), (choices[0].id, 5));
        assert_eq!((against_tally.choice, against_tally.count), (choices[1].id, 3));
    }

    #[tokio::test]
    async fn unchanged_counts_are_not_appended() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec!["For", "Against"]).await;
        let choices = f.db.list_choices(&p1.id).await.unwrap();
        f.db.insert_tally(NewTally {
            choice: choices[0].id,
            count: 10,
            created_at: crate::db::test::time(1),
        })
        .await
        .unwrap();

        f.fetcher.set_votes("p1", vec![1; 10]);
        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Recorded {
                appended: 0,
                unchanged: 1
            }
        );
        assert_eq!(f.counts(&p1).await, vec![vec![10], vec![]]);

        f.fetcher.set_votes("p1", vec![1; 11]);
        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Recorded {
                appended: 1,
                unchanged: 0
            }
        );
        assert_eq!(f.counts(&p1).await, vec![vec![10, 11], vec![]]);
    }

    #[tokio::test]
    async fn history_only_grows_on_change() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec!["Yes", "No"]).await;
        for votes in vec![vec![1], vec![1], vec![1, 2], vec![1, 2], vec![1, 2, 2]] {
            f.fetcher.set_votes("p1", votes);
            f.reconciler.sync_tallies(&p1).await.unwrap();
        }
        assert_eq!(f.counts(&p1).await, vec![vec![1], vec![1, 2]]);
    }

    #[tokio::test]
    async fn unknown_ordinal_defers_without_writes() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec!["Yes", "No"]).await;
        f.fetcher.set_votes("p1", vec![1, 2, 3]);

        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Deferred { ordinal: 3 }
        );
        assert_eq!(f.counts(&p1).await, vec![Vec::<u64>::new(), vec![]]);
    }

    #[tokio::test]
    async fn tallies_defer_until_choices_exist() {
        let f = fixture();
        let p1 = f.stored_proposal("p1", vec![]).await;
        f.fetcher.set_votes("p1", vec![1, 2]);
        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Deferred { ordinal: 1 }
        );

        f.fetcher.set_choices("p1", vec!["Yes", "No"]);
        f.reconciler.sync_choices(&p1).await.unwrap();
        assert_eq!(
            f.reconciler.sync_tallies(&p1).await.unwrap(),
            TallyOutcome::Recorded {
                appended: 2,
                unchanged: 0
            }
        );
        assert_eq!(
            f.db.latest_tally(ChoiceId::from(1)).await.unwrap().map(|t| t.count),
            Some(1)
        );
    }

    #[tokio::test]
    async fn identity_locks_are_released() {
        let locks = IdentityLocks::default();
        drop(locks.lock("proposal:p1".into()).await);
        let _held = locks.lock("proposal:p2".into()).await;
        drop(locks.lock("proposal:p1".into()).await);
        assert!(locks.locks.lock().unwrap().len() <= 2);
    }
}
