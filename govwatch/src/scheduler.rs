use crate::{
    db::{Db, ProposalQuery},
    log::SyncLog,
    reconciler::{ChoiceOutcome, SyncReport, TallyOutcome},
    Reconciler,
};
use futures::{
    future::Future,
    stream::{self, StreamExt},
};
use govwatch_core::{Proposal, Space};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_stream::wrappers::IntervalStream;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Totals for one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub spaces_added: usize,
    pub spaces_removed: usize,
    pub proposals_added: usize,
    pub proposals_removed: usize,
    pub choices_populated: usize,
    pub tallies_appended: usize,
    pub deferred: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn add_proposals(&mut self, report: SyncReport) {
        self.proposals_added += report.added;
        self.proposals_removed += report.removed;
    }
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    max_concurrency: usize,
    logger: slog::Logger,
    cycle: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        interval: Duration,
        max_concurrency: usize,
        logger: slog::Logger,
    ) -> Self {
        Self {
            reconciler,
            interval,
            max_concurrency: max_concurrency.max(1),
            logger,
            cycle: Arc::new(Mutex::new(())),
        }
    }

    fn db(&self) -> &Arc<dyn Db> {
        self.reconciler.db()
    }

    /// Returns `None` while another cycle holds the guard.
    fn try_begin_cycle(&self) -> Option<OwnedMutexGuard<()>> {
        self.cycle.clone().try_lock_owned().ok()
    }

    async fn bounded<T, R, Fut>(&self, items: Vec<T>, f: impl Fn(T) -> Fut) -> Vec<R>
    where
        Fut: Future<Output = R>,
    {
        stream::iter(items)
            .map(f)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }

    async fn watched_spaces(&self, report: &mut CycleReport) -> Vec<Space> {
        match self.db().list_spaces(Some(true)).await {
            Ok(spaces) => spaces,
            Err(e) => {
                crit!(self.logger, "unable to list watched spaces"; "error" => format!("{}", e));
                report.failures += 1;
                vec![]
            }
        }
    }

    async fn watched_proposals(&self, report: &mut CycleReport) -> Vec<Proposal> {
        let query = ProposalQuery {
            watched: Some(true),
            ..Default::default()
        };
        match self.db().list_proposals(query).await {
            Ok(proposals) => proposals,
            Err(e) => {
                crit!(self.logger, "unable to list watched proposals"; "error" => format!("{}", e));
                report.failures += 1;
                vec![]
            }
        }
    }

    /// Runs the space, proposal, choice and tally phases in order. The
    /// watched sets are read again at the start of each phase.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let res = self.reconciler.sync_spaces().await;
        self.logger
            .new(o!("type" => "space_sync"))
            .log_sync_result(&res);
        match res {
            Ok(spaces) => {
                report.spaces_added = spaces.added;
                report.spaces_removed = spaces.removed;
            }
            Err(_) => report.failures += 1,
        }

        let spaces = self.watched_spaces(&mut report).await;
        let results = self
            .bounded(spaces, |space| async move {
                let res = self.reconciler.sync_proposals(&space).await;
                self.logger
                    .new(o!("type" => "proposal_sync", "space" => space.id.to_string()))
                    .log_sync_result(&res);
                res
            })
            .await;
        for res in results {
            match res {
                Ok(proposals) => report.add_proposals(proposals),
                Err(_) => report.failures += 1,
            }
        }

        let proposals = self.watched_proposals(&mut report).await;
        let results = self
            .bounded(proposals, |proposal| async move {
                let res = self.reconciler.sync_choices(&proposal).await;
                self.logger
                    .new(o!("type" => "choice_sync", "proposal" => proposal.id.to_string()))
                    .log_choice_result(&res);
                res
            })
            .await;
        for res in results {
            match res {
                Ok(ChoiceOutcome::Populated(n)) if n > 0 => report.choices_populated += 1,
                Ok(_) => {}
                Err(_) => report.failures += 1,
            }
        }

        let proposals = self.watched_proposals(&mut report).await;
        let results = self
            .bounded(proposals, |proposal| async move {
                let res = self.reconciler.sync_tallies(&proposal).await;
                self.logger
                    .new(o!("type" => "tally_sync", "proposal" => proposal.id.to_string()))
                    .log_tally_result(&res);
                res
            })
            .await;
        for res in results {
            match res {
                Ok(TallyOutcome::Recorded { appended, .. }) => report.tallies_appended += appended,
                Ok(TallyOutcome::Deferred { .. }) => report.deferred += 1,
                Err(_) => report.failures += 1,
            }
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Runs a cycle straight away and then once per interval until `shutdown`
    /// resolves. Ticks that arrive while a cycle is running are skipped.
    pub async fn start(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        let mut in_flight: Option<JoinHandle<()>> = None;
        tokio::pin!(shutdown);

        info!(self.logger, "starting scheduler"; "interval_secs" => self.interval.as_secs());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = ticks.next() => {
                    let guard = match self.try_begin_cycle() {
                        Some(guard) => guard,
                        None => {
                            warn!(self.logger, "previous cycle still running - skipping tick");
                            continue;
                        }
                    };
                    let scheduler = self.clone();
                    in_flight = Some(tokio::spawn(async move {
                        let report = scheduler.run_cycle().await;
                        scheduler.logger.log_cycle_report(&report);
                        drop(guard);
                    }));
                }
            }
        }

        info!(self.logger, "stopping scheduler");
        if let Some(cycle) = in_flight {
            if let Err(e) = cycle.await {
                error!(self.logger, "cycle did not finish"; "error" => e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        db::{
            test::{proposal, space},
            DbRead, DbWrite,
        },
        reconciler::test::fixture,
    };
    use govwatch_core::{ProposalId, SpaceId};
    use std::sync::atomic::Ordering;

    fn scheduler(reconciler: Arc<Reconciler>) -> Scheduler {
        Scheduler::new(
            reconciler,
            DEFAULT_POLL_INTERVAL,
            DEFAULT_MAX_CONCURRENCY,
            slog::Logger::root(slog::Discard, o!()),
        )
    }

    #[tokio::test]
    async fn cycle_follows_watched_entities() {
        let f = fixture();
        let scheduler = scheduler(f.reconciler.clone());
        f.fetcher
            .set_spaces(vec![space("a", "Alpha"), space("b", "Beta")]);
        f.fetcher
            .set_proposals("a", vec![proposal("p1", "a", "Raise fee")]);
        f.fetcher
            .set_proposals("b", vec![proposal("p2", "b", "Lower fee")]);
        f.fetcher.set_choices("p1", vec!["For", "Against"]);
        f.fetcher.set_votes("p1", vec![1, 1, 2]);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.spaces_added, 2);
        // nothing is watched yet
        assert_eq!(report.proposals_added, 0);
        assert_eq!(report.failures, 0);

        f.db.set_space_watched(&SpaceId::new("a"), true)
            .await
            .unwrap();
        let report = scheduler.run_cycle().await;
        assert_eq!(report.proposals_added, 1);
        assert_eq!(report.tallies_appended, 0);
        assert!(f.db.get_proposal(&ProposalId::new("p2")).await.unwrap().is_none());
        assert_eq!(f.db.list_choices(&ProposalId::new("p1")).await.unwrap().len(), 2);

        f.db.set_proposal_watched(&ProposalId::new("p1"), true)
            .await
            .unwrap();
        let report = scheduler.run_cycle().await;
        assert_eq!(report.tallies_appended, 2);
        assert_eq!(report.choices_populated, 0);

        let report = scheduler.run_cycle().await;
        assert_eq!(
            report,
            CycleReport {
                elapsed: report.elapsed,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn choice_phase_retries_unpopulated_proposals() {
        let f = fixture();
        let scheduler = scheduler(f.reconciler.clone());
        let p1 = f.stored_proposal("p1", vec![]).await;
        f.db.set_proposal_watched(&p1.id, true).await.unwrap();
        f.fetcher.set_spaces(vec![space("a", "Alpha")]);
        f.fetcher.set_choices("p1", vec!["Yes", "No"]);
        f.fetcher.set_votes("p1", vec![2]);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.choices_populated, 1);
        assert_eq!(report.tallies_appended, 1);
        assert_eq!(report.deferred, 0);
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_cycle() {
        let f = fixture();
        let scheduler = scheduler(f.reconciler.clone());
        let p1 = f.stored_proposal("p1", vec!["Yes"]).await;
        f.db.set_space_watched(&SpaceId::new("a"), true)
            .await
            .unwrap();
        f.db.set_proposal_watched(&p1.id, true).await.unwrap();
        f.fetcher.set_offline(true);

        let report = scheduler.run_cycle().await;
        // space sync, proposal sync of "a" and tally sync of "p1"
        assert_eq!(report.failures, 3);
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().is_some());
        assert_eq!(f.fetcher.vote_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_refused() {
        let f = fixture();
        let scheduler = scheduler(f.reconciler.clone());
        let guard = scheduler.try_begin_cycle().unwrap();
        assert!(scheduler.try_begin_cycle().is_none());
        drop(guard);
        assert!(scheduler.try_begin_cycle().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() {
        let f = fixture();
        let scheduler = Arc::new(scheduler(f.reconciler.clone()));
        f.fetcher.set_spaces(vec![space("a", "Alpha")]);

        scheduler
            .start(time::sleep(Duration::from_secs(650)))
            .await;

        // at 0s, 300s and 600s
        assert_eq!(f.fetcher.space_fetches.load(Ordering::SeqCst), 3);
        assert!(f.db.get_space(&SpaceId::new("a")).await.unwrap().is_some());
        assert_eq!(f.alerts.alerts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_during_a_slow_cycle_is_skipped() {
        let f = fixture();
        let scheduler = Arc::new(scheduler(f.reconciler.clone()));
        f.fetcher.set_spaces(vec![space("a", "Alpha")]);
        f.fetcher.set_space_delay(Duration::from_secs(400));

        let running = tokio::spawn(scheduler.clone().start(time::sleep(Duration::from_secs(650))));

        time::sleep(Duration::from_secs(350)).await;
        // the tick at 300s arrived while the first cycle was still fetching
        assert_eq!(f.fetcher.space_fetches.load(Ordering::SeqCst), 1);
        assert!(scheduler.try_begin_cycle().is_none());

        running.await.unwrap();
        // cycles started at 0s and 600s only
        assert_eq!(f.fetcher.space_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(f.alerts.titles(), vec!["Found 1 recently added space(s)"]);
        assert_eq!(f.db.list_spaces(None).await.unwrap().len(), 1);
    }
}
