use crate::{
    reconciler::{ChoiceOutcome, SyncError, SyncReport, TallyOutcome},
    scheduler::CycleReport,
};

pub trait SyncLog {
    fn log_sync_result(&self, res: &Result<SyncReport, SyncError>);
    fn log_choice_result(&self, res: &Result<ChoiceOutcome, SyncError>);
    fn log_tally_result(&self, res: &Result<TallyOutcome, SyncError>);
    fn log_cycle_report(&self, report: &CycleReport);
}

fn log_error(logger: &slog::Logger, e: &SyncError) {
    use SyncError::*;
    match e {
        RemoteUnavailable(e) => warn!(logger, "remote unavailable"; "error" => e.to_string()),
        DbRead(e) => crit!(logger, "database read"; "error" => format!("{}", e)),
        DbWrite(e) => crit!(logger, "database write"; "error" => format!("{}", e)),
        DuplicateIdentity(e) => error!(logger, "duplicate"; "error" => e.to_string()),
    }
}

impl SyncLog for slog::Logger {
    fn log_sync_result(&self, res: &Result<SyncReport, SyncError>) {
        match res {
            Ok(report) if report.added + report.removed == 0 => {
                debug!(self, "no changes"; "unchanged" => report.unchanged)
            }
            Ok(report) => info!(self, "synced";
                                "added" => report.added,
                                "removed" => report.removed,
                                "unchanged" => report.unchanged),
            Err(e) => log_error(self, e),
        }
    }

    fn log_choice_result(&self, res: &Result<ChoiceOutcome, SyncError>) {
        match res {
            Ok(ChoiceOutcome::Populated(0)) => debug!(self, "no choices declared yet"),
            Ok(ChoiceOutcome::Populated(n)) => info!(self, "choices populated"; "count" => n),
            Ok(ChoiceOutcome::AlreadyPopulated) => debug!(self, "ignored - already populated"),
            Err(e) => log_error(self, e),
        }
    }

    fn log_tally_result(&self, res: &Result<TallyOutcome, SyncError>) {
        match res {
            Ok(TallyOutcome::Recorded {
                appended: 0,
                unchanged,
            }) => debug!(self, "tallies unchanged"; "unchanged" => unchanged),
            Ok(TallyOutcome::Recorded {
                appended,
                unchanged,
            }) => info!(self, "tallies recorded"; "appended" => appended, "unchanged" => unchanged),
            Ok(TallyOutcome::Deferred { ordinal }) => {
                info!(self, "deferred - choice not populated"; "ordinal" => ordinal)
            }
            Err(e) => log_error(self, e),
        }
    }

    fn log_cycle_report(&self, report: &CycleReport) {
        info!(self, "cycle finished";
              "spaces_added" => report.spaces_added,
              "spaces_removed" => report.spaces_removed,
              "proposals_added" => report.proposals_added,
              "proposals_removed" => report.proposals_removed,
              "choices_populated" => report.choices_populated,
              "tallies_appended" => report.tallies_appended,
              "deferred" => report.deferred,
              "failures" => report.failures,
              "elapsed_ms" => report.elapsed.as_millis() as u64);
    }
}
