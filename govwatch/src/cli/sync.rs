use crate::{config::Config, log::SyncLog};

/// Runs a single reconciliation cycle and exits.
pub async fn sync(config: Config) -> anyhow::Result<()> {
    let logger = config.build_logger()?;
    let db = config.database.connect_database().await?;
    let scheduler = config.build_scheduler(db, logger.clone())?;

    let report = scheduler.run_cycle().await;
    logger.log_cycle_report(&report);
    if report.failures > 0 {
        return Err(anyhow::anyhow!(
            "{} sync operation(s) failed during the cycle",
            report.failures
        ));
    }
    Ok(())
}
