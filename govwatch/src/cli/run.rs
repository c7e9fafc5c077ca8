use crate::config::Config;
use futures::future::FutureExt;
use std::sync::Arc;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let logger = config.build_logger()?;
    let db = config.database.connect_database().await?;
    let scheduler = Arc::new(config.build_scheduler(db, logger.clone())?);

    let shutdown = tokio::signal::ctrl_c().map(|res| {
        if let Err(e) = res {
            error!(logger, "unable to listen for shutdown signal"; "error" => e.to_string());
        }
    });

    scheduler.start(shutdown).await;
    info!(logger, "shut down");
    Ok(())
}
