use super::*;
use crate::{
    db::{self, postgres::PgBackend, Db},
    fetcher::{Fetcher, SnapshotHub},
    notifier::{LogNotifier, Notifiers, TelegramNotifier},
    Reconciler, Scheduler,
};
use std::{fs, sync::Arc, time::Duration};

impl Config {
    pub fn build_logger(&self) -> anyhow::Result<slog::Logger> {
        Ok(slog::Logger::root(self.loggers.to_slog_drain()?, o!()))
    }

    pub fn build_fetcher(&self, logger: slog::Logger) -> anyhow::Result<Arc<dyn Fetcher>> {
        Ok(Arc::new(SnapshotHub::new(
            self.remote.url.clone(),
            Duration::from_secs(self.remote.timeout),
            logger,
        )?))
    }

    pub fn build_notifiers(&self, logger: slog::Logger) -> anyhow::Result<Notifiers> {
        let mut notifiers = Notifiers::new(logger.new(o!("type" => "alerts")));
        for alert in &self.alerts {
            match alert {
                AlertConfig::Log => {
                    notifiers.push("log", LogNotifier::new(logger.new(o!("type" => "alert"))))
                }
                AlertConfig::Telegram {
                    bot_token,
                    chat_id,
                    api_url,
                } => notifiers.push(
                    "telegram",
                    TelegramNotifier::new(
                        api_url.clone(),
                        bot_token.clone(),
                        chat_id.clone(),
                        Duration::from_secs(self.remote.timeout),
                    )?,
                ),
            }
        }
        Ok(notifiers)
    }

    pub fn build_reconciler(
        &self,
        db: Arc<dyn Db>,
        logger: slog::Logger,
    ) -> anyhow::Result<Reconciler> {
        Ok(Reconciler::new(
            db,
            self.build_fetcher(logger.new(o!("type" => "fetcher")))?,
            Arc::new(self.build_notifiers(logger.clone())?),
            logger.new(o!("type" => "reconciler")),
        ))
    }

    pub fn build_scheduler(&self, db: Arc<dyn Db>, logger: slog::Logger) -> anyhow::Result<Scheduler> {
        Ok(Scheduler::new(
            Arc::new(self.build_reconciler(db, logger.clone())?),
            Duration::from_secs(self.poll_interval),
            self.max_concurrency,
            logger.new(o!("type" => "scheduler")),
        ))
    }
}

impl LoggerConfig {
    pub fn to_slog_drain(&self) -> anyhow::Result<RootDrain> {
        use crate::slog::Drain;
        use LoggerConfig::*;
        match &self {
            Term { out, color, level } => {
                let mut decorator = match out {
                    TermConfig::Stdout => slog_term::TermDecorator::new().stdout(),
                    TermConfig::Stderr => slog_term::TermDecorator::new().stderr(),
                };
                if let Some(color) = color {
                    decorator = if *color {
                        decorator.force_color()
                    } else {
                        decorator.force_plain()
                    }
                }
                let drain = slog_term::FullFormat::new(decorator.build())
                    .build()
                    .fuse()
                    .filter_level(*level)
                    .ignore_res();
                Ok(Box::new(
                    slog_async::Async::new(drain).chan_size(4096).build().fuse(),
                ))
            }
            File { path, level } => {
                let open_file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;

                let decorator = slog_term::PlainDecorator::new(open_file);
                let drain = slog_term::FullFormat::new(decorator)
                    .build()
                    .fuse()
                    .filter_level(*level)
                    .ignore_res();
                Ok(Box::new(
                    slog_async::Async::new(drain).chan_size(4096).build().fuse(),
                ))
            }
        }
    }
}

impl LoggersConfig {
    pub fn to_slog_drain(&self) -> anyhow::Result<RootDrain> {
        let drains = self
            .0
            .iter()
            .map(|drain| drain.to_slog_drain())
            .collect::<Result<Vec<_>, _>>()?;

        // merge the drains into a single drain
        Ok(drains
            .into_iter()
            .fold(Box::new(slog::Discard) as RootDrain, |acc, drain| {
                Box::new(slog::IgnoreResult::new(slog::Duplicate::new(acc, drain)))
            }))
    }
}

lazy_static::lazy_static! {
    static ref IN_MEMORY: db::in_memory::InMemory = db::in_memory::InMemory::default();
}

impl DbConfig {
    pub async fn connect_database(&self) -> anyhow::Result<Arc<dyn Db>> {
        match self {
            DbConfig::InMemory => Ok(Arc::new(IN_MEMORY.clone())),
            DbConfig::Postgres { url } => Ok(Arc::new(PgBackend::connect(url).await?)),
        }
    }
}
