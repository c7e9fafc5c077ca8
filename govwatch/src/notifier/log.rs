use super::Notifier;
use async_trait::async_trait;
use govwatch_core::Alert;

/// Writes alerts to the service log.
pub struct LogNotifier {
    logger: slog::Logger,
}

impl LogNotifier {
    pub fn new(logger: slog::Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(self.logger, "{}", alert.title; "body" => alert.body.as_str());
        Ok(())
    }
}
