use async_trait::async_trait;
use futures::future::join_all;
use govwatch_core::Alert;
pub mod log;
pub mod telegram;

pub use self::{log::LogNotifier, telegram::TelegramNotifier};

/// A channel alerts can be delivered to. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Delivers every alert to all of its channels at once.
///
/// Failures of individual channels are logged and never returned.
pub struct Notifiers {
    channels: Vec<(String, Box<dyn Notifier>)>,
    logger: slog::Logger,
}

impl Notifiers {
    pub fn new(logger: slog::Logger) -> Self {
        Self {
            channels: vec![],
            logger,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, notifier: impl Notifier + 'static) {
        self.channels.push((name.into(), Box::new(notifier)));
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Notifier for Notifiers {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let deliveries = self.channels.iter().map(|(name, channel)| async move {
            if let Err(e) = channel.deliver(alert).await {
                warn!(self.logger, "alert delivery failed";
                      "channel" => name.as_str(),
                      "title" => alert.title.as_str(),
                      "error" => e.to_string());
            }
        });
        join_all(deliveries).await;
        Ok(())
    }
}
