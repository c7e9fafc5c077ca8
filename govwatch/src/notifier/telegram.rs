use super::Notifier;
use async_trait::async_trait;
use govwatch_core::Alert;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Sends alerts to a Telegram chat through the bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

impl TelegramNotifier {
    pub fn new(
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        self.client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: format!("{}\n\n{}", alert.title, alert.body),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
