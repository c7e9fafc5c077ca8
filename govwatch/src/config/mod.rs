use crate::{
    fetcher::snapshot_hub,
    notifier::telegram,
    scheduler::{DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL},
};
use std::str::FromStr;

mod config_impls;

pub type RootDrain = Box<
    dyn slog::SendSyncRefUnwindSafeDrain<Err = slog::Never, Ok = ()>
        + 'static
        + std::panic::UnwindSafe,
>;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_alerts")]
    pub alerts: Vec<AlertConfig>,
    #[serde(default)]
    pub loggers: LoggersConfig,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_alerts() -> Vec<AlertConfig> {
    vec![AlertConfig::Log]
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "backend")]
#[serde(deny_unknown_fields)]
pub enum DbConfig {
    Postgres { url: String },
    InMemory,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig::InMemory
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub url: String,
    /// Seconds before a request to the remote source is abandoned.
    #[serde(default = "default_remote_timeout")]
    pub timeout: u64,
}

fn default_remote_url() -> String {
    snapshot_hub::DEFAULT_URL.to_string()
}

fn default_remote_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_remote_url(),
            timeout: default_remote_timeout(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
#[serde(deny_unknown_fields)]
pub enum AlertConfig {
    Log,
    #[serde(rename_all = "kebab-case")]
    Telegram {
        bot_token: String,
        chat_id: String,
        #[serde(default = "default_telegram_api")]
        api_url: String,
    },
}

fn default_telegram_api() -> String {
    telegram::DEFAULT_API_URL.to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
#[serde(deny_unknown_fields)]
pub enum LoggerConfig {
    Term {
        #[serde(deserialize_with = "deser_log_level")]
        level: slog::Level,
        out: TermConfig,
        #[serde(default)]
        color: Option<bool>,
    },
    File {
        #[serde(deserialize_with = "deser_log_level")]
        level: slog::Level,
        path: String,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum TermConfig {
    Stdout,
    Stderr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggersConfig(Vec<LoggerConfig>);

impl Default for LoggersConfig {
    fn default() -> Self {
        LoggersConfig(vec![LoggerConfig::Term {
            out: TermConfig::Stdout,
            color: None,
            level: slog::Level::Info,
        }])
    }
}

fn deser_log_level<'a, D: serde::Deserializer<'a>>(d: D) -> Result<slog::Level, D::Error> {
    struct MyVisitor;

    impl<'a> serde::de::Visitor<'a> for MyVisitor {
        type Value = slog::Level;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a log level ({})", slog::LOG_LEVEL_NAMES.join(", "))
        }

        fn visit_str<E: serde::de::Error>(self, data: &str) -> Result<Self::Value, E> {
            slog::Level::from_str(data).map_err(|_| serde::de::Error::custom("not a log level"))
        }
    }

    d.deserialize_str(MyVisitor)
}
