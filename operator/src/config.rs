use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address of the health/metrics web server
    #[arg(long = "bind", env = "JAEGER_OPERATOR_BIND", default_value = "0.0.0.0:9000")]
    pub bind: String,
    /// Only watch Jaeger instances of this namespace (all namespaces when empty)
    #[arg(long = "watch-namespace", env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,
    /// Log output format
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
    /// Delay before retrying a failed pass, in seconds
    #[arg(long = "error-requeue", env = "ERROR_REQUEUE_SECONDS", default_value_t = 60)]
    pub error_requeue_secs: u64,
    /// Delay before retrying a pass that lost a concurrent update, in seconds
    #[arg(long = "conflict-requeue", env = "CONFLICT_REQUEUE_SECONDS", default_value_t = 5)]
    pub conflict_requeue_secs: u64,
}

impl Config {
    #[must_use]
    pub fn watch_namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    #[must_use]
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    #[must_use]
    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9000".to_string(),
            watch_namespace: None,
            log_format: LogFormat::Text,
            error_requeue_secs: 60,
            conflict_requeue_secs: 5,
        }
    }
}
