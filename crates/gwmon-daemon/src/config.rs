use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Base URL of the gateway under watch (e.g. `https://gateway.example`).
    pub gateway_url: String,
    /// Base URL of the network registry used for observer/epoch data.
    /// Defaults to the gateway itself, which proxies registry reads.
    #[serde(default)]
    pub registry_url: Option<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_observer_interval")]
    pub observer_interval_secs: u64,
    #[serde(default = "default_spot_check_interval")]
    pub spot_check_interval_secs: u64,

    /// Base names probed by the randomized ArNS spot check.
    #[serde(default)]
    pub arns_names: Vec<String>,

    /// UTC hour at which the daily report is sent.
    #[serde(default = "default_daily_report_hour")]
    pub daily_report_hour: u32,
    /// Weekday for the weekly report (e.g. "sun", "monday").
    #[serde(default = "default_weekly_report_weekday")]
    pub weekly_report_weekday: String,

    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub chat_id: String,
    /// Usually provided via the GWMON_BOT_TOKEN environment variable
    /// instead of the config file.
    #[serde(default)]
    pub bot_token: Option<String>,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_health_interval() -> u64 {
    60
}

fn default_metrics_interval() -> u64 {
    60
}

fn default_observer_interval() -> u64 {
    300
}

fn default_spot_check_interval() -> u64 {
    900
}

fn default_daily_report_hour() -> u32 {
    8
}

fn default_weekly_report_weekday() -> String {
    "sun".to_string()
}

impl DaemonConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolves the bot token from the config file or the environment.
    /// Missing identity is the one fatal startup condition.
    pub fn bot_token(&self) -> anyhow::Result<String> {
        self.telegram
            .bot_token
            .clone()
            .or_else(|| std::env::var("GWMON_BOT_TOKEN").ok())
            .filter(|t| !t.is_empty())
            .context("missing bot token: set telegram.bot_token or GWMON_BOT_TOKEN")
    }

    pub fn registry_base(&self) -> &str {
        self.registry_url.as_deref().unwrap_or(&self.gateway_url)
    }
}
