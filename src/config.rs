use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::poller::PollerConfig;
use crate::riot::{CooldownPolicy, GameMode, GatewayConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub riot_api_key: String,
    pub data_dir: PathBuf,
    pub polling_interval_secs: u64,
    pub polling_startup_delay_secs: u64,
    pub polling_concurrency: usize,
    pub riot_min_request_interval_ms: u64,
    pub riot_cooldown_fallback_secs: u64,
    pub riot_api_base_url: Option<String>,
    pub track_tft: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        const DEFAULT_DATA_DIR: &str = "./data";
        const DEFAULT_POLLING_INTERVAL_SECS: u64 = 60;
        const DEFAULT_POLLING_STARTUP_DELAY_SECS: u64 = 10;
        const DEFAULT_POLLING_CONCURRENCY: usize = 3;
        const DEFAULT_RIOT_MIN_REQUEST_INTERVAL_MS: u64 = 1200;
        const DEFAULT_RIOT_COOLDOWN_FALLBACK_SECS: u64 = 60;

        let required = |key: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} must be set")))
        };
        let parsed = |key: &str, default| parse_or(get(key), default);

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            riot_api_key: required("RIOT_API_KEY")?,
            data_dir: get("DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.into())
                .into(),
            polling_interval_secs: parsed("POLLING_INTERVAL_SECS", DEFAULT_POLLING_INTERVAL_SECS)
                .max(1),
            polling_startup_delay_secs: parsed(
                "POLLING_STARTUP_DELAY_SECS",
                DEFAULT_POLLING_STARTUP_DELAY_SECS,
            ),
            polling_concurrency: parse_or(
                get("POLLING_CONCURRENCY"),
                DEFAULT_POLLING_CONCURRENCY,
            )
            .max(1),
            riot_min_request_interval_ms: parsed(
                "RIOT_MIN_REQUEST_INTERVAL_MS",
                DEFAULT_RIOT_MIN_REQUEST_INTERVAL_MS,
            ),
            riot_cooldown_fallback_secs: parsed(
                "RIOT_COOLDOWN_FALLBACK_SECS",
                DEFAULT_RIOT_COOLDOWN_FALLBACK_SECS,
            ),
            riot_api_base_url: get("RIOT_API_BASE_URL").filter(|v| !v.trim().is_empty()),
            track_tft: parse_or(get("TRACK_TFT"), true),
        })
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join("accounts.json")
    }

    pub fn guilds_path(&self) -> PathBuf {
        self.data_dir.join("guilds.json")
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            min_request_interval: Duration::from_millis(self.riot_min_request_interval_ms),
            cooldown_fallback: Duration::from_secs(self.riot_cooldown_fallback_secs),
            cooldown_policy: CooldownPolicy::Reject,
            base_url: self.riot_api_base_url.clone(),
            ..Default::default()
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        let modes = if self.track_tft {
            GameMode::ALL.to_vec()
        } else {
            vec![GameMode::Lol]
        };

        PollerConfig {
            interval: Duration::from_secs(self.polling_interval_secs),
            startup_delay: Duration::from_secs(self.polling_startup_delay_secs),
            concurrency: self.polling_concurrency,
            account_pacing: Duration::from_millis(self.riot_min_request_interval_ms),
            modes,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
