use crate::deal_config::{MAX_DEAL_DURATION, MIN_DEAL_DURATION};
use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "AUTOBID";
/// a year out is already further than any miner will hold a slot
const MAX_START_EPOCH_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct LotusSettings {
    pub client_api_url: String,
    #[serde(default)]
    pub client_access_token: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwanSettings {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub access_token: String,
    /// skips the api key login when set
    #[serde(default)]
    pub jwt: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderSettings {
    pub output_dir: PathBuf,
    pub wallet: String,
    pub verified_deal: bool,
    pub fast_retrieval: bool,
    pub skip_confirmation: bool,
    /// FIL per GiB
    pub price: Decimal,
    pub max_price: Decimal,
    pub start_epoch_hours: i64,
    /// in epochs
    pub duration: i64,
}

/// everything the sender reads at startup. nothing here changes afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub lotus: LotusSettings,
    pub swan: SwanSettings,
    pub sender: SenderSettings,
}

impl Settings {
    /// toml file first, then AUTOBID_SECTION__KEY environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::from(path.to_path_buf()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );
        let settings: Settings = builder
            .build()
            .with_context(|| format!("couldn't read config from {}", path.display()))?
            .try_deserialize()
            .context("config is missing or mistyped fields")?;
        settings.check()?;
        Ok(settings)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(builder
            .set_default("lotus.request_timeout_secs", 60)?
            .set_default("swan.request_timeout_secs", 60)?
            .set_default("sender.output_dir", "/tmp/swan-autobid")?
            .set_default("sender.verified_deal", false)?
            .set_default("sender.fast_retrieval", true)?
            .set_default("sender.skip_confirmation", true)?
            .set_default("sender.price", "0")?
            .set_default("sender.start_epoch_hours", 96)?
            .set_default("sender.duration", 1_512_000)?)
    }

    fn check(&self) -> Result<()> {
        ensure!(
            self.sender.price >= Decimal::ZERO,
            "sender.price can't be negative"
        );
        ensure!(
            self.sender.max_price >= Decimal::ZERO,
            "sender.max_price can't be negative"
        );
        ensure!(
            (0..=MAX_START_EPOCH_HOURS).contains(&self.sender.start_epoch_hours),
            "sender.start_epoch_hours must be in [0, {}], got {}",
            MAX_START_EPOCH_HOURS,
            self.sender.start_epoch_hours
        );
        ensure!(
            (MIN_DEAL_DURATION..=MAX_DEAL_DURATION).contains(&self.sender.duration),
            "sender.duration must be in [{}, {}] epochs, got {}",
            MIN_DEAL_DURATION,
            MAX_DEAL_DURATION,
            self.sender.duration
        );
        Ok(())
    }
}
