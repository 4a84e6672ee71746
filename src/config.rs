use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::registerer::RegistererSettings;

/// Main configuration for botminter: defaults, then an optional
/// `botminter.toml`, then `BOTMINTER__*` environment variables (with `.env`
/// support), each layer overriding the previous one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotminterConfig {
    pub platform: PlatformSettings,
    pub pipeline: PipelineSettings,
    pub database: DatabaseSettings,
    pub observability: ObservabilitySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformSettings {
    /// Base URL of the platform instance, recorded in published feed entries.
    pub base_url: String,
    /// Local part for generated plus-addressed account mail.
    pub email_local: String,
    pub email_domain: String,
    pub locale: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    pub create_cooldown_secs: u64,
    pub verify_poll_secs: u64,
    pub creates_per_hour: u32,
    pub create_burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// SQLite URL for the registration store.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for BotminterConfig {
    fn default() -> Self {
        Self {
            platform: PlatformSettings {
                base_url: "https://social.example".to_string(),
                email_local: "bots".to_string(),
                email_domain: "example.com".to_string(),
                locale: "en".to_string(),
            },
            pipeline: PipelineSettings {
                create_cooldown_secs: 30 * 60,
                verify_poll_secs: 60,
                creates_per_hour: 12,
                create_burst: 2,
            },
            database: DatabaseSettings {
                url: "sqlite://botminter.db".to_string(),
            },
            observability: ObservabilitySettings {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl BotminterConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Config::builder()
            .add_source(Config::try_from(&BotminterConfig::default())?)
            .add_source(File::with_name("botminter").required(false))
            .add_source(Environment::with_prefix("BOTMINTER").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn registerer_settings(&self) -> RegistererSettings {
        RegistererSettings {
            base_url: self.platform.base_url.clone(),
            email_local: self.platform.email_local.clone(),
            email_domain: self.platform.email_domain.clone(),
            locale: self.platform.locale.clone(),
            create_cooldown: Duration::from_secs(self.pipeline.create_cooldown_secs),
            verify_poll_interval: Duration::from_secs(self.pipeline.verify_poll_secs),
            creates_per_hour: self.pipeline.creates_per_hour,
            create_burst: self.pipeline.create_burst,
        }
    }
}
