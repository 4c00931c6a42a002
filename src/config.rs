// config.rs

use log::{debug, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MIDI standard PPQ (Pulses Per Quarter Note)
pub const TICKS_PER_BEAT: u32 = 24;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

pub const DEFAULT_CONFIG_FILE: &str = "beatclock.conf.json";
pub const RULES_DIR: &str = "rules";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{path}' is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Settings(#[from] config::ConfigError),
    #[error("rule {index} in '{file}': {reason}")]
    InvalidRule {
        file: String,
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneralSettings {
    pub default_bpm: f64,
    pub default_virtual_port_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OscSettings {
    pub enabled: bool,
    pub listen_ip: String,
    pub listen_port: u16,
    pub send_ip: String,
    pub send_port: u16,
    /// Leading path of every OSC address, e.g. `/beatclock` or `/midimaster`.
    pub address_prefix: String,
}

/// Application settings: built-in defaults, overridden by the optional JSON
/// config file, overridden by `BEATCLOCK__SECTION__KEY` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "general_settings")]
    pub general: GeneralSettings,
    #[serde(rename = "osc_configuration")]
    pub osc: OscSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            general: GeneralSettings {
                default_bpm: DEFAULT_BPM,
                default_virtual_port_name: "beatclock_OUT".to_string(),
            },
            osc: OscSettings {
                enabled: false,
                listen_ip: "0.0.0.0".to_string(),
                listen_port: 8000,
                send_ip: "127.0.0.1".to_string(),
                send_port: 9000,
                address_prefix: "/beatclock".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Builds the settings from `path` (missing file is fine) and the
    /// environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let path_str = path.to_string_lossy();

        if !path.is_file() {
            info!(
                "Config file '{}' not found, using defaults and environment",
                path_str
            );
        }

        let settings = config::Config::builder()
            .set_default("general_settings.default_bpm", defaults.general.default_bpm)?
            .set_default(
                "general_settings.default_virtual_port_name",
                defaults.general.default_virtual_port_name,
            )?
            .set_default("osc_configuration.enabled", defaults.osc.enabled)?
            .set_default("osc_configuration.listen_ip", defaults.osc.listen_ip)?
            .set_default(
                "osc_configuration.listen_port",
                i64::from(defaults.osc.listen_port),
            )?
            .set_default("osc_configuration.send_ip", defaults.osc.send_ip)?
            .set_default(
                "osc_configuration.send_port",
                i64::from(defaults.osc.send_port),
            )?
            .set_default(
                "osc_configuration.address_prefix",
                defaults.osc.address_prefix,
            )?
            .add_source(
                config::File::new(&path_str, config::FileFormat::Json).required(false),
            )
            .add_source(
                config::Environment::with_prefix("BEATCLOCK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;
        let clamped = app_config
            .general
            .default_bpm
            .clamp(MIN_BPM, MAX_BPM);
        if clamped != app_config.general.default_bpm {
            warn!(
                "default_bpm {} out of range, clamped to {}",
                app_config.general.default_bpm, clamped
            );
            app_config.general.default_bpm = clamped;
        }

        debug!("Loaded configuration: {:?}", app_config);
        Ok(app_config)
    }

    /// Like [`AppConfig::load`], but reports errors and falls back to the
    /// defaults instead of failing.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Error loading configuration: {}. Using defaults.", e);
                eprintln!("Error loading configuration: {}. Using defaults.", e);
                AppConfig::default()
            }
        }
    }
}
