//! Settings for the demo: bind address, farm profile and autoplay pacing.
//!
//! Read from a TOML file, then overridden from `MANGOCHAIN_*` environment
//! variables.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "mangochain.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub notification_capacity: usize,
    pub farm: FarmProfile,
    pub autoplay: Pacing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".into(),
            notification_capacity: 32,
            farm: FarmProfile::default(),
            autoplay: Pacing::default(),
        }
    }
}

/// Fixed product metadata embedded in every QR payload, and the identity of
/// the verification domain scans are matched against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FarmProfile {
    pub farm: String,
    pub farmer: String,
    pub product: String,
    pub location: String,
    pub batch_prefix: String,
    pub initial_batch: String,
    pub verify_scheme: String,
    pub verify_domain: String,
}

impl Default for FarmProfile {
    fn default() -> Self {
        Self {
            farm: "Green Valley Farm".into(),
            farmer: "Rajesh Kumar".into(),
            product: "Alphonso Mango".into(),
            location: "Ratnagiri, Maharashtra".into(),
            batch_prefix: "MANGO2024".into(),
            initial_batch: "MANGO2024-001".into(),
            verify_scheme: "https".into(),
            verify_domain: "mangochain.verify".into(),
        }
    }
}

impl FarmProfile {
    /// Batch id reported when a scan matched on the domain but carried no id.
    pub fn placeholder_batch(&self) -> String {
        format!("{}-XXX", self.batch_prefix)
    }

    /// Scans are matched by substring, so an empty batch id or domain would
    /// accept any input.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("farm.initial_batch", &self.initial_batch),
            ("farm.batch_prefix", &self.batch_prefix),
            ("farm.verify_domain", &self.verify_domain),
        ] {
            if value.trim().is_empty() {
                return Err(Error::EmptySetting { field });
            }
        }
        Ok(())
    }
}

/// Autoplay timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub step_interval_ms: u64,
    pub completion_delay_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            step_interval_ms: 1500,
            completion_delay_ms: 1000,
        }
    }
}

impl Pacing {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }
}

/// Load settings from `path` (or `mangochain.toml` in the working directory),
/// then apply environment overrides. A missing file means defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut settings = match fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(source) => return Err(Error::ConfigRead { path, source }),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.farm.validate()?;
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> std::result::Result<Settings, toml::de::Error> {
    toml::from_str(raw)
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("MANGOCHAIN_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = var("MANGOCHAIN_STEP_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.autoplay.step_interval_ms = parsed;
        }
    }
}
