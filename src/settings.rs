use std::{
    fmt,
    fs,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, models::EntityId};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::settings";

use crate::log_warn;

pub const CONFIG_PATH_VAR: &str = "FICHAJE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fichaje.json";
const ACCELERATION_VAR: &str = "FICHAJE_ACCELERATION";
const STORE_PATH_VAR: &str = "FICHAJE_STORE_PATH";
const BIND_VAR: &str = "FICHAJE_BIND";
const TOKEN_VAR: &str = "DISCORD_TOKEN";
const PUBLIC_KEY_VAR: &str = "DISCORD_PUBLIC_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracked_entities: Vec<EntityId>,
    pub acceleration_factor: f64,
    pub record_store_path: PathBuf,
    pub summary_destination: Option<EntityId>,
    pub cleanup_period_secs: u64,
    pub replica_path: Option<PathBuf>,
    pub bind_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracked_entities: Vec::new(),
            acceleration_factor: 1.0,
            record_store_path: PathBuf::from("horas_trabajadores.json"),
            summary_destination: None,
            cleanup_period_secs: 600,
            replica_path: None,
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

impl Settings {
    /// Reads a settings file. A missing file means defaults; anything that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log_warn!("No settings file at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(unreadable(path, err)),
        };
        serde_json::from_str(&contents).map_err(|err| unreadable(path, err))
    }

    /// File named by `FICHAJE_CONFIG`, then environment overrides, then
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let path = lookup(CONFIG_PATH_VAR).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut settings = Self::load(Path::new(&path))?;
        settings.apply_overrides(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ACCELERATION_VAR) {
            self.acceleration_factor = raw.trim().parse().map_err(|err| ConfigError::InvalidValue {
                key: ACCELERATION_VAR.into(),
                message: format!("'{raw}': {err}"),
            })?;
        }
        if let Some(path) = lookup(STORE_PATH_VAR) {
            self.record_store_path = PathBuf::from(path);
        }
        if let Some(bind) = lookup(BIND_VAR) {
            self.bind_address = bind;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.acceleration_factor.is_finite() || self.acceleration_factor <= 0.0 {
            return Err(invalid(
                "acceleration_factor",
                format!("must be a positive number, got {}", self.acceleration_factor),
            ));
        }
        if self.cleanup_period_secs == 0 {
            return Err(invalid("cleanup_period_secs", "must be greater than zero"));
        }
        if let Some(destination) = self.summary_destination {
            if self.tracked_entities.contains(&destination) {
                return Err(invalid(
                    "summary_destination",
                    format!("channel {destination} is also a tracked channel"),
                ));
            }
        }
        if let Err(err) = self.bind_address.parse::<SocketAddr>() {
            return Err(invalid("bind_address", format!("'{}': {err}", self.bind_address)));
        }
        if self.tracked_entities.is_empty() {
            log_warn!("No tracked channels configured; only the summary will be maintained");
        }
        Ok(())
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_period_secs)
    }
}

/// Platform secrets. Only ever read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub public_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.into()))
        };

        Ok(Self {
            bot_token: required(TOKEN_VAR)?,
            public_key: required(PUBLIC_KEY_VAR)?,
        })
    }
}

fn unreadable(path: &Path, err: impl fmt::Display) -> ConfigError {
    ConfigError::Unreadable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}
