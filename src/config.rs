//! Configuration: credentials and map settings.
//!
//! The file keeps the layout the tool has always used, with everything under
//! a `credentials` object:
//!
//! ```json
//! {
//!   "credentials": {
//!     "client_id": "124433",
//!     "client_secret": "...",
//!     "refresh_token": "...",
//!     "map_center": [47.690191, -122.22548],
//!     "map_zoom": 11
//!   }
//! }
//! ```
//!
//! `STRAVA_CLIENT_ID`, `STRAVA_CLIENT_SECRET` and `STRAVA_REFRESH_TOKEN`
//! override the corresponding file values.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::GpsPoint;

pub const ENV_CLIENT_ID: &str = "STRAVA_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "STRAVA_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "STRAVA_REFRESH_TOKEN";

pub const DEFAULT_MAP_ZOOM: u8 = 11;

/// OAuth application credentials plus the athlete's refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Initial map viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    /// `None` fits the map to its paths
    pub center: Option<GpsPoint>,
    pub zoom: u8,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            center: None,
            zoom: DEFAULT_MAP_ZOOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub credentials: Credentials,
    pub map: MapSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    credentials: RawCredentials,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCredentials {
    client_id: Option<Value>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    map_center: Option<[f64; 2]>,
    map_zoom: Option<u8>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

impl Config {
    /// Load from a JSON file, then apply process environment overrides.
    ///
    /// A missing file is not an error as long as the environment supplies
    /// the credentials.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match fs::read_to_string(path) {
            Ok(contents) => {
                debug!("[Config] Loaded {}", path.display());
                parse_file(&contents, &path.display().to_string())?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("[Config] {} not found, using environment only", path.display());
                ConfigFile::default()
            }
            Err(e) => {
                return Err(SyncError::config(format!(
                    "could not read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Parse a JSON document without consulting the environment.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        Self::resolve(parse_file(contents, "config")?, |_| None)
    }

    /// Parse a JSON document, taking overrides from `env`.
    pub fn from_json_str_with_env(
        contents: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        Self::resolve(parse_file(contents, "config")?, env)
    }

    fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for key in file.extra.keys().chain(file.credentials.extra.keys()) {
            warn!("[Config] Unknown config key '{}'", key);
        }
        let raw = file.credentials;

        let client_id = env(ENV_CLIENT_ID)
            .or_else(|| raw.client_id.as_ref().and_then(client_id_string))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("client_id", ENV_CLIENT_ID))?;
        let client_secret = env(ENV_CLIENT_SECRET)
            .or(raw.client_secret)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("client_secret", ENV_CLIENT_SECRET))?;
        let refresh_token = env(ENV_REFRESH_TOKEN)
            .or(raw.refresh_token)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("refresh_token", ENV_REFRESH_TOKEN))?;

        let center = match raw.map_center {
            Some([lat, lng]) => {
                let point = GpsPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(SyncError::config(format!(
                        "map_center [{}, {}] is not a valid coordinate",
                        lat, lng
                    )));
                }
                Some(point)
            }
            None => None,
        };

        Ok(Self {
            credentials: Credentials {
                client_id,
                client_secret,
                refresh_token,
            },
            map: MapSettings {
                center,
                zoom: raw.map_zoom.unwrap_or(DEFAULT_MAP_ZOOM),
            },
        })
    }

    /// Dataset file name for this credential: `<client_id>-activities.csv`.
    pub fn dataset_file_name(&self) -> String {
        format!("{}-activities.csv", self.credentials.client_id)
    }
}

fn parse_file(contents: &str, origin: &str) -> Result<ConfigFile> {
    serde_json::from_str(contents)
        .map_err(|e| SyncError::config(format!("could not parse {}: {}", origin, e)))
}

fn client_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn missing(field: &str, env_var: &str) -> SyncError {
    SyncError::config(format!(
        "credentials.{} is required (or set {})",
        field, env_var
    ))
}
