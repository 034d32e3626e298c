use crate::pipeline::DEFAULT_VEHICLE_CLASSES;
use failure::Fail;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Fail, PartialEq)]
pub enum ConfigError {
    #[fail(display = "invalid value '{}' for {}", value, key)]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SightingBackend {
    Json(PathBuf),
    Sqlite(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub license_data_path: PathBuf,
    pub unauthorized_path: PathBuf,
    pub sighting_store: SightingBackend,
    pub vehicle_classes: Vec<u32>,
    pub recognizer_url: Option<String>,
    pub recognizer_token: Option<String>,
    pub recognize_timeout: Duration,
    pub webhook_port: u16,
    pub queue_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let unauthorized_path = PathBuf::from(var("UNAUTHORIZED_PATH", "./unauthorized"));
        let store_path = lookup("SIGHTING_STORE_PATH").map(PathBuf::from);
        let sighting_store = match var("SIGHTING_STORE", "json").as_str() {
            "json" => SightingBackend::Json(
                store_path.unwrap_or_else(|| unauthorized_path.join("unauthorized_plates.json")),
            ),
            "sqlite" => SightingBackend::Sqlite(
                store_path.unwrap_or_else(|| unauthorized_path.join("sightings.db")),
            ),
            other => return Err(invalid("SIGHTING_STORE", other)),
        };

        let classes = var("VEHICLE_CLASSES", "");
        let vehicle_classes = if classes.trim().is_empty() {
            DEFAULT_VEHICLE_CLASSES.to_vec()
        } else {
            classes
                .split(',')
                .map(|c| c.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid("VEHICLE_CLASSES", &classes))?
        };

        let timeout = var("RECOGNIZER_TIMEOUT_MS", "5000");
        let recognize_timeout = timeout
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| invalid("RECOGNIZER_TIMEOUT_MS", &timeout))?;

        let port = var("WEBHOOK_PORT", "8402");
        let webhook_port = port.parse().map_err(|_| invalid("WEBHOOK_PORT", &port))?;

        let depth = var("QUEUE_DEPTH", "8");
        let queue_depth = match depth.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return Err(invalid("QUEUE_DEPTH", &depth)),
        };

        Ok(Config {
            license_data_path: PathBuf::from(var("LICENSE_DATA_PATH", "./license_data.json")),
            unauthorized_path,
            sighting_store,
            vehicle_classes,
            recognizer_url: lookup("RECOGNIZER_URL").filter(|u| !u.is_empty()),
            recognizer_token: lookup("RECOGNIZER_TOKEN").filter(|t| !t.is_empty()),
            recognize_timeout,
            webhook_port,
            queue_depth,
        })
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}
