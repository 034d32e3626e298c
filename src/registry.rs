use crate::plate::CanonicalPlate;
use failure::Fail;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Status string a registry entry must carry, exactly, to be authorized.
pub const AUTHORIZED: &str = "Authorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profession: String,
    #[serde(default)]
    pub authorization_status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Unauthorized,
}

impl AuthorizationRecord {
    pub fn status(&self) -> AuthorizationStatus {
        if self.authorization_status == AUTHORIZED {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Unauthorized
        }
    }
}

#[derive(Debug, Fail)]
pub enum RegistryError {
    #[fail(display = "registry file {:?} not found", _0)]
    NotFound(PathBuf),
    #[fail(display = "unable to read registry {:?}: {}", _0, _1)]
    Io(PathBuf, #[fail(cause)] io::Error),
    #[fail(display = "malformed registry {:?}: {}", _0, _1)]
    Malformed(PathBuf, #[fail(cause)] serde_json::Error),
}

/// Read-only authorization lookup keyed by canonical plate.
pub trait Registry {
    fn lookup(&self, plate: &CanonicalPlate) -> Result<Option<AuthorizationRecord>, RegistryError>;

    /// Like `lookup`, but an unavailable registry is logged and reads as
    /// absent.
    fn lookup_or_absent(&self, plate: &CanonicalPlate) -> Option<AuthorizationRecord> {
        match self.lookup(plate) {
            Ok(record) => record,
            Err(e) => {
                warn!("Registry unavailable, treating {} as unknown: {}", plate, e);
                None
            }
        }
    }

    fn is_authorized(&self, plate: &CanonicalPlate) -> bool {
        self.lookup_or_absent(plate)
            .map_or(false, |r| r.status() == AuthorizationStatus::Authorized)
    }
}

/// Registry backed by a JSON object file. The file is re-read on every
/// lookup, so edits take effect without a restart.
pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonRegistry {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<HashMap<String, AuthorizationRecord>, RegistryError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(RegistryError::Io(self.path.clone(), e)),
        };
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RegistryError::Malformed(self.path.clone(), e))
    }
}

impl Registry for JsonRegistry {
    fn lookup(&self, plate: &CanonicalPlate) -> Result<Option<AuthorizationRecord>, RegistryError> {
        Ok(self.load()?.remove(plate.as_str()))
    }
}

impl Registry for HashMap<String, AuthorizationRecord> {
    fn lookup(&self, plate: &CanonicalPlate) -> Result<Option<AuthorizationRecord>, RegistryError> {
        Ok(self.get(plate.as_str()).cloned())
    }
}
