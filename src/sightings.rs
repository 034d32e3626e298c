use crate::plate::CanonicalPlate;
use failure::Fail;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Timestamp format used in sighting records and image file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub license_number: String,
    #[serde(default)]
    pub timestamp: String,
}

impl Sighting {
    pub fn new(plate: &CanonicalPlate, timestamp: String) -> Self {
        Sighting {
            license_number: plate.to_string(),
            timestamp,
        }
    }

    /// Name of the crop image persisted with this sighting.
    pub fn image_file_name(&self) -> String {
        format!("unauthorized_{}_{}.png", self.license_number, self.timestamp)
    }
}

#[derive(Debug, Fail)]
pub enum StoreError {
    #[fail(display = "I/O error on sighting store {:?}: {}", _0, _1)]
    Io(PathBuf, #[fail(cause)] io::Error),
    #[fail(display = "malformed sighting store {:?}: {}", _0, _1)]
    Malformed(PathBuf, #[fail(cause)] serde_json::Error),
    #[fail(display = "sighting database error: {}", _0)]
    Database(#[fail(cause)] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Persisted sightings, at most one per plate.
pub trait SightingStore: Send {
    /// All sightings in the order they were first recorded.
    fn sightings(&mut self) -> Result<Vec<Sighting>, StoreError>;

    fn contains(&mut self, plate: &CanonicalPlate) -> Result<bool, StoreError> {
        Ok(self
            .sightings()?
            .iter()
            .any(|s| s.license_number == plate.as_str()))
    }

    /// Adds `sighting` unless its plate is already present. Returns whether
    /// a record was written; an existing record is never replaced.
    fn insert(&mut self, sighting: Sighting) -> Result<bool, StoreError>;
}

/// Sightings kept as a pretty-printed JSON array. Every insert rewrites the
/// whole file through a temporary sibling and a rename, so readers only ever
/// see a complete array.
pub struct JsonSightingStore {
    path: PathBuf,
}

impl JsonSightingStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonSightingStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, e: io::Error) -> StoreError {
        StoreError::Io(self.path.clone(), e)
    }

    fn write_all(&self, sightings: &[Sighting]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let file = File::create(&tmp).map_err(|e| self.io_err(e))?;
        let mut writer = BufWriter::new(file);
        let mut ser = serde_json::Serializer::with_formatter(
            &mut writer,
            serde_json::ser::PrettyFormatter::with_indent(b"    "),
        );
        sightings
            .serialize(&mut ser)
            .map_err(|e| StoreError::Malformed(self.path.clone(), e))?;
        writer.flush().map_err(|e| self.io_err(e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

impl SightingStore for JsonSightingStore {
    fn sightings(&mut self) -> Result<Vec<Sighting>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StoreError::Malformed(self.path.clone(), e))
    }

    fn insert(&mut self, sighting: Sighting) -> Result<bool, StoreError> {
        let mut existing = self.sightings()?;
        if existing
            .iter()
            .any(|s| s.license_number == sighting.license_number)
        {
            return Ok(false);
        }
        existing.push(sighting);
        self.write_all(&existing)?;
        Ok(true)
    }
}
