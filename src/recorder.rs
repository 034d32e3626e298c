use crate::plate::CanonicalPlate;
use crate::sightings::{Sighting, SightingStore, StoreError, TIMESTAMP_FORMAT};
use chrono::Local;
use failure::Fail;
use image::DynamicImage;
use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// A new sighting was written; `image` is where its crop went.
    Saved { sighting: Sighting, image: PathBuf },
    SkippedDuplicate,
    /// Persisting failed and was logged. Nothing was recorded, so the next
    /// observation of the plate tries again.
    Failed,
}

#[derive(Debug, Fail)]
enum PersistError {
    #[fail(display = "{}", _0)]
    Store(#[fail(cause)] StoreError),
    #[fail(display = "unable to create {:?}: {}", _0, _1)]
    Directory(PathBuf, #[fail(cause)] io::Error),
    #[fail(display = "unable to save image {:?}: {}", _0, _1)]
    Image(PathBuf, #[fail(cause)] image::ImageError),
}

impl From<StoreError> for PersistError {
    fn from(e: StoreError) -> Self {
        PersistError::Store(e)
    }
}

/// Records unauthorized sightings, once per plate, with the plate crop saved
/// next to the store.
pub struct SightingRecorder {
    store: Box<dyn SightingStore>,
    image_dir: PathBuf,
}

impl SightingRecorder {
    pub fn new<P: AsRef<Path>>(store: Box<dyn SightingStore>, image_dir: P) -> Self {
        SightingRecorder {
            store,
            image_dir: image_dir.as_ref().to_path_buf(),
        }
    }

    pub fn store_mut(&mut self) -> &mut dyn SightingStore {
        self.store.as_mut()
    }

    pub fn record_if_new(&mut self, plate: &CanonicalPlate, image: &DynamicImage) -> RecordOutcome {
        match self.record_if_new_impl(plate, image) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error while saving unauthorized plate {}: {}", plate, e);
                RecordOutcome::Failed
            }
        }
    }

    fn record_if_new_impl(
        &mut self,
        plate: &CanonicalPlate,
        image: &DynamicImage,
    ) -> Result<RecordOutcome, PersistError> {
        if self.store.contains(plate)? {
            info!("License number {} already exists. Skipping save.", plate);
            return Ok(RecordOutcome::SkippedDuplicate);
        }

        fs::create_dir_all(&self.image_dir)
            .map_err(|e| PersistError::Directory(self.image_dir.clone(), e))?;

        let sighting = Sighting::new(plate, Local::now().format(TIMESTAMP_FORMAT).to_string());
        let image_path = self.image_dir.join(sighting.image_file_name());
        image
            .save(&image_path)
            .map_err(|e| PersistError::Image(image_path.clone(), e))?;

        if !self.store.insert(sighting.clone())? {
            // Another writer recorded the plate between our check and insert.
            warn!("License number {} was recorded concurrently. Skipping save.", plate);
            if let Err(e) = fs::remove_file(&image_path) {
                warn!("Unable to remove orphaned image {:?}: {}", image_path, e);
            }
            return Ok(RecordOutcome::SkippedDuplicate);
        }

        info!("Unauthorized plate saved: {:?}", image_path);
        Ok(RecordOutcome::Saved {
            sighting,
            image: image_path,
        })
    }
}
