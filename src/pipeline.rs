use crate::plate::{normalize, CanonicalPlate};
use crate::recognizer::Recognizer;
use crate::recorder::{RecordOutcome, SightingRecorder};
use crate::registry::{AuthorizationRecord, AuthorizationStatus, Registry};
use crate::tracker::Tracker;
use crate::types::{BoundingBox, Detection, Frame, Track};
use image::DynamicImage;
use log::{debug, error, info};
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub type Rgb = [u8; 3];

pub const AUTHORIZED_COLOR: Rgb = [0, 255, 0];
pub const DENIED_COLOR: Rgb = [255, 0, 0];
pub const TRACK_COLOR: Rgb = [0, 0, 255];

/// COCO ids for car, motorbike, bus and truck.
pub const DEFAULT_VEHICLE_CLASSES: [u32; 4] = [2, 3, 5, 7];

/// Produces vehicle and plate boxes for a frame image.
pub trait Detector {
    fn detect_vehicles(&mut self, image: &DynamicImage) -> Vec<Detection>;
    fn detect_plates(&mut self, image: &DynamicImage) -> Vec<Detection>;
}

/// Receives what should be drawn for a frame. The pipeline never draws.
pub trait Renderer: Send {
    fn render(&mut self, frame: &Frame, annotations: &[Annotation], tracks: &[Track]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub plate: CanonicalPlate,
    pub verdict: Verdict,
    pub color: Rgb,
    pub lines: Vec<String>,
}

impl Annotation {
    fn new(bbox: BoundingBox, plate: CanonicalPlate, record: Option<&AuthorizationRecord>) -> Self {
        let verdict = match record.map(AuthorizationRecord::status) {
            Some(AuthorizationStatus::Authorized) => Verdict::Authorized,
            _ => Verdict::Denied,
        };
        let color = match verdict {
            Verdict::Authorized => AUTHORIZED_COLOR,
            Verdict::Denied => DENIED_COLOR,
        };
        let lines = match record {
            Some(r) => vec![
                format!("Plate: {}", plate),
                format!("Name: {}", r.name),
                format!("Profession: {}", r.profession),
                format!("Status: {}", r.authorization_status),
            ],
            None => vec![format!("Unknown Plate: {}", plate)],
        };
        Annotation {
            bbox,
            plate,
            verdict,
            color,
            lines,
        }
    }
}

/// What happened to one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub annotations: Vec<Annotation>,
    pub tracks: Vec<Track>,
    pub recorded: Vec<(CanonicalPlate, RecordOutcome)>,
}

pub struct Controller {
    recognizer: Box<dyn Recognizer>,
    tracker: Box<dyn Tracker>,
    registry: Box<dyn Registry + Send>,
    recorder: SightingRecorder,
    renderer: Box<dyn Renderer>,
    vehicle_classes: Vec<u32>,
    recognize_budget: Duration,
}

impl Controller {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        tracker: Box<dyn Tracker>,
        registry: Box<dyn Registry + Send>,
        recorder: SightingRecorder,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Controller {
            recognizer,
            tracker,
            registry,
            recorder,
            renderer,
            vehicle_classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
            recognize_budget: Duration::from_secs(5),
        }
    }

    pub fn vehicle_classes(mut self, classes: Vec<u32>) -> Self {
        self.vehicle_classes = classes;
        self
    }

    pub fn recognize_budget(mut self, budget: Duration) -> Self {
        self.recognize_budget = budget;
        self
    }

    pub fn recorder_mut(&mut self) -> &mut SightingRecorder {
        &mut self.recorder
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let mut report = FrameReport::default();

        let vehicles: Vec<Detection> = frame
            .vehicles
            .iter()
            .filter(|d| self.vehicle_classes.contains(&d.class_id))
            .cloned()
            .collect();
        if !vehicles.is_empty() {
            report.tracks = self.tracker.update(&vehicles);
        }

        for detection in &frame.plates {
            let crop = match frame.crop(&detection.bbox) {
                Some(crop) => crop,
                None => {
                    debug!("Frame {}: plate box {:?} outside image", frame.index, detection.bbox);
                    continue;
                }
            };
            let plate = match self.read_plate(frame.index, &crop, detection) {
                Some(plate) => plate,
                None => continue,
            };

            let record = self.registry.lookup_or_absent(&plate);
            let annotation = Annotation::new(detection.bbox, plate.clone(), record.as_ref());
            if annotation.verdict == Verdict::Denied {
                let outcome = self.recorder.record_if_new(&plate, &crop);
                report.recorded.push((plate, outcome));
            }
            report.annotations.push(annotation);
        }

        self.renderer
            .render(frame, &report.annotations, &report.tracks);
        report
    }

    fn read_plate(
        &mut self,
        frame_index: u64,
        crop: &DynamicImage,
        detection: &Detection,
    ) -> Option<CanonicalPlate> {
        let gray = crop.grayscale();
        let raw = match self
            .recognizer
            .recognize(&gray, detection, self.recognize_budget)
        {
            Ok(raw) => raw,
            Err(e) => {
                error!("Frame {}: recognizer failed: {}", frame_index, e);
                return None;
            }
        };
        if raw.trim().is_empty() {
            debug!("Frame {}: no text recognized", frame_index);
            return None;
        }
        let plate = normalize(&raw);
        if plate.is_none() {
            debug!("Frame {}: '{}' does not fit the plate grammar", frame_index, raw);
        }
        plate
    }

    /// Processes frames in arrival order until every sender is gone.
    pub fn run(mut self, rx: Receiver<Frame>) {
        info!("Pipeline worker started");
        for frame in rx {
            let report = self.process_frame(&frame);
            debug!(
                "Frame {}: {} plate(s), {} track(s)",
                frame.index,
                report.annotations.len(),
                report.tracks.len()
            );
        }
        info!("Frame queue closed, pipeline worker exiting");
    }
}

/// Renderer for headless runs: writes the annotations to the log.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &Frame, annotations: &[Annotation], tracks: &[Track]) {
        for a in annotations {
            info!("Frame {}: {:?} {}", frame.index, a.verdict, a.lines.join(" | "));
        }
        for t in tracks {
            debug!("Frame {}: ID: {} at {:?}", frame.index, t.track_id, t.bbox);
        }
    }
}
