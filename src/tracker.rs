use crate::types::{BoundingBox, Detection, Track};

/// Assigns identities to vehicle detections across frames.
pub trait Tracker: Send {
    /// Feeds one frame's detections and returns the tracks they landed on.
    fn update(&mut self, detections: &[Detection]) -> Vec<Track>;
}

pub const DEFAULT_MIN_IOU: f32 = 0.3;
pub const DEFAULT_MAX_AGE: u32 = 1;

struct LiveTrack {
    id: u64,
    bbox: BoundingBox,
    misses: u32,
}

/// Greedy IoU association: each detection goes to the free track it
/// overlaps most, best pairs first.
pub struct IouTracker {
    min_iou: f32,
    max_age: u32,
    next_id: u64,
    tracks: Vec<LiveTrack>,
}

impl Default for IouTracker {
    fn default() -> Self {
        IouTracker::new(DEFAULT_MIN_IOU, DEFAULT_MAX_AGE)
    }
}

impl IouTracker {
    pub fn new(min_iou: f32, max_age: u32) -> Self {
        IouTracker {
            min_iou,
            max_age,
            next_id: 1,
            tracks: Vec::new(),
        }
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.min_iou {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_taken = vec![false; detections.len()];
        let mut out = Vec::with_capacity(detections.len());

        for (ti, di, _) in pairs {
            if track_taken[ti] || det_taken[di] {
                continue;
            }
            track_taken[ti] = true;
            det_taken[di] = true;
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.misses = 0;
            out.push(Track {
                track_id: track.id,
                bbox: track.bbox,
            });
        }

        for (track, taken) in self.tracks.iter_mut().zip(track_taken.iter()) {
            if !taken {
                track.misses += 1;
            }
        }
        let max_age = self.max_age;
        self.tracks.retain(|t| t.misses < max_age);

        for (det, taken) in detections.iter().zip(det_taken.iter()) {
            if *taken {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(LiveTrack {
                id,
                bbox: det.bbox,
                misses: 0,
            });
            out.push(Track {
                track_id: id,
                bbox: det.bbox,
            });
        }

        out
    }
}
