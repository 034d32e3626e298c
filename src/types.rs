use crate::pipeline::Detector;
use image::{DynamicImage, GenericImageView};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BoundingBox { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Pixel rectangle `(x, y, w, h)` clipped to a `width` x `height` image,
    /// or `None` if nothing of the box lies inside it.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0) as u32;
        let y1 = self.y1.max(0.0) as u32;
        let x2 = (self.x2.max(0.0) as u32).min(width);
        let y2 = (self.y2.max(0.0) as u32).min(height);
        if x2 <= x1 || y2 <= y1 {
            None
        } else {
            Some((x1, y1, x2 - x1, y2 - y1))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub score: f32,
    /// Text reported by the detector along with the box, if it reads plates.
    pub reading: Option<String>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: u32, score: f32) -> Self {
        Detection {
            bbox,
            class_id,
            score,
            reading: None,
        }
    }

    pub fn with_reading<S: Into<String>>(mut self, reading: S) -> Self {
        self.reading = Some(reading.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub track_id: u64,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: DynamicImage,
    pub vehicles: Vec<Detection>,
    pub plates: Vec<Detection>,
}

impl Frame {
    /// Runs `detector` over `image` to build the frame.
    pub fn detect(index: u64, image: DynamicImage, detector: &mut dyn Detector) -> Frame {
        let vehicles = detector.detect_vehicles(&image);
        let plates = detector.detect_plates(&image);
        Frame {
            index,
            image,
            vehicles,
            plates,
        }
    }

    /// Crop of `bbox`, clipped to the frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<DynamicImage> {
        let (x, y, w, h) = bbox.clip_to(self.image.width(), self.image.height())?;
        Some(self.image.crop_imm(x, y, w, h))
    }
}
