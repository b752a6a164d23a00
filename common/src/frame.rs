use image::RgbImage;

/// One decoded video frame (or a still image wrapped as frame 0).
///
/// Frames come out of a decoder with strictly increasing `index` and
/// non-decreasing `timestamp_secs`. The pipeline borrows a frame for a single
/// processing step and drops it afterwards.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based position in the decoded stream.
    pub index: u64,
    /// Presentation timestamp in seconds.
    pub timestamp_secs: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_secs: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_secs,
            image,
        }
    }

    /// Wrap a still image so it can go through the same face/classify step.
    pub fn still(image: RgbImage) -> Self {
        Self::new(0, 0.0, image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect the box with a `frame_width` x `frame_height` frame.
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceBox> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let right = self.x.saturating_add(self.width).min(frame_width);
        let bottom = self.y.saturating_add(self.height).min(frame_height);
        let clamped = FaceBox::new(self.x, self.y, right - self.x, bottom - self.y);
        if clamped.width == 0 || clamped.height == 0 {
            return None;
        }
        Some(clamped)
    }

    /// True if the box lies entirely inside the frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }
}
