use emotion_timeline_common::frame::FaceBox;
use image::RgbImage;
use tracing::debug;

use crate::error::InferenceError;

/// Face detection backend.
///
/// Implementations return every detection they find, in whatever order the
/// backend produces. Picking the face to classify is done by
/// [`select_primary_face`], not by the backend.
pub trait FaceLocator: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, InferenceError>;

    /// Detect and reduce to the primary face.
    fn locate(&self, image: &RgbImage, min_face_size: u32) -> Result<Option<FaceBox>, InferenceError> {
        let boxes = self.detect(image)?;
        Ok(select_primary_face(&boxes, image.width(), image.height(), min_face_size))
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Pick the one face the pipeline classifies.
///
/// Boxes are clamped to the frame first; empty ones and ones narrower or
/// shorter than `min_face_size` are dropped. The largest area wins, then the
/// topmost, then the leftmost.
pub fn select_primary_face(
    boxes: &[FaceBox],
    frame_width: u32,
    frame_height: u32,
    min_face_size: u32,
) -> Option<FaceBox> {
    let chosen = boxes
        .iter()
        .filter_map(|b| b.clamp_to(frame_width, frame_height))
        .filter(|b| b.width >= min_face_size && b.height >= min_face_size)
        .min_by_key(|b| (std::cmp::Reverse(b.area()), b.y, b.x));
    debug!(
        candidates = boxes.len(),
        chosen = ?chosen,
        "primary face selection"
    );
    chosen
}
