use emotion_timeline_common::emotion::{Distribution, Label};
use tracing::debug;

use crate::error::InferenceError;
use crate::face::NormalizedTensor;

/// Emotion model backend: scores one normalized face over the fixed label set.
pub trait EmotionClassifier: Send + Sync {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Distribution, InferenceError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Run the classifier and reduce its distribution to a single label.
pub fn classify(
    classifier: &dyn EmotionClassifier,
    tensor: &NormalizedTensor,
) -> Result<Label, InferenceError> {
    let distribution = classifier.predict(tensor)?;
    let label = distribution.argmax().ok_or_else(|| {
        InferenceError::InvalidResponse(format!(
            "{} returned no finite score: {:?}",
            classifier.name(),
            distribution.0
        ))
    })?;
    debug!(
        classifier = classifier.name(),
        %label,
        score = distribution.score(label),
        "face classified"
    );
    Ok(label)
}
