//! Facial emotion processing: frame sampling, face normalization,
//! classification and the emotion-change timeline for videos.

pub mod classify;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod face;
pub mod remote;
pub mod sampler;
pub mod timeline;

pub use engine::{EmotionPipeline, PipelineOptions};
pub use error::{DecodeError, InferenceError, PipelineError};
