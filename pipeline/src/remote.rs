//! Model-server backends for face location and emotion classification.
//!
//! Both clients are blocking and must only be called from a blocking thread
//! (e.g. `tokio::task::spawn_blocking`), which is where the pipeline runs.

use std::io::Cursor;
use std::time::Duration;

use emotion_timeline_common::config::{ClassifierConfig, LocatorConfig};
use emotion_timeline_common::emotion::{Distribution, NUM_LABELS};
use emotion_timeline_common::frame::FaceBox;
use image::{ImageFormat, RgbImage};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::EmotionClassifier;
use crate::error::InferenceError;
use crate::face::{FaceLocator, NormalizedTensor};

#[derive(Debug, Deserialize)]
struct DetectResponse {
    faces: Vec<FaceBox>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<[f32; 3]>>>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

fn build_client(timeout_secs: u64) -> Result<Client, InferenceError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn check_status(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    warn!(status = status.as_u16(), body, "model server error");
    Err(InferenceError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Face detector behind an HTTP endpoint.
///
/// `POST <url>?min_size=N` with the frame as a JPEG body, answered with
/// `{"faces": [{"x", "y", "width", "height"}, ...]}`.
pub struct RemoteFaceLocator {
    http: Client,
    url: String,
    min_face_size: u32,
}

impl RemoteFaceLocator {
    pub fn new(config: &LocatorConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            http: build_client(config.timeout_secs)?,
            url: config.url.clone(),
            min_face_size: config.min_face_size,
        })
    }
}

impl FaceLocator for RemoteFaceLocator {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, InferenceError> {
        let mut jpeg = Cursor::new(Vec::new());
        image.write_to(&mut jpeg, ImageFormat::Jpeg)?;

        let response = self
            .http
            .post(&self.url)
            .query(&[("min_size", self.min_face_size)])
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg.into_inner())
            .send()?;
        let detected: DetectResponse = check_status(response)?
            .json()
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        debug!(faces = detected.faces.len(), "faces detected");
        Ok(detected.faces)
    }

    fn name(&self) -> &str {
        "remote-locator"
    }
}

/// Emotion model served over the TensorFlow Serving REST predict API.
///
/// `POST <url>` with `{"instances": [tensor]}`, answered with
/// `{"predictions": [[p0, .., p4]]}` in label order.
pub struct RemoteEmotionClassifier {
    http: Client,
    url: String,
}

impl RemoteEmotionClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            http: build_client(config.timeout_secs)?,
            url: config.url.clone(),
        })
    }
}

impl EmotionClassifier for RemoteEmotionClassifier {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Distribution, InferenceError> {
        let request = PredictRequest {
            instances: vec![tensor.to_nested()],
        };
        let response = self.http.post(&self.url).json(&request).send()?;
        let predicted: PredictResponse = check_status(response)?
            .json()
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let row = predicted
            .predictions
            .first()
            .ok_or_else(|| InferenceError::InvalidResponse("empty predictions".into()))?;
        Distribution::from_slice(row).ok_or_else(|| {
            InferenceError::InvalidResponse(format!(
                "expected {NUM_LABELS} scores, got {}",
                row.len()
            ))
        })
    }

    fn name(&self) -> &str {
        "remote-classifier"
    }
}
