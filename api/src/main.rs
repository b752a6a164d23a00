mod error;
mod upload;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use emotion_timeline_common::config::{Config, UploadConfig};
use emotion_timeline_common::emotion::{dominant_emotion, EmotionEvent, Label};
use emotion_timeline_pipeline::decoder::{check_ffmpeg_available, FfmpegOpener, VideoOpener};
use emotion_timeline_pipeline::remote::{RemoteEmotionClassifier, RemoteFaceLocator};
use emotion_timeline_pipeline::{EmotionPipeline, PipelineError, PipelineOptions};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    pipeline: EmotionPipeline,
    videos: Arc<dyn VideoOpener>,
    upload: UploadConfig,
    /// Held for the duration of each inference when requests are serialized.
    inference_lock: Option<Mutex<()>>,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ImagePrediction {
    emotion: Label,
}

#[derive(Debug, Serialize, Deserialize)]
struct VideoSummary {
    events: Vec<EmotionEvent>,
    dominant_emotion: Option<Label>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoQuery {
    #[serde(default)]
    summary: bool,
}

// ---------------------------------------------------------------------------
// Blocking pipeline runner
// ---------------------------------------------------------------------------

/// Run a pipeline job on the blocking pool, one at a time if configured.
async fn run_pipeline<T, F>(state: &Arc<AppState>, job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, PipelineError> + Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || {
        let _guard = state
            .inference_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));
        job(&state)
    })
    .await;

    match result {
        Ok(outcome) => outcome.map_err(ApiError::from),
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            Err(ApiError::Internal("inference worker failed".into()))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / and GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /predict/image: multipart `file` to `{ "emotion": "happy" }`
async fn predict_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImagePrediction>, ApiError> {
    const MISSING: ApiError = ApiError::MissingInput("No file uploaded");

    let mut multipart = multipart.map_err(|_| MISSING)?;
    let field = upload::file_field(&mut multipart).await?.ok_or(MISSING)?;
    let name = upload::filename(&field);
    if !state.upload.accepts_image(&name) {
        return Err(ApiError::UnsupportedFormat(name));
    }
    let bytes = upload::read_bytes(field).await?;
    if bytes.is_empty() {
        return Err(MISSING);
    }

    info!(file = name, bytes = bytes.len(), "image prediction requested");
    let emotion = run_pipeline(&state, move |s| s.pipeline.classify_image_bytes(&bytes)).await?;
    Ok(Json(ImagePrediction { emotion }))
}

/// POST /predict/video?summary=: multipart `file` to `[{ "timestamp", "emotion" }]`
async fn predict_video(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VideoQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    const MISSING: ApiError = ApiError::MissingInput("No video uploaded");

    let mut multipart = multipart.map_err(|_| MISSING)?;
    let field = upload::file_field(&mut multipart).await?.ok_or(MISSING)?;
    let name = upload::filename(&field);
    if !state.upload.accepts_video(&name) {
        return Err(ApiError::UnsupportedFormat(name));
    }
    let (staged, bytes) =
        upload::stage_to_temp(field, state.upload.temp_dir.as_deref(), &name).await?;
    if bytes == 0 {
        return Err(MISSING);
    }

    info!(file = name, bytes, path = %staged.path().display(), "video prediction requested");
    let events = run_pipeline(&state, move |s| {
        let source = s.videos.open(staged.path())?;
        let events = s.pipeline.timeline(source);
        drop(staged);
        events
    })
    .await?;

    if query.summary {
        let summary = VideoSummary {
            dominant_emotion: dominant_emotion(&events),
            events,
        };
        return Ok(Json(summary).into_response());
    }
    Ok(Json(events).into_response())
}

fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/predict/image", post(predict_image))
        .route("/predict/video", post(predict_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        locator = config.locator.url,
        classifier = config.classifier.url,
        samples_per_second = config.sampling.samples_per_second,
        min_face_size = config.locator.min_face_size,
        serialize_inference = config.server.serialize_inference,
        "starting emotion-timeline API"
    );

    // The model-server clients block, so they are built off the async workers.
    let backend_config = config.clone();
    let backends = tokio::task::spawn_blocking(move || {
        check_ffmpeg_available();
        let locator = RemoteFaceLocator::new(&backend_config.locator)?;
        let classifier = RemoteEmotionClassifier::new(&backend_config.classifier)?;
        Ok::<_, emotion_timeline_pipeline::InferenceError>((locator, classifier))
    })
    .await;

    let (locator, classifier) = match backends {
        Ok(Ok(b)) => b,
        Ok(Err(e)) => {
            error!(error = %e, "failed to build model-server clients");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            std::process::exit(1);
        }
    };

    let pipeline = EmotionPipeline::new(
        Arc::new(locator),
        Arc::new(classifier),
        PipelineOptions::from(&config),
    );
    let state = Arc::new(AppState {
        pipeline,
        videos: Arc::new(FfmpegOpener),
        upload: config.upload.clone(),
        inference_lock: config.server.serialize_inference.then(|| Mutex::new(())),
    });

    let app = router(state, config.upload.max_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr, "emotion-timeline API server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
