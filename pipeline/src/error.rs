/// The payload could not be turned into frames.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to probe video: {0}")]
    Probe(String),
    #[error("no video stream found")]
    NoVideoStream,
    #[error("unsupported frame size {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("truncated frame {index}: got {got} of {expected} bytes")]
    TruncatedFrame {
        index: u64,
        got: usize,
        expected: usize,
    },
    #[error("ffmpeg exited with error: {0}")]
    FfmpegFailed(String),
    #[error("io error while decoding: {0}")]
    Io(#[from] std::io::Error),
}

/// A face locator or emotion classifier backend failed.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model server request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("failed to encode frame for the model server: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
