//! ffprobe stream information.

use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::DecodeError;

/// What the decoder needs to know about a video before reading frames.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate; `None` when the container does not report one.
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub codec: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a video file with ffprobe.
pub fn probe_video(path: &Path) -> Result<VideoInfo, DecodeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| DecodeError::Spawn("ffprobe", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecodeError::Probe(stderr.trim().to_string()));
    }

    parse_probe_output(&output.stdout)
}

pub(crate) fn parse_probe_output(json: &[u8]) -> Result<VideoInfo, DecodeError> {
    let probe: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| DecodeError::Probe(e.to_string()))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or(DecodeError::NoVideoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(DecodeError::FrameSize { width, height });
    }

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
        duration,
        codec: stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse a frame rate like "30000/1001" or "25". Zero or undefined rates
/// ("0/0") give `None`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        s.trim().parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
