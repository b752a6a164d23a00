pub mod ffmpeg;
pub mod probe;

use std::io::Cursor;
use std::path::Path;

use emotion_timeline_common::frame::Frame;
use image::{ImageReader, RgbImage};

use crate::error::DecodeError;

pub use ffmpeg::{check_ffmpeg_available, FfmpegDecoder};
pub use probe::{probe_video, VideoInfo};

/// A finite, ordered, single-pass stream of decoded frames.
pub trait FrameSource: Iterator<Item = Result<Frame, DecodeError>> {
    /// Frame rate reported by the container, if any.
    fn nominal_fps(&self) -> Option<f64>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn nominal_fps(&self) -> Option<f64> {
        (**self).nominal_fps()
    }
}

/// Opens a staged video file as a frame source.
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource + Send>, DecodeError>;
}

/// Decodes videos with the ffmpeg command-line tools.
pub struct FfmpegOpener;

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource + Send>, DecodeError> {
        Ok(Box::new(FfmpegDecoder::open(path)?))
    }
}

/// In-memory frame source, for still-image sequences and tests.
pub struct VecSource {
    frames: std::vec::IntoIter<Result<Frame, DecodeError>>,
    fps: Option<f64>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>, fps: Option<f64>) -> Self {
        Self::from_results(frames.into_iter().map(Ok).collect(), fps)
    }

    pub fn from_results(frames: Vec<Result<Frame, DecodeError>>, fps: Option<f64>) -> Self {
        Self {
            frames: frames.into_iter(),
            fps,
        }
    }
}

impl Iterator for VecSource {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next()
    }
}

impl FrameSource for VecSource {
    fn nominal_fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Decode an uploaded still image to RGB8, sniffing the format from its bytes.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    #[test]
    fn decodes_png_bytes() {
        let image = RgbImage::from_pixel(7, 5, Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        let decoded = decode_image(buf.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (7, 5));
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(decode_image(b"definitely not an image").is_err());
        assert!(decode_image(&[]).is_err());
    }

    #[test]
    fn vec_source_reports_fps() {
        let source = VecSource::new(vec![Frame::still(RgbImage::new(1, 1))], Some(25.0));
        assert_eq!(source.nominal_fps(), Some(25.0));
        assert_eq!(source.count(), 1);
    }
}
