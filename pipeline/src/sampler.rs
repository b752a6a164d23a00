use emotion_timeline_common::frame::Frame;
use tracing::{debug, warn};

use crate::error::DecodeError;

/// Keep every `interval`-th frame of the stream, chosen by frame index so the
/// selection only depends on the frame rate and the cadence.
///
/// `interval = round(fps / samples_per_second)`. With the default cadence of
/// 0.5 samples per second this is `round(fps * 2)`. A missing, zero,
/// negative or non-finite frame rate gives an interval of 1 (every frame is
/// kept) instead of a modulo by zero.
pub fn frame_interval(fps: Option<f64>, samples_per_second: f64) -> u64 {
    let Some(fps) = fps.filter(|f| f.is_finite() && *f > 0.0) else {
        warn!(?fps, "nominal frame rate unavailable, sampling every frame");
        return 1;
    };
    if !samples_per_second.is_finite() || samples_per_second <= 0.0 {
        return 1;
    }
    let interval = (fps / samples_per_second).round();
    if interval < 1.0 {
        1
    } else {
        interval as u64
    }
}

/// Lazy sampling adapter over a decoded frame stream.
///
/// Frames that are not sampled are dropped as soon as they are pulled; only
/// the frame being handed out is alive at any time. Decode errors are always
/// passed through so a broken stream is never mistaken for a short one.
pub struct FrameSampler<I> {
    frames: I,
    interval: u64,
    seen: u64,
    kept: u64,
}

impl<I> FrameSampler<I>
where
    I: Iterator<Item = Result<Frame, DecodeError>>,
{
    pub fn new(frames: I, interval: u64) -> Self {
        Self {
            frames,
            interval: interval.max(1),
            seen: 0,
            kept: 0,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Frames pulled from the decoder so far.
    pub fn frames_seen(&self) -> u64 {
        self.seen
    }

    pub fn frames_kept(&self) -> u64 {
        self.kept
    }

    pub fn is_sampled(&self, index: u64) -> bool {
        index % self.interval == 0
    }
}

impl<I> Iterator for FrameSampler<I>
where
    I: Iterator<Item = Result<Frame, DecodeError>>,
{
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = match self.frames.next()? {
                Ok(f) => f,
                Err(e) => return Some(Err(e)),
            };
            self.seen += 1;
            if self.is_sampled(frame.index) {
                self.kept += 1;
                debug!(
                    index = frame.index,
                    ts = frame.timestamp_secs,
                    interval = self.interval,
                    "frame sampled"
                );
                return Some(Ok(frame));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frames(count: u64, fps: f64) -> impl Iterator<Item = Result<Frame, DecodeError>> {
        (0..count).map(move |i| Ok(Frame::new(i, i as f64 / fps, RgbImage::new(2, 2))))
    }

    #[test]
    fn default_cadence_is_twice_fps() {
        assert_eq!(frame_interval(Some(30.0), 0.5), 60);
        assert_eq!(frame_interval(Some(25.0), 0.5), 50);
        assert_eq!(frame_interval(Some(29.97), 0.5), 60);
        assert_eq!(frame_interval(Some(23.976), 0.5), 48);
    }

    #[test]
    fn unusable_fps_falls_back_to_every_frame() {
        assert_eq!(frame_interval(Some(0.0), 0.5), 1);
        assert_eq!(frame_interval(None, 0.5), 1);
        assert_eq!(frame_interval(Some(f64::NAN), 0.5), 1);
        assert_eq!(frame_interval(Some(-24.0), 0.5), 1);
        assert_eq!(frame_interval(Some(f64::INFINITY), 0.5), 1);
    }

    #[test]
    fn fast_cadence_never_goes_below_one() {
        assert_eq!(frame_interval(Some(1.0), 10.0), 1);
        assert_eq!(frame_interval(Some(30.0), 2.0), 15);
    }

    #[test]
    fn keeps_multiples_of_interval_in_order() {
        let sampler = FrameSampler::new(frames(250, 30.0), frame_interval(Some(30.0), 0.5));
        let indices: Vec<u64> = sampler.map(|f| f.unwrap().index).collect();
        assert_eq!(indices, vec![0, 60, 120, 180, 240]);
    }

    #[test]
    fn sampling_is_reproducible() {
        let run = || {
            FrameSampler::new(frames(1000, 24.0), frame_interval(Some(24.0), 0.5))
                .map(|f| f.unwrap().index)
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.iter().all(|i| i % 48 == 0));
    }

    #[test]
    fn zero_fps_stream_keeps_every_frame() {
        let interval = frame_interval(Some(0.0), 0.5);
        let stream = (0..5).map(|i| Ok(Frame::new(i, 0.0, RgbImage::new(1, 1))));
        let mut sampler = FrameSampler::new(stream, interval);
        let kept = sampler.by_ref().count();
        assert_eq!(kept, 5);
        assert_eq!(sampler.frames_seen(), 5);
        assert_eq!(sampler.frames_kept(), 5);
    }

    #[test]
    fn decode_errors_pass_through() {
        let stream = vec![
            Ok(Frame::new(0, 0.0, RgbImage::new(1, 1))),
            Ok(Frame::new(1, 0.5, RgbImage::new(1, 1))),
            Err(DecodeError::FfmpegFailed("boom".into())),
        ]
        .into_iter();
        let mut sampler = FrameSampler::new(stream, 4);
        assert!(sampler.next().unwrap().is_ok());
        assert!(matches!(sampler.next(), Some(Err(DecodeError::FfmpegFailed(_)))));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn interval_zero_is_clamped() {
        let sampler = FrameSampler::new(frames(3, 1.0), 0);
        assert_eq!(sampler.interval(), 1);
    }
}
