use std::sync::Arc;

use emotion_timeline_common::config::{ChannelOrder, Config};
use emotion_timeline_common::emotion::{EmotionEvent, Label};
use emotion_timeline_common::frame::Frame;
use image::RgbImage;
use tracing::{debug, info};

use crate::classify::{classify, EmotionClassifier};
use crate::decoder::{decode_image, FrameSource};
use crate::error::PipelineError;
use crate::face::{normalize_face, FaceLocator};
use crate::sampler::{frame_interval, FrameSampler};
use crate::timeline::TimelineAggregator;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub samples_per_second: f64,
    pub min_face_size: u32,
    pub channel_order: ChannelOrder,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            samples_per_second: 0.5,
            min_face_size: 100,
            channel_order: ChannelOrder::Bgr,
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            samples_per_second: config.sampling.samples_per_second,
            min_face_size: config.locator.min_face_size,
            channel_order: config.classifier.channel_order,
        }
    }
}

/// Face → emotion processing for still images and videos.
///
/// The locator and classifier are injected and shared; every call keeps its
/// own state, so concurrent calls do not interact.
#[derive(Clone)]
pub struct EmotionPipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    options: PipelineOptions,
}

impl EmotionPipeline {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            locator,
            classifier,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Locate, normalize and classify one image. `Ok(None)` when no face is
    /// found.
    pub fn analyze_frame(&self, image: &RgbImage) -> Result<Option<Label>, PipelineError> {
        let Some(face) = self.locator.locate(image, self.options.min_face_size)? else {
            return Ok(None);
        };
        let Some(tensor) = normalize_face(image, &face, self.options.channel_order) else {
            return Ok(None);
        };
        Ok(Some(classify(self.classifier.as_ref(), &tensor)?))
    }

    /// Single-image path: exactly one label, or `NoFaceDetected`.
    pub fn classify_image(&self, image: &RgbImage) -> Result<Label, PipelineError> {
        let label = self
            .analyze_frame(image)?
            .ok_or(PipelineError::NoFaceDetected)?;
        info!(%label, width = image.width(), height = image.height(), "image classified");
        Ok(label)
    }

    /// Decode an uploaded image payload and classify it.
    pub fn classify_image_bytes(&self, bytes: &[u8]) -> Result<Label, PipelineError> {
        let image = decode_image(bytes)?;
        self.classify_image(&image)
    }

    /// Video path: sample the stream, classify each sampled frame and return
    /// the emotion transitions in order.
    ///
    /// Sampled frames without a face are skipped and leave the running
    /// emotion untouched. A stream where no face is ever found yields an
    /// empty timeline. The stream is read to exhaustion.
    pub fn timeline<S: FrameSource>(&self, source: S) -> Result<Vec<EmotionEvent>, PipelineError> {
        let interval = frame_interval(source.nominal_fps(), self.options.samples_per_second);
        info!(
            fps = ?source.nominal_fps(),
            interval,
            "building emotion timeline"
        );

        let mut sampler = FrameSampler::new(source, interval);
        let mut aggregator = TimelineAggregator::new();
        let mut skipped = 0u64;

        for frame in sampler.by_ref() {
            let frame: Frame = frame?;
            match self.analyze_frame(&frame.image)? {
                Some(label) => {
                    aggregator.observe(frame.timestamp_secs, label);
                }
                None => {
                    skipped += 1;
                    debug!(index = frame.index, ts = frame.timestamp_secs, "no face, sample skipped");
                }
            }
        }

        info!(
            frames = sampler.frames_seen(),
            sampled = sampler.frames_kept(),
            classified = aggregator.observed(),
            skipped,
            events = aggregator.events().len(),
            "emotion timeline complete"
        );
        Ok(aggregator.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::VecSource;
    use crate::error::{DecodeError, InferenceError};
    use crate::face::NormalizedTensor;
    use emotion_timeline_common::emotion::Distribution;
    use emotion_timeline_common::frame::FaceBox;
    use image::Rgb;
    use proptest::prelude::*;

    /// Frames encode their "script" in the top-left pixel: red channel 0
    /// means no face, otherwise green channel is the label index.
    fn scripted_image(label: Option<Label>) -> RgbImage {
        let pixel = match label {
            Some(l) => Rgb([255, l.index() as u8, 0]),
            None => Rgb([0, 0, 0]),
        };
        RgbImage::from_pixel(8, 8, pixel)
    }

    struct ScriptLocator;

    impl FaceLocator for ScriptLocator {
        fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, InferenceError> {
            if image.get_pixel(0, 0).0[0] == 0 {
                Ok(vec![])
            } else {
                Ok(vec![FaceBox::new(0, 0, image.width(), image.height())])
            }
        }
    }

    struct ScriptClassifier;

    impl EmotionClassifier for ScriptClassifier {
        fn predict(&self, tensor: &NormalizedTensor) -> Result<Distribution, InferenceError> {
            // Solid frames stay solid after resize; the green channel (same
            // position in RGB and BGR) carries the label index.
            let index = (tensor.get(0, 0, 1) * 255.0).round() as usize;
            let mut scores = [0.0; 5];
            scores[index] = 1.0;
            Ok(Distribution(scores))
        }
    }

    struct FailingClassifier;

    impl EmotionClassifier for FailingClassifier {
        fn predict(&self, _tensor: &NormalizedTensor) -> Result<Distribution, InferenceError> {
            Err(InferenceError::InvalidResponse("model offline".into()))
        }
    }

    fn pipeline() -> EmotionPipeline {
        EmotionPipeline::new(
            Arc::new(ScriptLocator),
            Arc::new(ScriptClassifier),
            PipelineOptions {
                min_face_size: 0,
                ..PipelineOptions::default()
            },
        )
    }

    /// One frame per script entry, 1 fps nominal with fps=0 so every frame is
    /// sampled and frame i sits at i seconds.
    fn source(script: &[Option<Label>]) -> VecSource {
        let frames = script
            .iter()
            .enumerate()
            .map(|(i, l)| Frame::new(i as u64, i as f64, scripted_image(*l)))
            .collect();
        VecSource::new(frames, Some(0.0))
    }

    #[test]
    fn transitions_use_each_transition_frame_timestamp() {
        use Label::*;
        let script = [
            Some(Happy),
            None,
            Some(Happy),
            Some(Sad),
            None,
            Some(Sad),
            None,
            Some(Sad),
            Some(Neutral),
            None,
        ];
        let events = pipeline().timeline(source(&script)).unwrap();
        assert_eq!(
            events,
            vec![
                EmotionEvent::new(0.0, Happy),
                EmotionEvent::new(3.0, Sad),
                EmotionEvent::new(8.0, Neutral),
            ]
        );
    }

    #[test]
    fn no_faces_anywhere_is_an_empty_timeline() {
        let events = pipeline().timeline(source(&[None; 12])).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn empty_stream_is_an_empty_timeline() {
        let events = pipeline().timeline(VecSource::new(vec![], Some(30.0))).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn zero_fps_samples_every_frame() {
        let script = [Some(Label::Angry), Some(Label::Surprise), Some(Label::Angry)];
        let events = pipeline().timeline(source(&script)).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn only_sampled_frames_are_classified() {
        // 2 fps at 0.5 samples/s keeps indices 0, 4, 8.
        let frames = (0..10)
            .map(|i| {
                let label = if i < 4 { Label::Happy } else { Label::Sad };
                Frame::new(i, i as f64 * 0.5, scripted_image(Some(label)))
            })
            .collect();
        let events = pipeline().timeline(VecSource::new(frames, Some(2.0))).unwrap();
        assert_eq!(
            events,
            vec![
                EmotionEvent::new(0.0, Label::Happy),
                EmotionEvent::new(2.0, Label::Sad),
            ]
        );
    }

    #[test]
    fn decode_error_mid_stream_fails_the_request() {
        let stream = VecSource::from_results(
            vec![
                Ok(Frame::new(0, 0.0, scripted_image(Some(Label::Happy)))),
                Err(DecodeError::TruncatedFrame {
                    index: 1,
                    got: 10,
                    expected: 192,
                }),
            ],
            None,
        );
        assert!(matches!(
            pipeline().timeline(stream),
            Err(PipelineError::Decode(DecodeError::TruncatedFrame { .. }))
        ));
    }

    #[test]
    fn classifier_failure_is_inference_error() {
        let pipeline = EmotionPipeline::new(
            Arc::new(ScriptLocator),
            Arc::new(FailingClassifier),
            PipelineOptions::default(),
        );
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 1, 0]));
        assert!(matches!(
            pipeline.classify_image(&image),
            Err(PipelineError::Inference(_))
        ));
    }

    #[test]
    fn image_without_face_is_no_face_detected() {
        let result = pipeline().classify_image(&scripted_image(None));
        assert!(matches!(result, Err(PipelineError::NoFaceDetected)));
    }

    #[test]
    fn image_with_face_returns_one_label() {
        let label = pipeline().classify_image(&scripted_image(Some(Label::Surprise))).unwrap();
        assert_eq!(label, Label::Surprise);
    }

    #[test]
    fn small_faces_do_not_count_by_default() {
        let pipeline = EmotionPipeline::new(
            Arc::new(ScriptLocator),
            Arc::new(ScriptClassifier),
            PipelineOptions::default(),
        );
        assert!(matches!(
            pipeline.classify_image(&scripted_image(Some(Label::Happy))),
            Err(PipelineError::NoFaceDetected)
        ));
    }

    #[test]
    fn undecodable_bytes_are_decode_errors() {
        assert!(matches!(
            pipeline().classify_image_bytes(b"\x00\x01garbage"),
            Err(PipelineError::Decode(_))
        ));
    }

    fn script_strategy() -> impl Strategy<Value = Vec<Option<Label>>> {
        prop::collection::vec(
            prop::option::of((0..Label::ALL.len()).prop_map(|i| Label::ALL[i])),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn faceless_frames_never_change_the_timeline(
            script in script_strategy(),
            inserts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            // Re-time the faced frames identically in both runs so only the
            // faceless insertions differ.
            let faced: Vec<Label> = script.iter().flatten().copied().collect();
            let build = |with_gaps: &[usize]| {
                let mut frames = Vec::new();
                let mut index = 0u64;
                for (pos, label) in faced.iter().enumerate() {
                    for _ in with_gaps.iter().filter(|g| **g == pos) {
                        frames.push(Frame::new(index, pos as f64, scripted_image(None)));
                        index += 1;
                    }
                    frames.push(Frame::new(index, pos as f64, scripted_image(Some(*label))));
                    index += 1;
                }
                VecSource::new(frames, None)
            };
            let gaps: Vec<usize> = inserts
                .iter()
                .map(|i| i.index(faced.len().max(1)))
                .collect();

            let plain = pipeline().timeline(build(&[])).unwrap();
            let gapped = pipeline().timeline(build(&gaps)).unwrap();
            prop_assert_eq!(plain, gapped);
        }
    }
}
