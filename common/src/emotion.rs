use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of emotion categories the classifier scores.
pub const NUM_LABELS: usize = 5;

/// Emotion category. The declaration order is the classifier's output order
/// and also the tie-break order for [`Distribution::argmax`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Angry,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Label {
    pub const ALL: [Label; NUM_LABELS] = [
        Label::Angry,
        Label::Happy,
        Label::Neutral,
        Label::Sad,
        Label::Surprise,
    ];

    pub fn from_index(index: usize) -> Option<Label> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Angry => "angry",
            Label::Happy => "happy",
            Label::Neutral => "neutral",
            Label::Sad => "sad",
            Label::Surprise => "surprise",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown emotion label: {0}")]
pub struct UnknownLabel(pub String);

/// Classifier scores, one per [`Label`] in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution(pub [f32; NUM_LABELS]);

impl Distribution {
    /// Build from a model output row. `None` if the row has the wrong length.
    pub fn from_slice(scores: &[f32]) -> Option<Self> {
        let scores: [f32; NUM_LABELS] = scores.try_into().ok()?;
        Some(Self(scores))
    }

    pub fn score(&self, label: Label) -> f32 {
        self.0[label.index()]
    }

    /// The highest-scoring label. NaN scores are ignored and equal maxima go
    /// to the lower index. `None` only if every score is NaN.
    pub fn argmax(&self) -> Option<Label> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.0.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if p <= top => {}
                _ => best = Some((i, p)),
            }
        }
        best.and_then(|(i, _)| Label::from_index(i))
    }
}

/// A transition in the dominant emotion of a video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionEvent {
    /// Seconds from the start of the video, rounded to 0.1 s.
    #[serde(rename = "timestamp")]
    pub timestamp_secs: f64,
    pub emotion: Label,
}

impl EmotionEvent {
    pub fn new(timestamp_secs: f64, emotion: Label) -> Self {
        Self {
            timestamp_secs: round_to_tenth(timestamp_secs),
            emotion,
        }
    }
}

/// Round seconds to one decimal place (half away from zero).
pub fn round_to_tenth(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}

/// The label carried by the most events. Equal counts go to the label whose
/// first event is earliest. `None` for an empty timeline.
pub fn dominant_emotion(events: &[EmotionEvent]) -> Option<Label> {
    let mut counts = [0usize; NUM_LABELS];
    let mut first_seen = [usize::MAX; NUM_LABELS];
    for (pos, event) in events.iter().enumerate() {
        let i = event.emotion.index();
        counts[i] += 1;
        first_seen[i] = first_seen[i].min(pos);
    }
    Label::ALL
        .into_iter()
        .filter(|l| counts[l.index()] > 0)
        .min_by_key(|l| (std::cmp::Reverse(counts[l.index()]), first_seen[l.index()]))
}
