use emotion_timeline_common::emotion::{EmotionEvent, Label};
use tracing::{debug, info};

/// Where the aggregator is between two classified samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineState {
    /// No sample has been classified yet.
    NoEmotionYet,
    /// The last classified sample carried this label.
    Tracking(Label),
}

/// Folds a stream of per-sample labels into transition events.
///
/// One aggregator belongs to one video request. Only classified samples are
/// fed in; samples without a face never reach it, so they cannot end a run.
/// The output is a run-length encoding of the label stream: each event marks
/// the first sample of a run and adjacent events always differ.
#[derive(Debug)]
pub struct TimelineAggregator {
    state: TimelineState,
    events: Vec<EmotionEvent>,
    observed: u64,
}

impl Default for TimelineAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineAggregator {
    pub fn new() -> Self {
        Self {
            state: TimelineState::NoEmotionYet,
            events: Vec::new(),
            observed: 0,
        }
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    pub fn events(&self) -> &[EmotionEvent] {
        &self.events
    }

    /// Number of classified samples fed in so far.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Feed one classified sample. Returns the event if this sample starts a
    /// new run.
    pub fn observe(&mut self, timestamp_secs: f64, label: Label) -> Option<EmotionEvent> {
        self.observed += 1;
        match self.state {
            TimelineState::Tracking(current) if current == label => None,
            previous => {
                let event = EmotionEvent::new(timestamp_secs, label);
                match previous {
                    TimelineState::NoEmotionYet => {
                        info!(ts = event.timestamp_secs, %label, "first emotion");
                    }
                    TimelineState::Tracking(from) => {
                        debug!(ts = event.timestamp_secs, %from, to = %label, "emotion changed");
                    }
                }
                self.state = TimelineState::Tracking(label);
                self.events.push(event);
                Some(event)
            }
        }
    }

    /// End of stream. The events are returned as they are; no closing event
    /// is synthesized.
    pub fn finish(self) -> Vec<EmotionEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn label_strategy() -> impl Strategy<Value = Label> {
        (0..Label::ALL.len()).prop_map(|i| Label::ALL[i])
    }

    #[test]
    fn starts_with_no_emotion() {
        let agg = TimelineAggregator::new();
        assert_eq!(agg.state(), TimelineState::NoEmotionYet);
        assert!(agg.finish().is_empty());
    }

    #[test]
    fn first_label_always_emits() {
        let mut agg = TimelineAggregator::new();
        let event = agg.observe(4.26, Label::Neutral).unwrap();
        assert_eq!(event, EmotionEvent::new(4.3, Label::Neutral));
        assert_eq!(agg.state(), TimelineState::Tracking(Label::Neutral));
    }

    #[test]
    fn repeats_are_collapsed() {
        let mut agg = TimelineAggregator::new();
        let labels = [
            Label::Happy,
            Label::Happy,
            Label::Sad,
            Label::Sad,
            Label::Sad,
            Label::Neutral,
        ];
        for (i, label) in labels.into_iter().enumerate() {
            agg.observe(i as f64 * 2.0, label);
        }
        assert_eq!(agg.observed(), 6);
        assert_eq!(
            agg.finish(),
            vec![
                EmotionEvent::new(0.0, Label::Happy),
                EmotionEvent::new(4.0, Label::Sad),
                EmotionEvent::new(10.0, Label::Neutral),
            ]
        );
    }

    #[test]
    fn returning_to_earlier_label_is_a_transition() {
        let mut agg = TimelineAggregator::new();
        assert!(agg.observe(0.0, Label::Angry).is_some());
        assert!(agg.observe(2.0, Label::Happy).is_some());
        assert!(agg.observe(4.0, Label::Angry).is_some());
        assert_eq!(agg.events().len(), 3);
    }

    proptest! {
        #[test]
        fn adjacent_events_never_share_a_label(labels in prop::collection::vec(label_strategy(), 0..200)) {
            let mut agg = TimelineAggregator::new();
            for (i, label) in labels.iter().enumerate() {
                agg.observe(i as f64 * 0.5, *label);
            }
            let events = agg.finish();
            for pair in events.windows(2) {
                prop_assert_ne!(pair[0].emotion, pair[1].emotion);
            }
            // Expanding the runs back gives the input sequence.
            let mut dedup = labels.clone();
            dedup.dedup();
            let emitted: Vec<Label> = events.iter().map(|e| e.emotion).collect();
            prop_assert_eq!(emitted, dedup);
        }
    }
}
