pub mod state;

pub use state::{TimelineAggregator, TimelineState};
