pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod durations;
pub mod key;
pub mod profiles;
pub mod scorer;
pub mod segments;
pub mod trellis;

pub use aggregator::{AggregatedResult, KeyFinderAggregator, ProfileVote};
pub use durations::{DurationError, Durations};
pub use key::{Key, Mode};
pub use profiles::{KeyProfile, ProfileError, ProfileRegistry};
pub use trellis::{FinderError, FinderSettings, TrellisKeyFinder};

/// Application name for XDG paths
pub const APP_NAME: &str = "keytrellis";
