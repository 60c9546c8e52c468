// Public API
pub use aggregator::{ExitOutcome, LeaderboardSubscriber, ResultAggregator, ResultInput, SubmitOutcome};
pub use ranking::{compare_results, still_playing, Leaderboard, RankedEntry};

// Internal modules
mod aggregator;
mod ranking;
