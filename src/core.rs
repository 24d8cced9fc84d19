pub mod leaderboard;
pub mod stats;
pub mod templates;
