// src/models/leaderboard.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked row of a test's leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    /// Percentage score.
    pub score: u32,
    pub correct_count: u32,
    pub time_taken_seconds: i64,
    pub submitted_at: DateTime<Utc>,
    /// 1-based, unique within a board.
    pub rank: u32,
}

/// The leaderboard as one viewer is allowed to see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub test_id: String,
    /// False while the release gate still hides the board from this viewer.
    pub released: bool,
    pub entries: Vec<LeaderboardEntry>,
    /// The viewer's own row, always present once they have submitted.
    pub own: Option<LeaderboardEntry>,
}
