use serde::{Deserialize, Serialize};

/// The authenticated user and their persisted cumulative score.
///
/// Created by a successful login or signup; the score is only ever
/// overwritten with the server's authoritative total at the end of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub score: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub active_games: u64,
    #[serde(default)]
    pub connected_players: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    #[serde(default)]
    pub score: i64,
}
