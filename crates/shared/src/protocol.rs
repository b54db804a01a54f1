use serde::{Deserialize, Serialize};

use crate::domain::ServerStats;

/// One row of the `game_end` payload.
///
/// `new_total_score` is the server's authoritative cumulative total for that
/// player and is only present for players whose account the server updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub username: String,
    pub score: i64,
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_total_score: Option<i64>,
}

/// Messages pushed by the game server over the per-identity socket.
///
/// The wire format is flat JSON tagged by a `type` field, e.g.
/// `{"type":"new_question","question":"2+2?","question_index":1,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    StatsUpdate {
        stats: ServerStats,
    },
    WaitingUpdate {
        player_count: u32,
        max_players: u32,
    },
    NewQuestion {
        question: String,
        question_index: u32,
        total_questions: u32,
        duration: u64,
    },
    AnswerResult {
        correct: bool,
        message: String,
    },
    PlayerFinished {
        message: String,
    },
    GameEnd {
        results: Vec<PlayerResult>,
        winner: String,
    },
    MatchFailed {
        message: String,
    },
}

/// Messages the client sends to the game server, same tagging scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    FindMatch { category: String },
    SubmitAnswer { answer: String },
    CancelSearch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: crate::domain::Identity,
}

/// Failure body the REST API returns alongside a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFailure {
    pub detail: String,
}
