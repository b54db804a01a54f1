//! Session state machine. Pure: consumes one [`SessionInput`] at a time and
//! returns the side effects for the driver to execute. Inbound server
//! events, user actions, timer ticks and scheduled expirations all arrive
//! through the same queue, so every handler runs to completion before the
//! next input is looked at and no two of them ever race.

use std::time::Duration;

use shared::{
    domain::{Identity, ServerStats},
    protocol::{ClientCommand, PlayerResult, ServerEvent},
};
use tracing::debug;

use crate::{connection::ConnectionStatus, results};

/// How long the server's verdict on an answer stays visible.
pub const OUTCOME_DISPLAY_WINDOW: Duration = Duration::from_millis(1500);
/// How long a match-failure notice stays visible.
pub const NOTICE_DISPLAY_WINDOW: Duration = Duration::from_secs(3);

/// The single discrete state of the session. Exactly one value is active at
/// any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoggedOut,
    Menu,
    SelectingCategory,
    Waiting,
    Playing,
    Finished,
}

/// Pre-match lobby occupancy. Valid only while the phase is Waiting and
/// replaced wholesale on every lobby update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyState {
    pub player_count: u32,
    pub max_players: u32,
}

pub type RoundSerial = u64;

/// One timed question. Superseded, never merged, by the next question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub serial: RoundSerial,
    pub question: String,
    pub index: u32,
    pub total: u32,
    pub duration_secs: u64,
    pub remaining_secs: u64,
}

/// The server's verdict on a submitted answer, shown for a fixed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub message: String,
}

/// Final scores of a completed match. Valid only while the phase is
/// Finished.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub results: Vec<PlayerResult>,
    pub winner: String,
}

/// User-initiated transitions, fed through the same queue as server events.
#[derive(Debug, Clone)]
pub enum UserAction {
    /// Menu → category selection.
    FindMatch,
    /// Sends the matchmaking request for a category.
    RequestMatch { category: String },
    CancelSearch,
    SubmitAnswer { answer: String },
    PlayAgain,
    BackToMenu,
    Logout,
}

/// Everything the session can react to, serialized onto one queue.
#[derive(Debug)]
pub enum SessionInput {
    Server(ServerEvent),
    Action(UserAction),
    Tick { round: RoundSerial },
    OutcomeExpired { serial: u64 },
    NoticeExpired { serial: u64 },
}

/// Side effects requested by the state machine; executed by the driver in
/// order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientCommand),
    StartRoundTimer { round: RoundSerial },
    CancelRoundTimer,
    ScheduleOutcomeClear { serial: u64 },
    ScheduleNoticeClear { serial: u64 },
    PublishStats(ServerStats),
    RefreshLeaderboard,
    CloseConnection,
    Emit(SessionEvent),
}

/// What the presentation layer observes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(Phase),
    ConnectionChanged(ConnectionStatus),
    LobbyUpdated(LobbyState),
    RoundStarted(Round),
    TimerTick { remaining_secs: u64 },
    OutcomeReceived(AnswerOutcome),
    OutcomeCleared,
    Notice(String),
    NoticeCleared,
    ScoreUpdated(i64),
    MatchFinished(MatchResult),
    StatsUpdated(ServerStats),
}

#[derive(Debug)]
pub struct SessionState {
    identity: Identity,
    phase: Phase,
    lobby: Option<LobbyState>,
    round: Option<Round>,
    /// The answer text already sent for the current round, if any. Doubles
    /// as the at-most-one-submission-per-round guard for both the manual
    /// path and the timer expiry path.
    pending_answer: Option<String>,
    outcome: Option<AnswerOutcome>,
    outcome_serial: u64,
    notice: Option<String>,
    notice_serial: u64,
    match_result: Option<MatchResult>,
    round_serial: RoundSerial,
}

impl SessionState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            phase: Phase::LoggedOut,
            lobby: None,
            round: None,
            pending_answer: None,
            outcome: None,
            outcome_serial: 0,
            notice: None,
            notice_serial: 0,
            match_result: None,
            round_serial: 0,
        }
    }

    /// Called once when the session is created, right after authentication.
    pub fn on_authenticated(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.set_phase(Phase::Menu, &mut effects);
        effects
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn lobby(&self) -> Option<&LobbyState> {
        self.lobby.as_ref()
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn outcome(&self) -> Option<&AnswerOutcome> {
        self.outcome.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        self.match_result.as_ref()
    }

    pub fn handle(&mut self, input: SessionInput) -> Vec<Effect> {
        match input {
            SessionInput::Server(event) => self.handle_server_event(event),
            SessionInput::Action(action) => self.handle_action(action),
            SessionInput::Tick { round } => self.handle_tick(round),
            SessionInput::OutcomeExpired { serial } => self.handle_outcome_expired(serial),
            SessionInput::NoticeExpired { serial } => self.handle_notice_expired(serial),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            ServerEvent::StatsUpdate { stats } => {
                effects.push(Effect::PublishStats(stats));
                effects.push(Effect::Emit(SessionEvent::StatsUpdated(stats)));
            }
            ServerEvent::WaitingUpdate {
                player_count,
                max_players,
            } => {
                self.set_phase(Phase::Waiting, &mut effects);
                let lobby = LobbyState {
                    player_count,
                    max_players,
                };
                self.lobby = Some(lobby);
                effects.push(Effect::Emit(SessionEvent::LobbyUpdated(lobby)));
            }
            ServerEvent::NewQuestion {
                question,
                question_index,
                total_questions,
                duration,
            } => {
                if self.phase != Phase::Waiting && self.phase != Phase::Playing {
                    debug!(phase = ?self.phase, "dropping new_question outside a match");
                    return effects;
                }
                self.set_phase(Phase::Playing, &mut effects);
                self.round_serial += 1;
                let round = Round {
                    serial: self.round_serial,
                    question,
                    index: question_index,
                    total: total_questions,
                    duration_secs: duration,
                    remaining_secs: duration,
                };
                self.round = Some(round.clone());
                self.pending_answer = None;
                if self.outcome.take().is_some() {
                    effects.push(Effect::Emit(SessionEvent::OutcomeCleared));
                }
                // Invalidate any clear still scheduled for the previous
                // round's outcome.
                self.outcome_serial += 1;
                effects.push(Effect::Emit(SessionEvent::RoundStarted(round)));
                effects.push(Effect::StartRoundTimer {
                    round: self.round_serial,
                });
            }
            ServerEvent::AnswerResult { correct, message } => {
                if self.phase != Phase::Playing {
                    debug!(phase = ?self.phase, "dropping answer_result outside Playing");
                    return effects;
                }
                let outcome = AnswerOutcome { correct, message };
                self.outcome = Some(outcome.clone());
                self.outcome_serial += 1;
                effects.push(Effect::Emit(SessionEvent::OutcomeReceived(outcome)));
                effects.push(Effect::ScheduleOutcomeClear {
                    serial: self.outcome_serial,
                });
            }
            ServerEvent::PlayerFinished { message } => {
                if self.phase != Phase::Playing {
                    debug!(phase = ?self.phase, "dropping player_finished outside Playing");
                    return effects;
                }
                self.set_phase(Phase::Waiting, &mut effects);
                self.set_notice(message, &mut effects);
            }
            ServerEvent::GameEnd { results, winner } => {
                if self.phase != Phase::Playing && self.phase != Phase::Waiting {
                    debug!(phase = ?self.phase, "dropping game_end outside a match");
                    return effects;
                }
                self.clear_notice(&mut effects);
                self.set_phase(Phase::Finished, &mut effects);
                if let Some(total) = results::reconcile_score(&mut self.identity, &results) {
                    effects.push(Effect::Emit(SessionEvent::ScoreUpdated(total)));
                }
                let result = MatchResult { results, winner };
                self.match_result = Some(result.clone());
                effects.push(Effect::Emit(SessionEvent::MatchFinished(result)));
                effects.push(Effect::RefreshLeaderboard);
            }
            ServerEvent::MatchFailed { message } => {
                if self.phase != Phase::Waiting && self.phase != Phase::Playing {
                    debug!(phase = ?self.phase, "dropping match_failed outside matchmaking");
                    return effects;
                }
                self.set_phase(Phase::SelectingCategory, &mut effects);
                self.set_notice(message, &mut effects);
                effects.push(Effect::ScheduleNoticeClear {
                    serial: self.notice_serial,
                });
            }
        }
        effects
    }

    fn handle_action(&mut self, action: UserAction) -> Vec<Effect> {
        let mut effects = Vec::new();
        match action {
            UserAction::FindMatch => {
                if self.phase != Phase::Menu {
                    debug!(phase = ?self.phase, "find_match ignored outside Menu");
                    return effects;
                }
                self.set_phase(Phase::SelectingCategory, &mut effects);
            }
            UserAction::RequestMatch { category } => {
                if self.phase != Phase::SelectingCategory {
                    debug!(phase = ?self.phase, "request_match ignored outside category selection");
                    return effects;
                }
                self.match_result = None;
                effects.push(Effect::Send(ClientCommand::FindMatch { category }));
            }
            UserAction::CancelSearch => {
                if self.phase != Phase::Waiting {
                    debug!(phase = ?self.phase, "cancel_search ignored outside Waiting");
                    return effects;
                }
                effects.push(Effect::Send(ClientCommand::CancelSearch));
                self.clear_notice(&mut effects);
                self.set_phase(Phase::SelectingCategory, &mut effects);
            }
            UserAction::SubmitAnswer { answer } => {
                let answer = answer.trim().to_string();
                if !self.may_submit() || answer.is_empty() {
                    debug!(phase = ?self.phase, "submit_answer ignored");
                    return effects;
                }
                self.pending_answer = Some(answer.clone());
                effects.push(Effect::Send(ClientCommand::SubmitAnswer { answer }));
            }
            UserAction::PlayAgain => {
                if self.phase != Phase::Finished {
                    debug!(phase = ?self.phase, "play_again ignored outside Finished");
                    return effects;
                }
                self.clear_notice(&mut effects);
                self.set_phase(Phase::SelectingCategory, &mut effects);
            }
            UserAction::BackToMenu => {
                if self.phase != Phase::Finished && self.phase != Phase::SelectingCategory {
                    debug!(phase = ?self.phase, "back_to_menu ignored");
                    return effects;
                }
                self.clear_notice(&mut effects);
                self.set_phase(Phase::Menu, &mut effects);
            }
            UserAction::Logout => {
                self.set_phase(Phase::LoggedOut, &mut effects);
                effects.push(Effect::CloseConnection);
            }
        }
        effects
    }

    fn handle_tick(&mut self, round: RoundSerial) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase != Phase::Playing {
            return effects;
        }
        let Some(current) = self.round.as_mut() else {
            return effects;
        };
        if current.serial != round {
            debug!(stale = round, current = current.serial, "dropping stale timer tick");
            return effects;
        }
        if current.remaining_secs == 0 {
            return effects;
        }
        current.remaining_secs -= 1;
        let remaining = current.remaining_secs;
        effects.push(Effect::Emit(SessionEvent::TimerTick {
            remaining_secs: remaining,
        }));
        if remaining == 0 && self.outcome.is_none() && self.pending_answer.is_none() {
            // Time is up with nothing submitted: exactly one empty answer.
            self.pending_answer = Some(String::new());
            effects.push(Effect::Send(ClientCommand::SubmitAnswer {
                answer: String::new(),
            }));
        }
        effects
    }

    fn handle_outcome_expired(&mut self, serial: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if serial == self.outcome_serial && self.outcome.take().is_some() {
            effects.push(Effect::Emit(SessionEvent::OutcomeCleared));
        }
        effects
    }

    fn handle_notice_expired(&mut self, serial: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if serial == self.notice_serial && self.notice.take().is_some() {
            effects.push(Effect::Emit(SessionEvent::NoticeCleared));
        }
        effects
    }

    fn may_submit(&self) -> bool {
        self.phase == Phase::Playing
            && self.outcome.is_none()
            && self.pending_answer.is_none()
            && self.round.as_ref().is_some_and(|r| r.remaining_secs > 0)
    }

    /// Central phase switch. Enforces the phase-scoped lifetimes: the round
    /// timer never survives an exit from Playing, the lobby never survives
    /// an exit from Waiting, the match result never survives an exit from
    /// Finished.
    fn set_phase(&mut self, to: Phase, effects: &mut Vec<Effect>) {
        if self.phase == to {
            return;
        }
        if self.phase == Phase::Playing {
            effects.push(Effect::CancelRoundTimer);
            self.round = None;
            self.pending_answer = None;
        }
        if self.phase == Phase::Waiting {
            self.lobby = None;
        }
        if self.phase == Phase::Finished {
            self.match_result = None;
        }
        self.phase = to;
        effects.push(Effect::Emit(SessionEvent::PhaseChanged(to)));
    }

    fn set_notice(&mut self, message: String, effects: &mut Vec<Effect>) {
        self.notice_serial += 1;
        self.notice = Some(message.clone());
        effects.push(Effect::Emit(SessionEvent::Notice(message)));
    }

    fn clear_notice(&mut self, effects: &mut Vec<Effect>) {
        self.notice_serial += 1;
        if self.notice.take().is_some() {
            effects.push(Effect::Emit(SessionEvent::NoticeCleared));
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
