//! Client core for the real-time multiplayer quiz. Owns the persistent game
//! connection, the session state machine driving a match from lobby to final
//! scores, the per-round countdown, and the read-only leaderboard cache.
//!
//! Everything the session reacts to — server pushes, user actions, timer
//! ticks, scheduled clears — is serialized onto a single input queue and
//! handled to completion one input at a time. The presentation layer talks
//! to a [`QuizSession`] handle and observes [`SessionEvent`]s over a
//! broadcast channel.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

pub mod api;
pub mod connection;
pub mod error;
pub mod results;
pub mod scoreboard;
pub mod session;
mod timer;

pub use api::ApiClient;
pub use connection::{Connection, ConnectionStatus};
pub use error::ClientError;
pub use scoreboard::{Scoreboard, ScoreboardRefresher};
pub use session::{
    AnswerOutcome, Effect, LobbyState, MatchResult, Phase, Round, SessionEvent, SessionInput,
    SessionState, UserAction, NOTICE_DISPLAY_WINDOW, OUTCOME_DISPLAY_WINDOW,
};

use shared::domain::Identity;
use timer::RoundTimer;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A live game session: one connection, one state machine, one identity.
/// Created after authentication, torn down on logout or fatal connection
/// error.
pub struct QuizSession {
    input_tx: mpsc::UnboundedSender<SessionInput>,
    events: broadcast::Sender<SessionEvent>,
    scoreboard: Arc<Scoreboard>,
    status_rx: watch::Receiver<ConnectionStatus>,
    driver_task: JoinHandle<()>,
}

impl QuizSession {
    /// Opens the game connection for an authenticated identity and starts
    /// the session driver.
    pub async fn connect(server_url: &str, identity: Identity) -> Result<Arc<Self>, ClientError> {
        let scoreboard = Scoreboard::new(ApiClient::new(server_url)?);
        let refresher: Arc<dyn ScoreboardRefresher> = scoreboard.clone();
        Self::connect_with_dependencies(server_url, identity, scoreboard, refresher).await
    }

    pub async fn connect_with_dependencies(
        server_url: &str,
        identity: Identity,
        scoreboard: Arc<Scoreboard>,
        refresher: Arc<dyn ScoreboardRefresher>,
    ) -> Result<Arc<Self>, ClientError> {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let conn = Connection::open(server_url, &identity.username, input_tx.clone()).await?;
        let status_rx = conn.status_watch();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        // Initial view load; failures are logged and swallowed.
        {
            let scoreboard = Arc::clone(&scoreboard);
            tokio::spawn(async move {
                scoreboard.refresh_leaderboard().await;
                scoreboard.refresh_stats().await;
            });
        }

        let driver_task = tokio::spawn(drive(
            SessionState::new(identity),
            input_rx,
            input_tx.clone(),
            conn,
            events.clone(),
            Arc::clone(&scoreboard),
            refresher,
        ));

        Ok(Arc::new(Self {
            input_tx,
            events,
            scoreboard,
            status_rx,
            driver_task,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn scoreboard(&self) -> Arc<Scoreboard> {
        Arc::clone(&self.scoreboard)
    }

    pub fn find_match(&self) {
        self.dispatch(UserAction::FindMatch);
    }

    pub fn request_match(&self, category: impl Into<String>) {
        self.dispatch(UserAction::RequestMatch {
            category: category.into(),
        });
    }

    pub fn cancel_search(&self) {
        self.dispatch(UserAction::CancelSearch);
    }

    pub fn submit_answer(&self, answer: impl Into<String>) {
        self.dispatch(UserAction::SubmitAnswer {
            answer: answer.into(),
        });
    }

    pub fn play_again(&self) {
        self.dispatch(UserAction::PlayAgain);
    }

    pub fn back_to_menu(&self) {
        self.dispatch(UserAction::BackToMenu);
    }

    pub fn logout(&self) {
        self.dispatch(UserAction::Logout);
    }

    fn dispatch(&self, action: UserAction) {
        if self
            .input_tx
            .send(SessionInput::Action(action))
            .is_err()
        {
            warn!("session driver is gone; user action dropped");
        }
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        self.driver_task.abort();
    }
}

/// The session driver: the single logical thread of control. Dequeues one
/// input at a time, runs it through the state machine, and executes the
/// returned effects before looking at the next input.
async fn drive(
    mut state: SessionState,
    mut input_rx: mpsc::UnboundedReceiver<SessionInput>,
    input_tx: mpsc::UnboundedSender<SessionInput>,
    conn: Connection,
    events: broadcast::Sender<SessionEvent>,
    scoreboard: Arc<Scoreboard>,
    refresher: Arc<dyn ScoreboardRefresher>,
) {
    let mut timer: Option<RoundTimer> = None;
    let mut status_rx = conn.status_watch();

    let startup = state.on_authenticated();
    run_effects(
        startup, &mut timer, &conn, &input_tx, &events, &scoreboard, &refresher,
    )
    .await;

    loop {
        tokio::select! {
            maybe_input = input_rx.recv() => {
                let Some(input) = maybe_input else { break };
                let effects = state.handle(input);
                let keep_going = run_effects(
                    effects, &mut timer, &conn, &input_tx, &events, &scoreboard, &refresher,
                )
                .await;
                if !keep_going {
                    break;
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                let _ = events.send(SessionEvent::ConnectionChanged(status));
                // Terminal by design: the machine stays in its last phase
                // and recovery requires a fresh authentication.
            }
        }
    }
    debug!("session driver stopped");
}

/// Executes effects in order. Returns `false` when the session is over.
async fn run_effects(
    effects: Vec<Effect>,
    timer: &mut Option<RoundTimer>,
    conn: &Connection,
    input_tx: &mpsc::UnboundedSender<SessionInput>,
    events: &broadcast::Sender<SessionEvent>,
    scoreboard: &Arc<Scoreboard>,
    refresher: &Arc<dyn ScoreboardRefresher>,
) -> bool {
    for effect in effects {
        match effect {
            Effect::Send(command) => conn.send(command),
            Effect::StartRoundTimer { round } => {
                // Dropping the previous handle aborts its task; timers are
                // replaced, never stacked.
                *timer = Some(RoundTimer::start(input_tx.clone(), round));
            }
            Effect::CancelRoundTimer => {
                *timer = None;
            }
            Effect::ScheduleOutcomeClear { serial } => {
                schedule_expiry(input_tx.clone(), OUTCOME_DISPLAY_WINDOW, move || {
                    SessionInput::OutcomeExpired { serial }
                });
            }
            Effect::ScheduleNoticeClear { serial } => {
                schedule_expiry(input_tx.clone(), NOTICE_DISPLAY_WINDOW, move || {
                    SessionInput::NoticeExpired { serial }
                });
            }
            Effect::PublishStats(stats) => scoreboard.apply_stats_push(stats).await,
            Effect::RefreshLeaderboard => {
                let refresher = Arc::clone(refresher);
                tokio::spawn(async move { refresher.refresh().await });
            }
            Effect::CloseConnection => {
                conn.close();
                let _ = events.send(SessionEvent::ConnectionChanged(
                    ConnectionStatus::Disconnected,
                ));
                return false;
            }
            Effect::Emit(event) => {
                let _ = events.send(event);
            }
        }
    }
    true
}

/// Delay-then-enqueue for the outcome/notice display windows. The serial
/// baked into the input invalidates the callback if it has been superseded
/// by the time it fires.
fn schedule_expiry(
    input_tx: mpsc::UnboundedSender<SessionInput>,
    after: Duration,
    make_input: impl FnOnce() -> SessionInput + Send + 'static,
) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = input_tx.send(make_input());
    });
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod lib_tests;
