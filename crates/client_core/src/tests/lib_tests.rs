use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use shared::{
    domain::Identity,
    protocol::{PlayerResult, ServerEvent},
};
use tokio::{net::TcpListener, sync::Mutex, time::timeout};

const EVENT_WAIT: Duration = Duration::from_secs(5);

struct GameServerState {
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    sent_tx: mpsc::UnboundedSender<String>,
}

async fn handle_ws(
    Path(_username): Path<String>,
    State(state): State<Arc<GameServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| game_socket(socket, state))
}

async fn game_socket(mut socket: WebSocket, state: Arc<GameServerState>) {
    let mut push_rx = state
        .push_rx
        .lock()
        .await
        .take()
        .expect("one connection per test harness");
    loop {
        tokio::select! {
            maybe_push = push_rx.recv() => match maybe_push {
                Some(frame) => {
                    if socket.send(WsMessage::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            maybe_frame = socket.recv() => match maybe_frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = state.sent_tx.send(text);
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                _ => {}
            }
        }
    }
}

struct Harness {
    url: String,
    push_tx: mpsc::UnboundedSender<String>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    async fn spawn() -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let state = Arc::new(GameServerState {
            push_rx: Mutex::new(Some(push_rx)),
            sent_tx,
        });
        let app = Router::new()
            .route("/ws/:username", get(handle_ws))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: format!("http://{addr}"),
            push_tx,
            sent_rx,
        }
    }

    fn push(&self, event: &ServerEvent) {
        self.push_raw(serde_json::to_string(event).expect("encode event"));
    }

    fn push_raw(&self, frame: impl Into<String>) {
        self.push_tx.send(frame.into()).expect("socket task alive");
    }

    async fn next_sent(&mut self) -> serde_json::Value {
        let text = timeout(EVENT_WAIT, self.sent_rx.recv())
            .await
            .expect("client frame within deadline")
            .expect("socket open");
        serde_json::from_str(&text).expect("client sends json")
    }

    async fn expect_no_frame(&mut self, window: Duration) {
        if let Ok(Some(text)) = timeout(window, self.sent_rx.recv()).await {
            panic!("unexpected client frame: {text}");
        }
    }
}

fn tester() -> Identity {
    Identity {
        username: "tester".to_string(),
        score: 380,
    }
}

async fn connect(harness: &Harness) -> (Arc<QuizSession>, broadcast::Receiver<SessionEvent>) {
    let session = QuizSession::connect(&harness.url, tester())
        .await
        .expect("connect");
    let events = session.subscribe_events();
    (session, events)
}

async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    want: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(EVENT_WAIT, async {
        loop {
            let event = rx.recv().await.expect("event stream open");
            if want(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected session event within deadline")
}

fn waiting_update(player_count: u32) -> ServerEvent {
    ServerEvent::WaitingUpdate {
        player_count,
        max_players: 8,
    }
}

fn question(duration: u64) -> ServerEvent {
    ServerEvent::NewQuestion {
        question: "2+2?".to_string(),
        question_index: 1,
        total_questions: 5,
        duration,
    }
}

struct CountingRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl ScoreboardRefresher for CountingRefresher {
    async fn refresh(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn lobby_and_round_flow_over_the_wire() {
    let mut harness = Harness::spawn().await;
    let (session, mut events) = connect(&harness).await;

    harness.push(&waiting_update(1));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Waiting)
    })
    .await;
    let lobby = wait_for(&mut events, |e| matches!(e, SessionEvent::LobbyUpdated(_))).await;
    assert_eq!(
        lobby,
        SessionEvent::LobbyUpdated(LobbyState {
            player_count: 1,
            max_players: 8
        })
    );

    harness.push(&question(30));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Playing)
    })
    .await;
    let started = wait_for(&mut events, |e| matches!(e, SessionEvent::RoundStarted(_))).await;
    let SessionEvent::RoundStarted(round) = started else {
        unreachable!();
    };
    assert_eq!(round.remaining_secs, 30);

    session.submit_answer("  4  ");
    let frame = harness.next_sent().await;
    assert_eq!(frame["type"], "submit_answer");
    assert_eq!(frame["answer"], "4");

    harness.push(&ServerEvent::AnswerResult {
        correct: true,
        message: "Correct!".to_string(),
    });
    let outcome = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::OutcomeReceived(_))
    })
    .await;
    assert_eq!(
        outcome,
        SessionEvent::OutcomeReceived(AnswerOutcome {
            correct: true,
            message: "Correct!".to_string()
        })
    );

    // Cleared again after the fixed display window.
    wait_for(&mut events, |e| *e == SessionEvent::OutcomeCleared).await;
}

#[tokio::test]
async fn find_match_and_cancel_round_trip() {
    let mut harness = Harness::spawn().await;
    let (session, mut events) = connect(&harness).await;

    session.find_match();
    session.request_match("math");
    let frame = harness.next_sent().await;
    assert_eq!(frame["type"], "find_match");
    assert_eq!(frame["category"], "math");

    harness.push(&waiting_update(1));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Waiting)
    })
    .await;

    session.cancel_search();
    let frame = harness.next_sent().await;
    assert_eq!(frame["type"], "cancel_search");
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::SelectingCategory)
    })
    .await;
}

#[tokio::test]
async fn expiry_auto_submits_an_empty_answer_exactly_once() {
    let mut harness = Harness::spawn().await;
    let (_session, mut events) = connect(&harness).await;

    harness.push(&waiting_update(2));
    harness.push(&question(1));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Playing)
    })
    .await;

    let frame = harness.next_sent().await;
    assert_eq!(frame["type"], "submit_answer");
    assert_eq!(frame["answer"], "");

    // The timer keeps ticking; no second submission may follow.
    harness.expect_no_frame(Duration::from_millis(2500)).await;
}

#[tokio::test]
async fn malformed_payloads_are_dropped_without_killing_the_session() {
    let mut harness = Harness::spawn().await;
    let (_session, mut events) = connect(&harness).await;

    harness.push_raw("this is not json");
    harness.push_raw(r#"{"type":"new_question"}"#);
    harness.push_raw(r#"{"type":"unknown_kind","x":1}"#);

    harness.push(&waiting_update(3));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Waiting)
    })
    .await;
    assert!(harness.sent_rx.try_recv().is_err());
}

#[tokio::test]
async fn match_failure_notice_clears_after_its_window() {
    let mut harness = Harness::spawn().await;
    let (_session, mut events) = connect(&harness).await;

    harness.push(&waiting_update(1));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Waiting)
    })
    .await;

    harness.push(&ServerEvent::MatchFailed {
        message: "opponent disconnected".to_string(),
    });
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::SelectingCategory)
    })
    .await;
    let notice = wait_for(&mut events, |e| matches!(e, SessionEvent::Notice(_))).await;
    assert_eq!(
        notice,
        SessionEvent::Notice("opponent disconnected".to_string())
    );
    wait_for(&mut events, |e| *e == SessionEvent::NoticeCleared).await;
}

#[tokio::test]
async fn game_end_reconciles_score_and_triggers_one_refresh() {
    let harness = Harness::spawn().await;
    let scoreboard = Scoreboard::new(ApiClient::new(&harness.url).expect("api client"));
    let refresher = Arc::new(CountingRefresher {
        calls: AtomicUsize::new(0),
    });
    let refresher_dep: Arc<dyn ScoreboardRefresher> = refresher.clone();
    let session =
        QuizSession::connect_with_dependencies(&harness.url, tester(), scoreboard, refresher_dep)
            .await
            .expect("connect");
    let mut events = session.subscribe_events();

    harness.push(&waiting_update(2));
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Waiting)
    })
    .await;

    harness.push(&ServerEvent::GameEnd {
        results: vec![PlayerResult {
            username: "tester".to_string(),
            score: 120,
            time: 12.0,
            new_total_score: Some(500),
        }],
        winner: "tester".to_string(),
    });

    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::Finished)
    })
    .await;
    wait_for(&mut events, |e| *e == SessionEvent::ScoreUpdated(500)).await;
    let finished = wait_for(&mut events, |e| matches!(e, SessionEvent::MatchFinished(_))).await;
    let SessionEvent::MatchFinished(result) = finished else {
        unreachable!();
    };
    assert_eq!(result.winner, "tester");

    // Fire-and-forget refresh lands shortly after the transition.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_tears_the_connection_down() {
    let harness = Harness::spawn().await;
    let (session, mut events) = connect(&harness).await;

    session.logout();
    wait_for(&mut events, |e| {
        *e == SessionEvent::PhaseChanged(Phase::LoggedOut)
    })
    .await;
    wait_for(&mut events, |e| {
        *e == SessionEvent::ConnectionChanged(ConnectionStatus::Disconnected)
    })
    .await;
    assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
}
