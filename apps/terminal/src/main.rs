use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use client_core::{ApiClient, Phase, QuizSession, SessionEvent};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::warn;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the quiz server; overrides config file and environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: String,
    /// An empty password performs a guest login.
    #[arg(long, default_value = "")]
    password: String,
    /// Create the account before logging in.
    #[arg(long)]
    signup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.server_url {
        settings.server_url = url;
    }

    let api = ApiClient::new(&settings.server_url)?;
    let identity = if args.signup {
        api.signup(&args.username, &args.password).await?
    } else {
        api.login(&args.username, &args.password).await?
    };
    println!(
        "Logged in as {} ({} points)",
        identity.username, identity.score
    );

    let session = QuizSession::connect(&settings.server_url, identity).await?;
    let scoreboard = session.scoreboard();
    let _refresh_task = scoreboard
        .spawn_periodic_refresh(Duration::from_secs(settings.refresh_interval_secs));

    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session event stream lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "play" => {
                let category = rest.trim();
                if category.is_empty() {
                    println!("usage: play <category>");
                    continue;
                }
                session.find_match();
                session.request_match(category);
            }
            "answer" => session.submit_answer(rest),
            "cancel" => session.cancel_search(),
            "again" => session.play_again(),
            "menu" => session.back_to_menu(),
            "board" => {
                for (rank, entry) in scoreboard.leaderboard().await.iter().enumerate() {
                    println!(" #{:<3} {:<16} {} pts", rank + 1, entry.username, entry.score);
                }
            }
            "stats" => {
                let stats = scoreboard.stats().await;
                println!(
                    "players: {}  active games: {}  online now: {}",
                    stats.total_users, stats.active_games, stats.connected_players
                );
            }
            "help" => print_help(),
            "quit" | "logout" => {
                session.logout();
                break;
            }
            other => println!("unknown command: {other} (try 'help')"),
        }
    }

    Ok(())
}

fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::PhaseChanged(phase) => match phase {
            Phase::Menu => println!("-- main menu (try 'play <category>')"),
            Phase::SelectingCategory => println!("-- pick a category with 'play <category>'"),
            Phase::Waiting => println!("-- searching for players..."),
            Phase::Playing => {}
            Phase::Finished => println!("-- game over"),
            Phase::LoggedOut => println!("-- logged out"),
        },
        SessionEvent::ConnectionChanged(status) => println!("-- connection: {status:?}"),
        SessionEvent::LobbyUpdated(lobby) => {
            println!("   lobby: {}/{} players", lobby.player_count, lobby.max_players);
        }
        SessionEvent::RoundStarted(round) => {
            println!(
                "Q{}/{} ({}s): {}",
                round.index, round.total, round.duration_secs, round.question
            );
        }
        SessionEvent::TimerTick { remaining_secs } => println!("   {remaining_secs}s left"),
        SessionEvent::OutcomeReceived(outcome) => {
            let verdict = if outcome.correct { "correct" } else { "wrong" };
            println!("   {verdict}: {}", outcome.message);
        }
        SessionEvent::Notice(message) => println!("   {message}"),
        SessionEvent::ScoreUpdated(score) => println!("   total score: {score}"),
        SessionEvent::MatchFinished(result) => {
            println!("   winner: {}", result.winner);
            for (rank, row) in result.results.iter().enumerate() {
                println!(
                    "   #{:<3} {:<16} {} pts in {}s",
                    rank + 1,
                    row.username,
                    row.score,
                    row.time
                );
            }
        }
        SessionEvent::OutcomeCleared
        | SessionEvent::NoticeCleared
        | SessionEvent::StatsUpdated(_) => {}
    }
}

fn print_help() {
    println!("commands: play <category> | answer <text> | cancel | again | menu | board | stats | quit");
}
