//! Read-only leaderboard/stats cache fed by the REST collaborators. Refresh
//! failures are swallowed: the cache keeps its previous snapshot and game
//! state is never affected.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::domain::{LeaderboardEntry, ServerStats};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::warn;

use crate::api::ApiClient;

/// Seam for the result aggregator's fire-and-forget refresh trigger.
#[async_trait]
pub trait ScoreboardRefresher: Send + Sync {
    async fn refresh(&self);
}

pub struct Scoreboard {
    api: ApiClient,
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
    stats: RwLock<ServerStats>,
}

impl Scoreboard {
    pub fn new(api: ApiClient) -> Arc<Self> {
        Arc::new(Self {
            api,
            leaderboard: RwLock::new(Vec::new()),
            stats: RwLock::new(ServerStats::default()),
        })
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.read().await.clone()
    }

    pub async fn stats(&self) -> ServerStats {
        *self.stats.read().await
    }

    pub async fn refresh_leaderboard(&self) {
        match self.api.leaderboard().await {
            Ok(entries) => *self.leaderboard.write().await = entries,
            Err(err) => warn!(error = %err, "leaderboard refresh failed"),
        }
    }

    pub async fn refresh_stats(&self) {
        match self.api.stats().await {
            Ok(stats) => *self.stats.write().await = stats,
            Err(err) => warn!(error = %err, "stats refresh failed"),
        }
    }

    /// Overwrites the cached stats with a server push.
    pub async fn apply_stats_push(&self, stats: ServerStats) {
        *self.stats.write().await = stats;
    }

    /// Background refresh of both views at a fixed interval.
    pub fn spawn_periodic_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let scoreboard = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scoreboard.refresh_leaderboard().await;
                scoreboard.refresh_stats().await;
            }
        })
    }
}

#[async_trait]
impl ScoreboardRefresher for Scoreboard {
    async fn refresh(&self) {
        self.refresh_leaderboard().await;
    }
}
