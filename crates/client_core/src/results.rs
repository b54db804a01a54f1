//! End-of-match score reconciliation. The server is the single source of
//! truth: the identity's cumulative score is overwritten with the total the
//! server reports, never recomputed locally.

use shared::{domain::Identity, protocol::PlayerResult};

/// Applies a `game_end` payload to the local identity. Returns the new
/// authoritative total when the payload carries one for this player.
pub fn reconcile_score(identity: &mut Identity, results: &[PlayerResult]) -> Option<i64> {
    let mine = results.iter().find(|r| r.username == identity.username)?;
    let total = mine.new_total_score?;
    identity.score = total;
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(username: &str, score: i64, total: Option<i64>) -> PlayerResult {
        PlayerResult {
            username: username.to_string(),
            score,
            time: 10.0,
            new_total_score: total,
        }
    }

    #[test]
    fn overwrites_score_with_server_total() {
        let mut identity = Identity {
            username: "a".to_string(),
            score: 380,
        };
        let results = [entry("b", 80, Some(200)), entry("a", 120, Some(500))];
        assert_eq!(reconcile_score(&mut identity, &results), Some(500));
        // Authoritative overwrite, not 380 + 120.
        assert_eq!(identity.score, 500);
    }

    #[test]
    fn leaves_score_untouched_without_matching_entry() {
        let mut identity = Identity {
            username: "a".to_string(),
            score: 380,
        };
        let results = [entry("b", 80, Some(200))];
        assert_eq!(reconcile_score(&mut identity, &results), None);
        assert_eq!(identity.score, 380);
    }

    #[test]
    fn leaves_score_untouched_without_new_total() {
        let mut identity = Identity {
            username: "a".to_string(),
            score: 380,
        };
        let results = [entry("a", 120, None)];
        assert_eq!(reconcile_score(&mut identity, &results), None);
        assert_eq!(identity.score, 380);
    }
}
