//! Timestamp-tracked mining sessions, one per player.

use rand::Rng;
use shared::{ObjectId, PlayerId};
use std::collections::HashMap;

pub const MIN_YIELD: u32 = 1;
pub const MAX_YIELD: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct MiningSession {
    pub player: PlayerId,
    pub object_id: ObjectId,
    pub resource: String,
    pub started_at: f64,
    pub completes_at: f64,
}

#[derive(Debug, Default)]
pub struct MiningTracker {
    sessions: HashMap<PlayerId, MiningSession>,
}

impl MiningTracker {
    /// Starts a session, replacing any the player already had.
    pub fn start(&mut self, session: MiningSession) -> Option<MiningSession> {
        self.sessions.insert(session.player, session)
    }

    /// Drops a player's session. Returns whether one existed.
    pub fn cancel(&mut self, player: PlayerId) -> bool {
        self.sessions.remove(&player).is_some()
    }

    pub fn session(&self, player: PlayerId) -> Option<&MiningSession> {
        self.sessions.get(&player)
    }

    /// Removes and returns every session whose timer has run out.
    pub fn take_due(&mut self, now: f64) -> Vec<MiningSession> {
        let due: Vec<PlayerId> = self
            .sessions
            .values()
            .filter(|s| now >= s.completes_at)
            .map(|s| s.player)
            .collect();
        let mut finished: Vec<MiningSession> = due
            .into_iter()
            .filter_map(|player| self.sessions.remove(&player))
            .collect();
        finished.sort_by_key(|s| s.player);
        finished
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

pub fn roll_yield<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(MIN_YIELD..=MAX_YIELD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(player: PlayerId, completes_at: f64) -> MiningSession {
        MiningSession {
            player,
            object_id: format!("asteroid_0_0_{}", player),
            resource: "iron".to_string(),
            started_at: 0.0,
            completes_at,
        }
    }

    #[test]
    fn test_due_sessions_are_taken_once() {
        let mut tracker = MiningTracker::default();
        tracker.start(session(1, 3.0));
        tracker.start(session(2, 5.0));

        assert!(tracker.take_due(2.9).is_empty());
        let due = tracker.take_due(3.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].player, 1);
        assert!(tracker.take_due(3.5).is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_restart_replaces_session() {
        let mut tracker = MiningTracker::default();
        tracker.start(session(1, 3.0));
        let old = tracker.start(session(1, 9.0));
        assert_eq!(old.map(|s| s.completes_at), Some(3.0));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut tracker = MiningTracker::default();
        tracker.start(session(1, 3.0));
        assert!(tracker.cancel(1));
        assert!(!tracker.cancel(1));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_yield_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..500 {
            let y = roll_yield(&mut rng);
            assert!((MIN_YIELD..=MAX_YIELD).contains(&y));
        }
    }
}
