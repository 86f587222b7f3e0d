//! Proximity fan-out of simulation events.
//!
//! Connected players are filed in a [`SpatialIndex`] keyed by their home
//! cell; membership only changes when a player crosses a cell boundary. An
//! event at a position is offered to the players in the 3×3 cell block around
//! it and then trimmed to the event's broadcast range, so nobody within range
//! is ever missed as long as the cell is at least as large as the range.

use crate::config::{BroadcastTier, SimConfig};
use crate::spatial::SpatialIndex;
use shared::{PlayerId, ServerEvent, Vec2};
use std::collections::HashMap;

/// An event with its resolved recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipients: Vec<PlayerId>,
    pub event: ServerEvent,
}

/// Receives the events produced by one simulation step.
pub trait EventSink {
    fn deliver(&mut self, tick: u64, outbound: Vec<Outbound>);
}

/// Range class for each event type.
pub fn tier_of(event: &ServerEvent) -> BroadcastTier {
    match event {
        ServerEvent::NpcDestroyed { .. }
        | ServerEvent::BaseUpdate(_)
        | ServerEvent::BaseDestroyed { .. } => BroadcastTier::Far,
        ServerEvent::NpcFire { .. }
        | ServerEvent::Hit { .. }
        | ServerEvent::BaseHit { .. }
        | ServerEvent::WreckageCollectStarted { .. }
        | ServerEvent::PlayerDebuff { .. }
        | ServerEvent::MiningComplete { .. }
        | ServerEvent::LootNotification { .. } => BroadcastTier::Near,
        ServerEvent::NpcSpawn(_)
        | ServerEvent::NpcUpdate(_)
        | ServerEvent::WreckageSpawn(_)
        | ServerEvent::WreckageCollected { .. }
        | ServerEvent::WreckageDespawn { .. }
        | ServerEvent::PlayerDestroyed { .. } => BroadcastTier::Standard,
    }
}

pub struct Broadcaster {
    index: SpatialIndex<PlayerId>,
    positions: HashMap<PlayerId, Vec2>,
    ranges: [f32; 3],
}

impl Broadcaster {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            index: SpatialIndex::new(config.cell_size),
            positions: HashMap::new(),
            ranges: [
                config.broadcast_range(BroadcastTier::Near),
                config.broadcast_range(BroadcastTier::Standard),
                config.broadcast_range(BroadcastTier::Far),
            ],
        }
    }

    fn range(&self, tier: BroadcastTier) -> f32 {
        match tier {
            BroadcastTier::Near => self.ranges[0],
            BroadcastTier::Standard => self.ranges[1],
            BroadcastTier::Far => self.ranges[2],
        }
    }

    /// Records a player's position. Returns true when their cell changed.
    pub fn update_membership(&mut self, player: PlayerId, position: Vec2) -> bool {
        self.positions.insert(player, position);
        self.index.update(player, position)
    }

    pub fn remove(&mut self, player: PlayerId) {
        self.positions.remove(&player);
        self.index.remove(player);
    }

    /// Players within `range` of `position`, in id order.
    pub fn players_near(&self, position: Vec2, range: f32) -> Vec<PlayerId> {
        let limit = range * range;
        let mut players: Vec<PlayerId> = self
            .index
            .candidates_within(position, range)
            .into_iter()
            .filter(|id| {
                self.positions
                    .get(id)
                    .map(|p| p.distance_squared(position) <= limit)
                    .unwrap_or(false)
            })
            .collect();
        players.sort_unstable();
        players
    }

    pub fn recipients_for(&self, event: &ServerEvent, position: Vec2) -> Vec<PlayerId> {
        self.players_near(position, self.range(tier_of(event)))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Events queued during a step, already addressed.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Vec<Outbound>,
}

impl Outbox {
    /// Queues an event for everyone in its range. Dropped if nobody is.
    pub fn near(&mut self, broadcaster: &Broadcaster, position: Vec2, event: ServerEvent) {
        let recipients = broadcaster.recipients_for(&event, position);
        if !recipients.is_empty() {
            self.queued.push(Outbound { recipients, event });
        }
    }

    pub fn to_player(&mut self, player: PlayerId, event: ServerEvent) {
        self.queued.push(Outbound {
            recipients: vec![player],
            event,
        });
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.queued)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn despawn(x: f32, y: f32) -> ServerEvent {
        ServerEvent::WreckageDespawn {
            id: 1,
            position: Vec2::new(x, y),
        }
    }

    #[test]
    fn test_membership_changes_only_across_cells() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        assert!(b.update_membership(1, Vec2::new(10.0, 10.0)));
        assert!(!b.update_membership(1, Vec2::new(500.0, 10.0)));
        assert!(b.update_membership(1, Vec2::new(cfg.cell_size + 1.0, 10.0)));
    }

    #[test]
    fn test_event_reaches_only_players_in_range() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        b.update_membership(1, Vec2::new(100.0, 0.0));
        b.update_membership(2, Vec2::new(cfg.range_standard + 50.0, 0.0));
        b.update_membership(3, Vec2::new(10_000.0, 0.0));

        let mut outbox = Outbox::default();
        outbox.near(&b, Vec2::ZERO, despawn(0.0, 0.0));
        let sent = outbox.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec![1]);
    }

    #[test]
    fn test_far_tier_reaches_further() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        b.update_membership(2, Vec2::new(cfg.range_standard + 50.0, 0.0));
        let destroyed = ServerEvent::BaseUpdate(shared::BaseSnapshot {
            id: "b".to_string(),
            faction: shared::Faction::Pirate,
            position: Vec2::ZERO,
            health: 1.0,
            max_health: 1.0,
            active: true,
            destroyed: false,
        });
        assert_eq!(b.recipients_for(&destroyed, Vec2::ZERO), vec![2]);
        assert!(b.recipients_for(&despawn(0.0, 0.0), Vec2::ZERO).is_empty());
    }

    #[test]
    fn test_no_recipient_means_no_event() {
        let cfg = SimConfig::default();
        let b = Broadcaster::new(&cfg);
        let mut outbox = Outbox::default();
        outbox.near(&b, Vec2::ZERO, despawn(0.0, 0.0));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_never_misses_player_within_range() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        let mut rng = StdRng::seed_from_u64(17);
        let mut positions = Vec::new();
        for id in 0..300u32 {
            let p = Vec2::new(rng.gen_range(-8000.0..8000.0), rng.gen_range(-8000.0..8000.0));
            b.update_membership(id, p);
            positions.push((id, p));
        }
        for _ in 0..200 {
            let origin = Vec2::new(rng.gen_range(-8000.0..8000.0), rng.gen_range(-8000.0..8000.0));
            let got = b.players_near(origin, cfg.range_far);
            for (id, p) in &positions {
                if p.distance(origin) <= cfg.range_far {
                    assert!(got.contains(id), "player {} missed", id);
                }
            }
        }
    }

    #[test]
    fn test_ranges_wider_than_a_cell() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        b.update_membership(1, Vec2::new(cfg.cell_size * 1.2, 0.0));
        b.update_membership(2, Vec2::new(cfg.cell_size * 2.5, 0.0));
        assert_eq!(b.players_near(Vec2::new(-10.0, 0.0), cfg.cell_size * 1.25), vec![1]);
    }

    #[test]
    fn test_removed_player_gets_nothing() {
        let cfg = SimConfig::default();
        let mut b = Broadcaster::new(&cfg);
        b.update_membership(5, Vec2::ZERO);
        b.remove(5);
        assert!(b.players_near(Vec2::ZERO, 100.0).is_empty());
        assert!(b.is_empty());
    }
}
