//! NPC decision making.
//!
//! Every archetype maps to one strategy function, resolved at spawn time and
//! stored on the NPC. A strategy sees the NPC, a pre-filtered view of its
//! surroundings and the clock, moves the NPC, updates the NPC's own state
//! and returns at most one [`Intent`] for the tick driver to carry out.
//! Strategies never look at the whole world.

pub mod pirate;
pub mod scavenger;
pub mod swarm;
pub mod void;

use crate::config::SimConfig;
use crate::entity::{BehaviorState, Npc};
use crate::registry::EntityRegistry;
use log::debug;
use shared::{EntityId, NpcType, ObjectId, PlayerId, Vec2};

pub type StrategyFn = fn(&mut Npc, &BehaviorContext<'_>) -> Option<Intent>;

/// Something a strategy wants done outside the NPC's own record.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Fire { target: PlayerId },
    Special { target: PlayerId },
    /// The NPC enraged itself; allies nearby should follow.
    Enrage { target: PlayerId },
    /// Collection timer finished; pull the wreckage into cargo.
    Collect { wreckage: EntityId },
    /// Dump timer finished; move cargo into the home base.
    Deposit,
    Transform { into: NpcType },
    Flee { from: PlayerId },
    Despawn,
}

/// What an NPC can see of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Holds a condition that stops scavengers treating them as thieves.
    pub theft_immune: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WreckageView {
    pub id: EntityId,
    pub position: Vec2,
    pub collector: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeView {
    pub id: ObjectId,
    pub position: Vec2,
}

pub struct BehaviorContext<'a> {
    pub now: f64,
    pub dt: f32,
    pub config: &'a SimConfig,
    /// Players close enough to matter, nearest first is not guaranteed.
    pub players: &'a [PlayerView],
    pub wreckage: &'a [WreckageView],
    pub home: Option<HomeView>,
}

impl<'a> BehaviorContext<'a> {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn nearest_player(&self, from: Vec2, within: f32) -> Option<&PlayerView> {
        let limit = within * within;
        self.players
            .iter()
            .map(|p| (p, p.position.distance_squared(from)))
            .filter(|(_, d2)| *d2 <= limit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }

    pub fn wreckage(&self, id: EntityId) -> Option<&WreckageView> {
        self.wreckage.iter().find(|w| w.id == id)
    }
}

/// Radius scavengers scan for loot.
pub const SEARCH_RADIUS: f32 = 1200.0;
/// Distance at which a mover counts as arrived.
pub const ARRIVE_DISTANCE: f32 = 40.0;
const PATROL_RADIUS: f32 = 250.0;

/// Moves toward `target` at up to `speed`, stopping on it.
pub fn steer_toward(npc: &mut Npc, target: Vec2, speed: f32, dt: f32) {
    let to = target - npc.position;
    let dist = to.length();
    if dist <= f32::EPSILON {
        npc.velocity = Vec2::ZERO;
        return;
    }
    let step = (speed * dt).min(dist);
    let dir = to.normalize();
    npc.velocity = dir * speed.min(dist / dt.max(1e-3));
    npc.position += dir * step;
    npc.rotation = dir.angle();
}

pub fn steer_away(npc: &mut Npc, threat: Vec2, speed: f32, dt: f32) {
    let mut dir = (npc.position - threat).normalize();
    if dir == Vec2::ZERO {
        dir = Vec2::new(1.0, 0.0);
    }
    npc.velocity = dir * speed;
    npc.position += dir * (speed * dt);
    npc.rotation = dir.angle();
}

pub fn hold_still(npc: &mut Npc) {
    npc.velocity = Vec2::ZERO;
}

/// Slow loop around the home point. Deterministic in (id, time).
pub fn patrol(npc: &mut Npc, ctx: &BehaviorContext<'_>) {
    let phase = (npc.id % 628) as f64 / 100.0;
    let angle = (ctx.now * 0.15 + phase) as f32;
    let center = ctx
        .home
        .as_ref()
        .map(|h| h.position)
        .unwrap_or(npc.home_position);
    let point = center + Vec2::from_angle(angle) * PATROL_RADIUS;
    npc.locals.patrol_target = Some(point);
    let speed = npc.stats().speed * 0.5;
    steer_toward(npc, point, speed, ctx.dt);
}

/// Refreshes the last time a player was within aggro range.
pub fn note_players(npc: &mut Npc, ctx: &BehaviorContext<'_>) {
    let aggro = npc.stats().aggro_range;
    if ctx.nearest_player(npc.position, aggro).is_some() {
        npc.locals.last_player_seen = ctx.now;
    }
}

pub fn idle_expired(npc: &Npc, ctx: &BehaviorContext<'_>) -> bool {
    ctx.now - npc.locals.last_player_seen >= ctx.config.npc_idle_despawn
}

/// Gun and special use against a target in reach. Special takes precedence.
pub fn try_attack(npc: &mut Npc, target: &PlayerView, now: f64) -> Option<Intent> {
    let stats = npc.stats();
    if npc.position.distance(target.position) > stats.weapon_range {
        return None;
    }
    if let Some(special) = stats.special {
        if now >= npc.locals.next_special_at {
            npc.locals.next_special_at = now + special.cooldown();
            return Some(Intent::Special { target: target.id });
        }
    }
    if now >= npc.locals.next_fire_at {
        npc.locals.next_fire_at = now + stats.fire_cooldown;
        return Some(Intent::Fire { target: target.id });
    }
    None
}

/// Closes to `approach` × weapon range of the target and attacks when able.
pub fn pursue_and_attack(
    npc: &mut Npc,
    ctx: &BehaviorContext<'_>,
    target: &PlayerView,
    approach: f32,
    speed: f32,
) -> Option<Intent> {
    let stats = npc.stats();
    let desired = stats.weapon_range * approach;
    let dist = npc.position.distance(target.position);
    if dist > desired {
        let stop_at = target.position + (npc.position - target.position).normalize() * desired;
        steer_toward(npc, stop_at, speed, ctx.dt);
    } else {
        hold_still(npc);
        npc.rotation = (target.position - npc.position).angle();
    }
    try_attack(npc, target, ctx.now)
}

/// Puts the NPC into rage against `target` with a fresh timer.
///
/// Re-triggering refreshes the deadline from `now`; it never extends an
/// existing rage beyond one full duration.
pub fn enrage(npc: &mut Npc, target: PlayerId, now: f64, config: &SimConfig) {
    npc.state = BehaviorState::Enraged {
        target,
        until: now + config.rage_duration,
    };
}

/// Shared enraged step: chase at the rage speed bonus, fire on cooldown,
/// calm down when the target is gone, too far, or the timer ran out.
pub fn enraged_step(
    npc: &mut Npc,
    ctx: &BehaviorContext<'_>,
    target: PlayerId,
    until: f64,
) -> Option<Intent> {
    let clear = ctx.config.rage_clear_radius;
    let victim = ctx
        .player(target)
        .filter(|p| p.position.distance(npc.position) <= clear);
    match victim {
        Some(victim) if ctx.now < until => {
            let speed = npc.stats().speed * ctx.config.rage_speed_bonus;
            pursue_and_attack(npc, ctx, victim, 0.6, speed)
        }
        _ => {
            debug!("NPC {} calms down", npc.id);
            npc.state = BehaviorState::Idle;
            hold_still(npc);
            None
        }
    }
}

/// Enrages `source` and every same-faction NPC within the spread radius
/// against `target`. Returns the ids that are now enraged.
pub fn spread_rage(
    registry: &mut EntityRegistry,
    source: EntityId,
    target: PlayerId,
    now: f64,
    config: &SimConfig,
) -> Vec<EntityId> {
    let mut group = vec![source];
    group.extend(registry.allies_within(source, config.rage_spread_radius));

    let mut enraged = Vec::with_capacity(group.len());
    for id in group {
        if let Some(npc) = registry.npc_mut(id) {
            enrage(npc, target, now, config);
            enraged.push(id);
        }
    }
    enraged
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn player(id: PlayerId, x: f32, y: f32) -> PlayerView {
        PlayerView {
            id,
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            theft_immune: false,
        }
    }

    pub fn ctx<'a>(
        config: &'a SimConfig,
        now: f64,
        players: &'a [PlayerView],
        wreckage: &'a [WreckageView],
        home: Option<HomeView>,
    ) -> BehaviorContext<'a> {
        BehaviorContext {
            now,
            dt: 0.05,
            config,
            players,
            wreckage,
            home,
        }
    }
}
