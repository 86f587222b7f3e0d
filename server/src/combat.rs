//! Hit chance, shield/hull damage split and kill-credit attribution.

use crate::config::{SimConfig, TeamMultipliers};
use crate::entity::DamageLedger;
use rand::Rng;
use shared::{PlayerId, Vec2};

/// How a single damage application divides between shield and hull.
///
/// `shield_damage + hull_damage` always equals the requested amount;
/// `hull_damage` includes the pierced portion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageSplit {
    pub shield_damage: f32,
    pub hull_damage: f32,
    pub pierced: f32,
}

/// Splits `amount` against a target with `shield` remaining.
///
/// `piercing` of the damage skips the shield outright. Of the rest,
/// `absorption` is soaked by whatever shield is left; the remainder spills
/// onto the hull.
pub fn split_damage(amount: f32, shield: f32, piercing: f32, absorption: f32) -> DamageSplit {
    let amount = amount.max(0.0);
    let pierced = amount * piercing.clamp(0.0, 1.0);
    let rest = amount - pierced;
    let absorbed = (rest * absorption.clamp(0.0, 1.0)).min(shield.max(0.0));
    DamageSplit {
        shield_damage: absorbed,
        hull_damage: amount - absorbed,
        pierced,
    }
}

/// Applies a split to (hull, shield), never going below zero.
pub fn apply_split(hull: f32, shield: f32, split: DamageSplit) -> (f32, f32) {
    (
        (hull - split.hull_damage).max(0.0),
        (shield - split.shield_damage).max(0.0),
    )
}

/// Hit probability for an NPC shot.
///
/// Falls linearly with range fraction and with target speed relative to the
/// threshold; each penalty is capped, and the result is clamped.
pub fn accuracy(
    base: f32,
    distance: f32,
    max_range: f32,
    target_speed: f32,
    config: &SimConfig,
) -> f32 {
    let range_fraction = if max_range > 0.0 {
        (distance / max_range).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let distance_penalty = range_fraction * config.distance_penalty_max;
    let speed_fraction = if config.velocity_threshold > 0.0 {
        (target_speed / config.velocity_threshold).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let velocity_penalty = speed_fraction * config.velocity_penalty_max;
    (base - distance_penalty - velocity_penalty).clamp(config.accuracy_min, config.accuracy_max)
}

/// True when `to` is inside `range` of `from`, allowing `tolerance` slack for
/// positions that went stale in flight.
pub fn within_weapon_range(from: Vec2, to: Vec2, range: f32, tolerance: f32) -> bool {
    from.distance(to) <= range + tolerance
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireOutcome {
    pub hit: bool,
    pub damage: f32,
    pub accuracy: f32,
}

/// Rolls one NPC shot. Out of range (after tolerance) is a guaranteed miss;
/// a miss still produces an outcome so the shot can be drawn.
#[allow(clippy::too_many_arguments)]
pub fn resolve_npc_fire<R: Rng + ?Sized>(
    base_accuracy: f32,
    damage: f32,
    weapon_range: f32,
    shooter: Vec2,
    target: Vec2,
    target_velocity: Vec2,
    config: &SimConfig,
    rng: &mut R,
) -> FireOutcome {
    if !within_weapon_range(shooter, target, weapon_range, config.range_tolerance) {
        return FireOutcome {
            hit: false,
            damage: 0.0,
            accuracy: 0.0,
        };
    }
    let chance = accuracy(
        base_accuracy,
        shooter.distance(target),
        weapon_range,
        target_velocity.length(),
        config,
    );
    let hit = rng.gen::<f32>() < chance;
    FireOutcome {
        hit,
        damage: if hit { damage } else { 0.0 },
        accuracy: chance,
    }
}

/// Reward split for a destroyed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct KillCredit {
    pub participants: Vec<PlayerId>,
    pub multiplier: f32,
    pub total: u64,
    pub per_player: u64,
    /// Exact per-player payout; the top contributor absorbs the remainder.
    pub shares: Vec<(PlayerId, u64)>,
}

/// Splits `base_credits × multiplier(N)` evenly among the N participants.
pub fn team_credit(
    participants: Vec<PlayerId>,
    base_credits: u64,
    table: &TeamMultipliers,
) -> KillCredit {
    let n = participants.len();
    let multiplier = table.for_count(n);
    if n == 0 {
        return KillCredit {
            participants,
            multiplier,
            total: 0,
            per_player: 0,
            shares: Vec::new(),
        };
    }
    let total = (base_credits as f64 * multiplier as f64).round() as u64;
    let per_player = total / n as u64;
    let remainder = total - per_player * n as u64;
    let shares = participants
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, if i == 0 { per_player + remainder } else { per_player }))
        .collect();
    KillCredit {
        participants,
        multiplier,
        total,
        per_player,
        shares,
    }
}

/// Kill credit from a lifetime damage ledger.
pub fn credit_from_ledger(
    ledger: &DamageLedger,
    base_credits: u64,
    table: &TeamMultipliers,
) -> KillCredit {
    team_credit(ledger.participants(), base_credits, table)
}
