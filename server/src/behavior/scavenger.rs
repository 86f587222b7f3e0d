//! Scavengers: pick up unclaimed wreckage and haul it home.
//!
//! `idle -> seeking -> collecting -> returning -> dumping -> idle`, with rage
//! reachable from any of those. Hoarders skip the trip home, grow with every
//! load, and turn into a barnacle king once they carry enough.

use super::{
    enraged_step, enrage, hold_still, idle_expired, note_players, patrol, steer_toward,
    BehaviorContext, Intent, ARRIVE_DISTANCE, SEARCH_RADIUS,
};
use crate::entity::{BehaviorState, Npc};
use log::warn;
use shared::NpcType;

const DUMP_DISTANCE: f32 = 80.0;
const GROWTH_PER_ITEM: f32 = 0.08;

/// Archetype a hoarder becomes once its cargo reaches the threshold.
pub fn transformation(npc_type: NpcType) -> Option<NpcType> {
    match npc_type {
        NpcType::ScavengerHoarder => Some(NpcType::ScavengerBarnacleKing),
        _ => None,
    }
}

/// Visual/stat scale for a given cargo size. Monotonic in cargo.
pub fn growth_scale(cargo: usize) -> f32 {
    1.0 + cargo as f32 * GROWTH_PER_ITEM
}

pub fn update(npc: &mut Npc, ctx: &BehaviorContext<'_>) -> Option<Intent> {
    let stats = npc.stats();
    note_players(npc, ctx);

    if let BehaviorState::Enraged { target, until } = npc.state {
        return enraged_step(npc, ctx, target, until);
    }

    if let Some(thief) = detect_theft(npc, ctx) {
        enrage(npc, thief, ctx.now, ctx.config);
        return Some(Intent::Enrage { target: thief });
    }

    if !stats.returns_cargo {
        npc.locals.scale = growth_scale(npc.locals.cargo.len());
        if npc.locals.cargo.len() >= ctx.config.transform_cargo {
            if let Some(into) = transformation(npc.npc_type) {
                return Some(Intent::Transform { into });
            }
        }
    }

    match npc.state {
        BehaviorState::Idle | BehaviorState::Engaging { .. } | BehaviorState::Fleeing { .. } => {
            idle(npc, ctx, stats.returns_cargo)
        }
        BehaviorState::Seeking { wreckage } => {
            let objective = ctx
                .wreckage(wreckage)
                .filter(|w| w.collector.is_none())
                .map(|w| w.position);
            match objective {
                Some(position) => {
                    steer_toward(npc, position, stats.speed, ctx.dt);
                    if npc.position.distance(position) <= ARRIVE_DISTANCE {
                        npc.state = BehaviorState::Collecting {
                            wreckage,
                            until: ctx.now + ctx.config.scavenger_collect_time,
                        };
                    }
                }
                None => npc.state = BehaviorState::Idle,
            }
            None
        }
        BehaviorState::Collecting { wreckage, until } => {
            hold_still(npc);
            // A player took the lock first; look for something else.
            if !ctx.wreckage(wreckage).is_some_and(|w| w.collector.is_none()) {
                npc.state = BehaviorState::Idle;
                return None;
            }
            if ctx.now < until {
                return None;
            }
            npc.state = if stats.returns_cargo {
                BehaviorState::Returning
            } else {
                BehaviorState::Idle
            };
            Some(Intent::Collect { wreckage })
        }
        BehaviorState::Returning => {
            let Some(home) = ctx.home.as_ref() else {
                warn!("Scavenger {} has no home base to return to", npc.id);
                npc.state = BehaviorState::Idle;
                return None;
            };
            steer_toward(npc, home.position, stats.speed, ctx.dt);
            if npc.position.distance(home.position) <= DUMP_DISTANCE {
                npc.state = BehaviorState::Dumping {
                    until: ctx.now + ctx.config.scavenger_dump_time,
                };
            }
            None
        }
        BehaviorState::Dumping { until } => {
            hold_still(npc);
            if ctx.now < until {
                return None;
            }
            npc.state = BehaviorState::Idle;
            Some(Intent::Deposit)
        }
        BehaviorState::Enraged { .. } => None,
    }
}

fn idle(npc: &mut Npc, ctx: &BehaviorContext<'_>, returns_cargo: bool) -> Option<Intent> {
    npc.state = BehaviorState::Idle;

    if returns_cargo && !npc.locals.cargo.is_empty() && ctx.home.is_some() {
        npc.state = BehaviorState::Returning;
        return None;
    }

    let limit = SEARCH_RADIUS * SEARCH_RADIUS;
    let found = ctx
        .wreckage
        .iter()
        .filter(|w| w.collector.is_none())
        .map(|w| (w.id, w.position.distance_squared(npc.position)))
        .filter(|(_, d2)| *d2 <= limit)
        .min_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((wreckage, _)) = found {
        npc.state = BehaviorState::Seeking { wreckage };
        return None;
    }

    if idle_expired(npc, ctx) && npc.locals.cargo.is_empty() {
        return Some(Intent::Despawn);
    }
    patrol(npc, ctx);
    None
}

/// A player collecting our objective, close to it, without immunity.
fn detect_theft(npc: &Npc, ctx: &BehaviorContext<'_>) -> Option<u32> {
    let objective = match npc.state {
        BehaviorState::Seeking { wreckage } | BehaviorState::Collecting { wreckage, .. } => {
            ctx.wreckage(wreckage)?
        }
        _ => return None,
    };
    let collector = objective.collector?;
    let thief = ctx.player(collector)?;
    if thief.theft_immune {
        return None;
    }
    if thief.position.distance(objective.position) <= ctx.config.theft_radius {
        Some(thief.id)
    } else {
        None
    }
}
