//! Pirates: patrol, engage the nearest player, break off when badly hurt.

use super::{
    enraged_step, idle_expired, note_players, patrol, pursue_and_attack, steer_away,
    BehaviorContext, Intent,
};
use crate::entity::{BehaviorState, Npc};

pub fn update(npc: &mut Npc, ctx: &BehaviorContext<'_>) -> Option<Intent> {
    let stats = npc.stats();
    note_players(npc, ctx);

    if let BehaviorState::Fleeing { from } = npc.state {
        return flee(npc, ctx, from);
    }

    let threatened = ctx.nearest_player(npc.position, stats.aggro_range).map(|p| p.id);
    if let (Some(threshold), Some(threat)) = (stats.flee_below, threatened) {
        if npc.hull / npc.hull_max < threshold {
            npc.state = BehaviorState::Fleeing { from: threat };
            return Some(Intent::Flee { from: threat });
        }
    }

    if let BehaviorState::Enraged { target, until } = npc.state {
        return enraged_step(npc, ctx, target, until);
    }

    match ctx.nearest_player(npc.position, stats.aggro_range) {
        Some(target) => {
            npc.state = BehaviorState::Engaging { target: target.id };
            pursue_and_attack(npc, ctx, target, 0.7, stats.speed)
        }
        None => {
            npc.state = BehaviorState::Idle;
            if idle_expired(npc, ctx) {
                return Some(Intent::Despawn);
            }
            patrol(npc, ctx);
            None
        }
    }
}

fn flee(npc: &mut Npc, ctx: &BehaviorContext<'_>, from: u32) -> Option<Intent> {
    let stats = npc.stats();
    let threat = ctx
        .player(from)
        .filter(|p| p.position.distance(npc.position) <= stats.aggro_range * 1.5);
    match threat {
        Some(threat) => {
            steer_away(npc, threat.position, stats.speed * 1.2, ctx.dt);
            None
        }
        None => Some(Intent::Despawn),
    }
}
