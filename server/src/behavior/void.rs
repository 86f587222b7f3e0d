//! Void: keep at the edge of weapon range and wear targets down.

use super::{
    enraged_step, hold_still, idle_expired, note_players, patrol, steer_away, steer_toward,
    try_attack, BehaviorContext, Intent,
};
use crate::entity::{BehaviorState, Npc};

const PREFERRED: f32 = 0.9;
const TOO_CLOSE: f32 = 0.6;

pub fn update(npc: &mut Npc, ctx: &BehaviorContext<'_>) -> Option<Intent> {
    let stats = npc.stats();
    note_players(npc, ctx);

    if let BehaviorState::Enraged { target, until } = npc.state {
        return enraged_step(npc, ctx, target, until);
    }

    let Some(target) = ctx.nearest_player(npc.position, stats.aggro_range) else {
        npc.state = BehaviorState::Idle;
        if idle_expired(npc, ctx) {
            return Some(Intent::Despawn);
        }
        patrol(npc, ctx);
        return None;
    };

    npc.state = BehaviorState::Engaging { target: target.id };
    let dist = npc.position.distance(target.position);
    if dist > stats.weapon_range * PREFERRED {
        let stop_at = target.position
            + (npc.position - target.position).normalize() * (stats.weapon_range * PREFERRED);
        steer_toward(npc, stop_at, stats.speed, ctx.dt);
    } else if dist < stats.weapon_range * TOO_CLOSE {
        steer_away(npc, target.position, stats.speed, ctx.dt);
    } else {
        hold_still(npc);
        npc.rotation = (target.position - npc.position).angle();
    }
    try_attack(npc, target, ctx.now)
}
