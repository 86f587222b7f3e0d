//! Swarm: rush the nearest player and never let go.

use super::{
    enraged_step, idle_expired, note_players, patrol, pursue_and_attack, BehaviorContext, Intent,
};
use crate::entity::{BehaviorState, Npc};

pub fn update(npc: &mut Npc, ctx: &BehaviorContext<'_>) -> Option<Intent> {
    let stats = npc.stats();
    note_players(npc, ctx);

    if let BehaviorState::Enraged { target, until } = npc.state {
        return enraged_step(npc, ctx, target, until);
    }

    // Once locked on, a swarm unit chases out to the rage clear radius.
    let locked = match npc.state {
        BehaviorState::Engaging { target } => ctx
            .player(target)
            .filter(|p| p.position.distance(npc.position) <= ctx.config.rage_clear_radius),
        _ => None,
    };

    match locked.or_else(|| ctx.nearest_player(npc.position, stats.aggro_range)) {
        Some(target) => {
            npc.state = BehaviorState::Engaging { target: target.id };
            pursue_and_attack(npc, ctx, target, 0.5, stats.speed)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::test_support::{ctx, player};
    use crate::config::SimConfig;
    use shared::{NpcType, Vec2};

    #[test]
    fn test_drone_closes_distance() {
        let cfg = SimConfig::default();
        let mut npc = Npc::new(1, NpcType::SwarmDrone, Vec2::ZERO, 0.0);
        let players = vec![player(5, 700.0, 0.0)];
        let c = ctx(&cfg, 0.0, &players, &[], None);

        assert_eq!(update(&mut npc, &c), None);
        assert!(npc.position.x > 0.0);
        assert_eq!(npc.state, BehaviorState::Engaging { target: 5 });
    }

    #[test]
    fn test_keeps_chasing_beyond_aggro() {
        let cfg = SimConfig::default();
        let mut npc = Npc::new(1, NpcType::SwarmDrone, Vec2::ZERO, 0.0);
        npc.state = BehaviorState::Engaging { target: 5 };
        let players = vec![player(5, 1100.0, 0.0)];
        let c = ctx(&cfg, 0.0, &players, &[], None);

        update(&mut npc, &c);
        assert_eq!(npc.state, BehaviorState::Engaging { target: 5 });
    }

    #[test]
    fn test_warrior_opens_with_acid() {
        let cfg = SimConfig::default();
        let mut npc = Npc::new(1, NpcType::SwarmWarrior, Vec2::ZERO, 0.0);
        let players = vec![player(5, 100.0, 0.0)];
        let c = ctx(&cfg, 0.0, &players, &[], None);
        assert_eq!(update(&mut npc, &c), Some(Intent::Special { target: 5 }));
    }
}
