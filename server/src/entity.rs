//! Canonical records for NPCs, faction bases and wreckage.

use crate::archetype::{self, ArchetypeStats};
use crate::behavior::StrategyFn;
use shared::{
    BaseSnapshot, EntityId, Faction, LootItem, NpcSnapshot, NpcType, ObjectId, PlayerId, Vec2,
    WreckageSnapshot,
};
use std::collections::HashMap;

/// Behavior state of an NPC. Timed states carry the timestamp they end at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BehaviorState {
    Idle,
    Seeking { wreckage: EntityId },
    Collecting { wreckage: EntityId, until: f64 },
    Returning,
    Dumping { until: f64 },
    Engaging { target: PlayerId },
    Fleeing { from: PlayerId },
    Enraged { target: PlayerId, until: f64 },
}

impl BehaviorState {
    pub fn name(&self) -> &'static str {
        match self {
            BehaviorState::Idle => "idle",
            BehaviorState::Seeking { .. } => "seeking",
            BehaviorState::Collecting { .. } => "collecting",
            BehaviorState::Returning => "returning",
            BehaviorState::Dumping { .. } => "dumping",
            BehaviorState::Engaging { .. } => "engaging",
            BehaviorState::Fleeing { .. } => "fleeing",
            BehaviorState::Enraged { .. } => "enraged",
        }
    }

    pub fn is_enraged(&self) -> bool {
        matches!(self, BehaviorState::Enraged { .. })
    }
}

/// Per-NPC scratch fields. Archetypes that don't use a field leave it at its
/// zero value.
#[derive(Debug, Clone, Default)]
pub struct BehaviorLocals {
    pub next_fire_at: f64,
    pub next_special_at: f64,
    pub patrol_target: Option<Vec2>,
    pub cargo: Vec<LootItem>,
    pub last_player_seen: f64,
    pub scale: f32,
}

/// Cumulative damage per attacker over an entity's lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageLedger {
    contributions: HashMap<PlayerId, f32>,
}

impl DamageLedger {
    pub fn record(&mut self, attacker: PlayerId, amount: f32) {
        if amount > 0.0 {
            *self.contributions.entry(attacker).or_insert(0.0) += amount;
        }
    }

    /// Distinct contributors, heaviest hitter first (ties by id).
    pub fn participants(&self) -> Vec<PlayerId> {
        let mut entries: Vec<(PlayerId, f32)> =
            self.contributions.iter().map(|(id, d)| (*id, *d)).collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.into_iter().map(|(id, _)| id).collect()
    }

    pub fn damage_by(&self, attacker: PlayerId) -> f32 {
        self.contributions.get(&attacker).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    pub fn clear(&mut self) {
        self.contributions.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Npc {
    pub id: EntityId,
    pub npc_type: NpcType,
    pub faction: Faction,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub hull: f32,
    pub hull_max: f32,
    pub shield: f32,
    pub shield_max: f32,
    pub state: BehaviorState,
    pub locals: BehaviorLocals,
    pub ledger: DamageLedger,
    pub strategy: StrategyFn,
    pub home: Option<ObjectId>,
    pub home_position: Vec2,
    pub spawned_at: f64,
    pub destroyed: bool,
}

impl Npc {
    pub fn new(id: EntityId, npc_type: NpcType, position: Vec2, now: f64) -> Self {
        let stats = archetype::stats(npc_type);
        Self {
            id,
            npc_type,
            faction: npc_type.faction(),
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            hull: stats.hull,
            hull_max: stats.hull,
            shield: stats.shield,
            shield_max: stats.shield,
            state: BehaviorState::Idle,
            locals: BehaviorLocals {
                last_player_seen: now,
                scale: 1.0,
                ..BehaviorLocals::default()
            },
            ledger: DamageLedger::default(),
            strategy: archetype::strategy_for(npc_type),
            home: None,
            home_position: position,
            spawned_at: now,
            destroyed: false,
        }
    }

    pub fn stats(&self) -> ArchetypeStats {
        archetype::stats(self.npc_type)
    }

    pub fn snapshot(&self) -> NpcSnapshot {
        NpcSnapshot {
            id: self.id,
            npc_type: self.npc_type,
            faction: self.faction,
            position: self.position,
            rotation: self.rotation,
            hull: self.hull,
            hull_max: self.hull_max,
            shield: self.shield,
            shield_max: self.shield_max,
            state: self.state.name().to_string(),
            scale: self.locals.scale,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FactionBase {
    pub id: ObjectId,
    pub faction: Faction,
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub active: bool,
    pub activated_at: Option<f64>,
    pub last_player_near: f64,
    pub destroyed: bool,
    pub respawn_at: Option<f64>,
    pub next_spawn_at: f64,
    pub scrap_pile: u32,
    pub defender_called: bool,
    pub children: Vec<EntityId>,
    pub ledger: DamageLedger,
}

impl FactionBase {
    pub fn new(id: ObjectId, faction: Faction, position: Vec2) -> Self {
        let max_health = archetype::base_max_health(faction);
        Self {
            id,
            faction,
            position,
            health: max_health,
            max_health,
            active: false,
            activated_at: None,
            last_player_near: 0.0,
            destroyed: false,
            respawn_at: None,
            next_spawn_at: 0.0,
            scrap_pile: 0,
            defender_called: false,
            children: Vec::new(),
            ledger: DamageLedger::default(),
        }
    }

    /// Only active, standing bases take damage and spawn.
    pub fn is_vulnerable(&self) -> bool {
        self.active && !self.destroyed
    }

    pub fn snapshot(&self) -> BaseSnapshot {
        BaseSnapshot {
            id: self.id.clone(),
            faction: self.faction,
            position: self.position,
            health: self.health,
            max_health: self.max_health,
            active: self.active,
            destroyed: self.destroyed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wreckage {
    pub id: EntityId,
    pub position: Vec2,
    pub size: f32,
    pub faction: Faction,
    pub items: Vec<LootItem>,
    /// Damage contributors of whatever produced this wreckage, frozen at creation.
    pub contributors: Option<Vec<PlayerId>>,
    pub collector: Option<PlayerId>,
    pub collect_started_at: Option<f64>,
    pub progress: f32,
    pub spawned_at: f64,
    pub despawn_at: f64,
}

impl Wreckage {
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.despawn_at
    }

    pub fn snapshot(&self) -> WreckageSnapshot {
        WreckageSnapshot {
            id: self.id,
            faction: self.faction,
            position: self.position,
            size: self.size,
            item_count: self.items.len(),
            despawn_at: self.despawn_at,
        }
    }
}
