//! Static stat rows for every NPC archetype.

use crate::behavior::{self, StrategyFn};
use shared::{Faction, NpcType};

/// Loot template class an archetype drops from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LootTier {
    Low,
    Mid,
    High,
    Boss,
    Base,
}

/// Debuff-inflicting attack some archetypes carry besides their gun.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecialAttack {
    /// Damage over time: `damage` every `interval` seconds for `duration`.
    Acid {
        damage: f32,
        interval: f64,
        duration: f64,
        cooldown: f64,
    },
    /// Movement slow by `percent` (0..1) for `duration`.
    Slow {
        percent: f32,
        duration: f64,
        cooldown: f64,
    },
}

impl SpecialAttack {
    pub fn cooldown(&self) -> f64 {
        match self {
            SpecialAttack::Acid { cooldown, .. } | SpecialAttack::Slow { cooldown, .. } => {
                *cooldown
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchetypeStats {
    pub hull: f32,
    pub shield: f32,
    pub speed: f32,
    pub weapon_range: f32,
    pub damage: f32,
    pub fire_cooldown: f64,
    pub piercing: f32,
    pub credits: u64,
    pub tier: LootTier,
    pub aggro_range: f32,
    pub special: Option<SpecialAttack>,
    /// Pirates below this hull fraction break off and flee.
    pub flee_below: Option<f32>,
    /// Returns collected cargo to its home base instead of hoarding it.
    pub returns_cargo: bool,
}

const fn row(
    hull: f32,
    shield: f32,
    speed: f32,
    weapon_range: f32,
    damage: f32,
    fire_cooldown: f64,
    credits: u64,
    tier: LootTier,
    aggro_range: f32,
) -> ArchetypeStats {
    ArchetypeStats {
        hull,
        shield,
        speed,
        weapon_range,
        damage,
        fire_cooldown,
        piercing: 0.0,
        credits,
        tier,
        aggro_range,
        special: None,
        flee_below: None,
        returns_cargo: false,
    }
}

const ACID: SpecialAttack = SpecialAttack::Acid {
    damage: 5.0,
    interval: 1.0,
    duration: 5.0,
    cooldown: 8.0,
};

const SLOW: SpecialAttack = SpecialAttack::Slow {
    percent: 0.4,
    duration: 4.0,
    cooldown: 10.0,
};

pub fn stats(npc_type: NpcType) -> ArchetypeStats {
    use LootTier::*;
    match npc_type {
        NpcType::PirateScout => ArchetypeStats {
            flee_below: Some(0.2),
            ..row(120.0, 60.0, 180.0, 500.0, 8.0, 1.2, 40, Low, 700.0)
        },
        NpcType::PirateFighter => ArchetypeStats {
            flee_below: Some(0.2),
            ..row(250.0, 150.0, 150.0, 550.0, 14.0, 1.0, 90, Mid, 800.0)
        },
        NpcType::PirateCaptain => row(600.0, 400.0, 120.0, 650.0, 24.0, 1.4, 250, High, 900.0),
        NpcType::PirateDreadnought => ArchetypeStats {
            piercing: 0.15,
            ..row(2500.0, 1500.0, 70.0, 800.0, 60.0, 2.0, 1200, Boss, 1100.0)
        },
        NpcType::ScavengerScrapper => ArchetypeStats {
            returns_cargo: true,
            ..row(150.0, 50.0, 130.0, 400.0, 6.0, 1.5, 35, Low, 500.0)
        },
        NpcType::ScavengerHoarder => row(220.0, 80.0, 110.0, 420.0, 9.0, 1.5, 60, Mid, 500.0),
        NpcType::ScavengerBarnacleKing => ArchetypeStats {
            piercing: 0.1,
            ..row(1800.0, 600.0, 60.0, 600.0, 40.0, 1.8, 900, Boss, 900.0)
        },
        NpcType::SwarmDrone => row(60.0, 0.0, 220.0, 300.0, 5.0, 0.8, 20, Low, 800.0),
        NpcType::SwarmWarrior => ArchetypeStats {
            special: Some(ACID),
            ..row(200.0, 50.0, 190.0, 350.0, 12.0, 1.0, 70, Mid, 900.0)
        },
        NpcType::SwarmQueen => ArchetypeStats {
            special: Some(ACID),
            ..row(3000.0, 800.0, 50.0, 700.0, 45.0, 1.6, 1500, Boss, 1200.0)
        },
        NpcType::VoidWisp => ArchetypeStats {
            piercing: 0.3,
            ..row(90.0, 120.0, 200.0, 450.0, 10.0, 1.1, 50, Low, 700.0)
        },
        NpcType::VoidStalker => ArchetypeStats {
            piercing: 0.3,
            special: Some(SLOW),
            ..row(320.0, 300.0, 160.0, 600.0, 20.0, 1.3, 160, High, 850.0)
        },
        NpcType::VoidLeviathan => ArchetypeStats {
            piercing: 0.3,
            special: Some(SLOW),
            ..row(2800.0, 2000.0, 60.0, 850.0, 70.0, 2.2, 1600, Boss, 1200.0)
        },
    }
}

/// Base hit chance before distance and velocity penalties.
pub fn faction_accuracy(faction: Faction) -> f32 {
    match faction {
        Faction::Pirate => 0.75,
        Faction::Scavenger => 0.6,
        Faction::Swarm => 0.65,
        Faction::Void => 0.8,
    }
}

/// Behavior implementation for an archetype, resolved once at spawn.
pub fn strategy_for(npc_type: NpcType) -> StrategyFn {
    match npc_type.faction() {
        Faction::Pirate => behavior::pirate::update,
        Faction::Scavenger => behavior::scavenger::update,
        Faction::Swarm => behavior::swarm::update,
        Faction::Void => behavior::void::update,
    }
}

/// What a faction's bases put into the world, with relative weights.
pub fn base_spawn_table(faction: Faction) -> &'static [(NpcType, f32)] {
    match faction {
        Faction::Pirate => &[
            (NpcType::PirateScout, 0.6),
            (NpcType::PirateFighter, 0.3),
            (NpcType::PirateCaptain, 0.1),
        ],
        Faction::Scavenger => &[
            (NpcType::ScavengerScrapper, 0.7),
            (NpcType::ScavengerHoarder, 0.3),
        ],
        Faction::Swarm => &[(NpcType::SwarmDrone, 0.7), (NpcType::SwarmWarrior, 0.3)],
        Faction::Void => &[(NpcType::VoidWisp, 0.75), (NpcType::VoidStalker, 0.25)],
    }
}

/// Boss a base calls in when first pushed below half health.
pub fn base_defender(faction: Faction) -> NpcType {
    match faction {
        Faction::Pirate => NpcType::PirateDreadnought,
        Faction::Scavenger => NpcType::ScavengerBarnacleKing,
        Faction::Swarm => NpcType::SwarmQueen,
        Faction::Void => NpcType::VoidLeviathan,
    }
}

pub fn base_max_health(faction: Faction) -> f32 {
    match faction {
        Faction::Pirate => 5000.0,
        Faction::Scavenger => 4000.0,
        Faction::Swarm => 6000.0,
        Faction::Void => 7000.0,
    }
}

pub fn base_kill_credits(faction: Faction) -> u64 {
    match faction {
        Faction::Pirate => 2000,
        Faction::Scavenger => 1500,
        Faction::Swarm => 2500,
        Faction::Void => 3000,
    }
}
