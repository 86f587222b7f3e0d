//! Faction resource tables and tier templates.

use crate::archetype::LootTier;
use shared::{Faction, Rarity, RelicType};

/// Resource names a faction can drop, per rarity tier.
#[derive(Debug)]
pub struct FactionTable {
    pub common: &'static [&'static str],
    pub uncommon: &'static [&'static str],
    pub rare: &'static [&'static str],
    pub ultra_rare: &'static [&'static str],
}

impl FactionTable {
    pub fn names(&self, rarity: Rarity) -> &'static [&'static str] {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Uncommon => self.uncommon,
            Rarity::Rare => self.rare,
            Rarity::UltraRare => self.ultra_rare,
        }
    }

    /// True if `name` appears in any tier.
    pub fn contains(&self, name: &str) -> bool {
        Rarity::ALL
            .iter()
            .any(|rarity| self.names(*rarity).contains(&name))
    }
}

static PIRATE: FactionTable = FactionTable {
    common: &["iron", "carbon"],
    uncommon: &["copper", "titanium"],
    rare: &["platinum"],
    ultra_rare: &["dark_matter"],
};

static SCAVENGER: FactionTable = FactionTable {
    common: &["scrap_metal", "iron"],
    uncommon: &["salvaged_circuits", "copper"],
    rare: &["quantum_chip"],
    ultra_rare: &["ancient_core"],
};

// Swarm and void have no common tier.
static SWARM: FactionTable = FactionTable {
    common: &[],
    uncommon: &["chitin", "bio_resin"],
    rare: &["hive_crystal"],
    ultra_rare: &["queen_essence"],
};

static VOID: FactionTable = FactionTable {
    common: &[],
    uncommon: &["void_dust"],
    rare: &["void_crystal", "exotic_matter"],
    ultra_rare: &["singularity_shard"],
};

pub fn faction_table(faction: Faction) -> &'static FactionTable {
    match faction {
        Faction::Pirate => &PIRATE,
        Faction::Scavenger => &SCAVENGER,
        Faction::Swarm => &SWARM,
        Faction::Void => &VOID,
    }
}

pub fn faction_relic(faction: Faction) -> RelicType {
    match faction {
        Faction::Pirate => RelicType::PirateSigil,
        Faction::Scavenger => RelicType::AncientStarMap,
        Faction::Swarm => RelicType::HiveMindFragment,
        Faction::Void => RelicType::VoidHeart,
    }
}

/// Slot counts, rarity weights and bonus chances for one loot tier.
#[derive(Debug, Clone, Copy)]
pub struct TierTemplate {
    pub guaranteed: u32,
    pub bonus_slots: u32,
    pub bonus_chance: f32,
    /// Common, uncommon, rare, ultra-rare. Sums to 1.
    pub weights: [f32; 4],
    pub quantity: (u32, u32),
    pub credits: (u64, u64),
    pub buff_chance: f32,
    pub component_chance: f32,
    pub relic_chance: f32,
}

pub fn template(tier: LootTier) -> TierTemplate {
    match tier {
        LootTier::Low => TierTemplate {
            guaranteed: 1,
            bonus_slots: 1,
            bonus_chance: 0.3,
            weights: [0.70, 0.25, 0.05, 0.0],
            quantity: (1, 3),
            credits: (5, 15),
            buff_chance: 0.05,
            component_chance: 0.02,
            relic_chance: 0.0,
        },
        LootTier::Mid => TierTemplate {
            guaranteed: 2,
            bonus_slots: 1,
            bonus_chance: 0.5,
            weights: [0.50, 0.35, 0.13, 0.02],
            quantity: (2, 5),
            credits: (15, 40),
            buff_chance: 0.1,
            component_chance: 0.08,
            relic_chance: 0.0,
        },
        LootTier::High => TierTemplate {
            guaranteed: 3,
            bonus_slots: 2,
            bonus_chance: 0.5,
            weights: [0.30, 0.40, 0.25, 0.05],
            quantity: (3, 8),
            credits: (40, 100),
            buff_chance: 0.2,
            component_chance: 0.15,
            relic_chance: 0.0,
        },
        LootTier::Boss => TierTemplate {
            guaranteed: 5,
            bonus_slots: 3,
            bonus_chance: 0.6,
            weights: [0.10, 0.35, 0.40, 0.15],
            quantity: (5, 12),
            credits: (150, 400),
            buff_chance: 0.5,
            component_chance: 0.4,
            relic_chance: 0.25,
        },
        LootTier::Base => TierTemplate {
            guaranteed: 6,
            bonus_slots: 4,
            bonus_chance: 0.5,
            weights: [0.20, 0.35, 0.35, 0.10],
            quantity: (8, 20),
            credits: (300, 800),
            buff_chance: 0.3,
            component_chance: 0.5,
            relic_chance: 0.15,
        },
    }
}
