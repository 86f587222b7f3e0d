//! Loot generation from faction tables and tier templates, and the split of
//! a collected wreckage among the players who earned it.
//!
//! Generation is two-stage: a tier template decides how many resource slots
//! to roll and at which rarity, the faction table decides which resource
//! names fill them. Repeated names are merged before the flat item list is
//! produced, so a wreckage never carries two `iron` entries.

pub mod distribute;
pub mod tables;

pub use distribute::{distribute, Distribution, Payout};

use crate::archetype::{self, LootTier};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{BuffType, ComponentType, Faction, LootItem, NpcType, Rarity};
use std::collections::HashMap;
use tables::{faction_table, faction_relic, template, FactionTable, TierTemplate};

const BUFFS: [BuffType; 4] = [
    BuffType::ShieldBoost,
    BuffType::SpeedBoost,
    BuffType::DamageBoost,
    BuffType::ScrapPact,
];

/// One rolled resource slot before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub rarity: Rarity,
    pub resource: &'static str,
    pub quantity: u32,
}

/// Picks a rarity from cumulative weights. Lands on common when float error
/// leaves the roll past the last bucket.
pub fn roll_rarity<R: Rng + ?Sized>(weights: &[f32; 4], rng: &mut R) -> Rarity {
    let roll: f32 = rng.gen();
    let mut acc = 0.0;
    for (rarity, weight) in Rarity::ALL.iter().zip(weights.iter()) {
        acc += weight;
        if roll < acc {
            return *rarity;
        }
    }
    Rarity::Common
}

/// The tier actually drawn from for a rolled rarity. Empty tiers step up to
/// the next non-empty one; if nothing above is populated, step down.
pub fn resolve_rarity(table: &FactionTable, rolled: Rarity) -> Option<Rarity> {
    let idx = Rarity::ALL.iter().position(|r| *r == rolled).unwrap_or(0);
    let upward = Rarity::ALL[idx..].iter();
    let downward = Rarity::ALL[..idx].iter().rev();
    upward
        .chain(downward)
        .copied()
        .find(|rarity| !table.names(*rarity).is_empty())
}

/// Rolls the resource slots for one drop without merging them.
pub fn roll_slots<R: Rng + ?Sized>(
    table: &FactionTable,
    tpl: &TierTemplate,
    rng: &mut R,
) -> Vec<Slot> {
    let mut count = tpl.guaranteed;
    for _ in 0..tpl.bonus_slots {
        if rng.gen::<f32>() < tpl.bonus_chance {
            count += 1;
        }
    }

    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let rolled = roll_rarity(&tpl.weights, rng);
        let Some(rarity) = resolve_rarity(table, rolled) else {
            continue;
        };
        let Some(resource) = table.names(rarity).choose(rng) else {
            continue;
        };
        slots.push(Slot {
            rarity,
            resource: *resource,
            quantity: rng.gen_range(tpl.quantity.0..=tpl.quantity.1),
        });
    }
    slots
}

/// Generates the contents of a wreckage for `faction` at `tier`.
pub fn generate<R: Rng + ?Sized>(faction: Faction, tier: LootTier, rng: &mut R) -> Vec<LootItem> {
    let table = faction_table(faction);
    let tpl = template(tier);

    let mut items: Vec<LootItem> = roll_slots(table, &tpl, rng)
        .into_iter()
        .map(|slot| LootItem::Resource {
            resource: slot.resource.to_string(),
            quantity: slot.quantity,
            rarity: slot.rarity,
        })
        .collect();

    items.push(LootItem::Credits {
        amount: rng.gen_range(tpl.credits.0..=tpl.credits.1),
    });
    if rng.gen::<f32>() < tpl.buff_chance {
        if let Some(buff) = BUFFS.choose(rng) {
            items.push(LootItem::Buff { buff: *buff });
        }
    }
    if rng.gen::<f32>() < tpl.component_chance {
        if let Some(component) = ComponentType::ALL.choose(rng) {
            items.push(LootItem::Component {
                component: *component,
            });
        }
    }
    if rng.gen::<f32>() < tpl.relic_chance {
        items.push(LootItem::Relic {
            relic: faction_relic(faction),
        });
    }
    merge(items)
}

/// Loot for a destroyed NPC of a known archetype.
pub fn generate_for<R: Rng + ?Sized>(npc_type: NpcType, rng: &mut R) -> Vec<LootItem> {
    generate(npc_type.faction(), archetype::stats(npc_type).tier, rng)
}

/// Folds repeated resources into one entry per name and all credits into a
/// single entry. The first occurrence fixes an entry's place and rarity;
/// everything else keeps its order.
pub fn merge(items: impl IntoIterator<Item = LootItem>) -> Vec<LootItem> {
    let mut merged: Vec<LootItem> = Vec::new();
    let mut resources: HashMap<String, usize> = HashMap::new();
    let mut credits_at: Option<usize> = None;

    for item in items {
        match item {
            LootItem::Resource {
                resource,
                quantity,
                rarity,
            } => match resources.get(&resource).copied() {
                Some(idx) => {
                    if let LootItem::Resource { quantity: total, .. } = &mut merged[idx] {
                        *total += quantity;
                    }
                }
                None => {
                    resources.insert(resource.clone(), merged.len());
                    merged.push(LootItem::Resource {
                        resource,
                        quantity,
                        rarity,
                    });
                }
            },
            LootItem::Credits { amount } => match credits_at {
                Some(idx) => {
                    if let LootItem::Credits { amount: total } = &mut merged[idx] {
                        *total += amount;
                    }
                }
                None => {
                    credits_at = Some(merged.len());
                    merged.push(LootItem::Credits { amount });
                }
            },
            other => merged.push(other),
        }
    }
    merged
}

/// Wreckage radius scales with how much is inside.
pub fn wreckage_size(items: &[LootItem]) -> f32 {
    20.0 + 4.0 * items.len() as f32
}
