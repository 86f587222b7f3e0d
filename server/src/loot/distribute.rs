//! Splitting a collected wreckage among its recipients.
//!
//! Recipients are the collector plus every distinct damage contributor
//! frozen into the wreckage. Credits follow the kill-credit multiplier table;
//! common and uncommon resources are divided evenly with the remainder going
//! to the collector; anything rarer, and every non-resource item, stays with
//! the collector.

use crate::combat::team_credit;
use crate::config::TeamMultipliers;
use shared::{LootItem, PlayerId};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payout {
    pub player: PlayerId,
    pub credits: u64,
    pub items: Vec<LootItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub collector: PlayerId,
    /// Collector first, then contributors in ledger order.
    pub recipients: Vec<PlayerId>,
    pub multiplier: f32,
    pub total_credits: u64,
    pub payouts: Vec<Payout>,
    /// Everything that was in the wreckage, for notifications.
    pub found: Vec<LootItem>,
}

impl Distribution {
    pub fn payout(&self, player: PlayerId) -> Option<&Payout> {
        self.payouts.iter().find(|p| p.player == player)
    }

    pub fn credits_paid(&self) -> u64 {
        self.payouts.iter().map(|p| p.credits).sum()
    }
}

pub fn distribute(
    items: &[LootItem],
    collector: PlayerId,
    contributors: Option<&[PlayerId]>,
    table: &TeamMultipliers,
) -> Distribution {
    let mut recipients = vec![collector];
    for id in contributors.unwrap_or_default() {
        if !recipients.contains(id) {
            recipients.push(*id);
        }
    }
    let n = recipients.len() as u32;

    let base_credits: u64 = items
        .iter()
        .map(|item| match item {
            LootItem::Credits { amount } => *amount,
            _ => 0,
        })
        .sum();
    let credit = team_credit(recipients.clone(), base_credits, table);

    let mut payouts: Vec<Payout> = credit
        .shares
        .iter()
        .map(|(player, credits)| Payout {
            player: *player,
            credits: *credits,
            items: Vec::new(),
        })
        .collect();

    for item in items {
        match item {
            LootItem::Credits { .. } => {}
            LootItem::Resource {
                resource,
                quantity,
                rarity,
            } if rarity.is_shared() => {
                let share = quantity / n;
                let remainder = quantity - share * n;
                for (idx, payout) in payouts.iter_mut().enumerate() {
                    let amount = if idx == 0 { share + remainder } else { share };
                    if amount > 0 {
                        payout.items.push(LootItem::Resource {
                            resource: resource.clone(),
                            quantity: amount,
                            rarity: *rarity,
                        });
                    }
                }
            }
            other => {
                if let Some(payout) = payouts.first_mut() {
                    payout.items.push(other.clone());
                }
            }
        }
    }

    Distribution {
        collector,
        recipients,
        multiplier: credit.multiplier,
        total_credits: credit.total,
        payouts,
        found: items.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BuffType, Rarity, RelicType};

    fn resource(name: &str, quantity: u32, rarity: Rarity) -> LootItem {
        LootItem::Resource {
            resource: name.to_string(),
            quantity,
            rarity,
        }
    }

    fn quantity_of(payout: &Payout, name: &str) -> u32 {
        payout
            .items
            .iter()
            .map(|item| match item {
                LootItem::Resource {
                    resource, quantity, ..
                } if resource == name => *quantity,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_solo_collector_gets_everything() {
        let items = vec![
            resource("iron", 5, Rarity::Common),
            resource("platinum", 2, Rarity::Rare),
            LootItem::Credits { amount: 40 },
        ];
        let d = distribute(&items, 7, None, &TeamMultipliers::default());
        assert_eq!(d.recipients, vec![7]);
        assert_eq!(d.credits_paid(), 40);
        let payout = d.payout(7).unwrap();
        assert_eq!(quantity_of(payout, "iron"), 5);
        assert_eq!(quantity_of(payout, "platinum"), 2);
    }

    #[test]
    fn test_common_split_with_remainder_to_collector() {
        let items = vec![resource("iron", 7, Rarity::Common)];
        let contributors = [2, 3];
        let d = distribute(&items, 1, Some(&contributors[..]), &TeamMultipliers::default());

        assert_eq!(d.recipients, vec![1, 2, 3]);
        assert_eq!(quantity_of(d.payout(1).unwrap(), "iron"), 3);
        assert_eq!(quantity_of(d.payout(2).unwrap(), "iron"), 2);
        assert_eq!(quantity_of(d.payout(3).unwrap(), "iron"), 2);
    }

    #[test]
    fn test_rare_and_items_go_to_collector_only() {
        let items = vec![
            resource("dark_matter", 1, Rarity::UltraRare),
            resource("platinum", 4, Rarity::Rare),
            LootItem::Buff {
                buff: BuffType::ScrapPact,
            },
            LootItem::Relic {
                relic: RelicType::PirateSigil,
            },
        ];
        let contributors = [1, 5];
        let d = distribute(&items, 5, Some(&contributors[..]), &TeamMultipliers::default());

        assert_eq!(d.recipients, vec![5, 1]);
        assert_eq!(d.payout(5).unwrap().items.len(), 4);
        assert!(d.payout(1).unwrap().items.is_empty());
        assert_eq!(d.found.len(), 4);
    }

    #[test]
    fn test_credits_use_team_multiplier() {
        let table = TeamMultipliers::default();
        let items = vec![LootItem::Credits { amount: 101 }];
        let contributors = [1, 2, 3];
        let d = distribute(&items, 1, Some(&contributors[..]), &table);

        let expected = (101.0 * table.for_count(3) as f64).round() as u64;
        assert_eq!(d.total_credits, expected);
        assert_eq!(d.credits_paid(), expected);
        let collector = d.payout(1).unwrap().credits;
        assert!(d.payouts.iter().all(|p| p.credits <= collector));
    }

    #[test]
    fn test_small_stacks_skip_empty_shares() {
        let items = vec![resource("copper", 1, Rarity::Uncommon)];
        let contributors = [2, 3];
        let d = distribute(&items, 1, Some(&contributors[..]), &TeamMultipliers::default());
        assert_eq!(quantity_of(d.payout(1).unwrap(), "copper"), 1);
        assert!(d.payout(2).unwrap().items.is_empty());
    }
}
