//! Wire protocol and value types shared by the simulation server and its clients.
//!
//! Everything here is plain data: ids, positions, faction and archetype tags,
//! loot items, snapshot payloads and the [`Packet`] enum carried over UDP.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

pub const PROTOCOL_VERSION: u32 = 1;

/// Connection and player identifier assigned by the server.
pub type PlayerId = u32;
/// Identifier for NPCs and wreckage.
pub type EntityId = u64;
/// Identifier of a static world object (bases, asteroids, hazards).
pub type ObjectId = String;

/// A position or direction in the 2D world plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_angle(radians: f32) -> Self {
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    pub fn distance_squared(&self, other: Vec2) -> f32 {
        let d = *self - other;
        d.x * d.x + d.y * d.y
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalize(&self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Pirate,
    Scavenger,
    Swarm,
    Void,
}

impl Faction {
    pub const ALL: [Faction; 4] = [
        Faction::Pirate,
        Faction::Scavenger,
        Faction::Swarm,
        Faction::Void,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Pirate => "pirate",
            Faction::Scavenger => "scavenger",
            Faction::Swarm => "swarm",
            Faction::Void => "void",
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every NPC archetype in the game. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcType {
    PirateScout,
    PirateFighter,
    PirateCaptain,
    PirateDreadnought,
    ScavengerScrapper,
    ScavengerHoarder,
    ScavengerBarnacleKing,
    SwarmDrone,
    SwarmWarrior,
    SwarmQueen,
    VoidWisp,
    VoidStalker,
    VoidLeviathan,
}

impl NpcType {
    pub const ALL: [NpcType; 13] = [
        NpcType::PirateScout,
        NpcType::PirateFighter,
        NpcType::PirateCaptain,
        NpcType::PirateDreadnought,
        NpcType::ScavengerScrapper,
        NpcType::ScavengerHoarder,
        NpcType::ScavengerBarnacleKing,
        NpcType::SwarmDrone,
        NpcType::SwarmWarrior,
        NpcType::SwarmQueen,
        NpcType::VoidWisp,
        NpcType::VoidStalker,
        NpcType::VoidLeviathan,
    ];

    pub fn faction(&self) -> Faction {
        match self {
            NpcType::PirateScout
            | NpcType::PirateFighter
            | NpcType::PirateCaptain
            | NpcType::PirateDreadnought => Faction::Pirate,
            NpcType::ScavengerScrapper
            | NpcType::ScavengerHoarder
            | NpcType::ScavengerBarnacleKing => Faction::Scavenger,
            NpcType::SwarmDrone | NpcType::SwarmWarrior | NpcType::SwarmQueen => Faction::Swarm,
            NpcType::VoidWisp | NpcType::VoidStalker | NpcType::VoidLeviathan => Faction::Void,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NpcType::PirateScout => "pirate_scout",
            NpcType::PirateFighter => "pirate_fighter",
            NpcType::PirateCaptain => "pirate_captain",
            NpcType::PirateDreadnought => "pirate_dreadnought",
            NpcType::ScavengerScrapper => "scavenger_scrapper",
            NpcType::ScavengerHoarder => "scavenger_hoarder",
            NpcType::ScavengerBarnacleKing => "scavenger_barnacle_king",
            NpcType::SwarmDrone => "swarm_drone",
            NpcType::SwarmWarrior => "swarm_warrior",
            NpcType::SwarmQueen => "swarm_queen",
            NpcType::VoidWisp => "void_wisp",
            NpcType::VoidStalker => "void_stalker",
            NpcType::VoidLeviathan => "void_leviathan",
        }
    }

    pub fn parse(name: &str) -> Option<NpcType> {
        NpcType::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for NpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    UltraRare,
}

impl Rarity {
    pub const ALL: [Rarity; 4] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::UltraRare,
    ];

    /// Common and uncommon resources are shared among the team on collection.
    pub fn is_shared(&self) -> bool {
        matches!(self, Rarity::Common | Rarity::Uncommon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffType {
    ShieldBoost,
    SpeedBoost,
    DamageBoost,
    ScrapPact,
}

impl BuffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuffType::ShieldBoost => "shield_boost",
            BuffType::SpeedBoost => "speed_boost",
            BuffType::DamageBoost => "damage_boost",
            BuffType::ScrapPact => "scrap_pact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    EngineCoil,
    ShieldCell,
    TargetingArray,
}

impl ComponentType {
    pub const ALL: [ComponentType; 3] = [
        ComponentType::EngineCoil,
        ComponentType::ShieldCell,
        ComponentType::TargetingArray,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::EngineCoil => "engine_coil",
            ComponentType::ShieldCell => "shield_cell",
            ComponentType::TargetingArray => "targeting_array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelicType {
    PirateSigil,
    AncientStarMap,
    VoidHeart,
    HiveMindFragment,
}

impl RelicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelicType::PirateSigil => "pirate_sigil",
            RelicType::AncientStarMap => "ancient_star_map",
            RelicType::VoidHeart => "void_heart",
            RelicType::HiveMindFragment => "hive_mind_fragment",
        }
    }
}

/// One entry in a wreckage's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootItem {
    Resource {
        resource: String,
        quantity: u32,
        rarity: Rarity,
    },
    Credits {
        amount: u64,
    },
    Component {
        component: ComponentType,
    },
    Relic {
        relic: RelicType,
    },
    Buff {
        buff: BuffType,
    },
}

/// Minimal NPC fields a renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSnapshot {
    pub id: EntityId,
    pub npc_type: NpcType,
    pub faction: Faction,
    pub position: Vec2,
    pub rotation: f32,
    pub hull: f32,
    pub hull_max: f32,
    pub shield: f32,
    pub shield_max: f32,
    pub state: String,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WreckageSnapshot {
    pub id: EntityId,
    pub faction: Faction,
    pub position: Vec2,
    pub size: f32,
    pub item_count: usize,
    pub despawn_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub id: ObjectId,
    pub faction: Faction,
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub active: bool,
    pub destroyed: bool,
}

/// Events pushed from the server. Fire-and-forget, at-most-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    NpcSpawn(NpcSnapshot),
    NpcUpdate(NpcSnapshot),
    NpcDestroyed {
        id: EntityId,
        faction: Faction,
        position: Vec2,
        cause: String,
        participants: Vec<PlayerId>,
        credits_per_player: u64,
    },
    NpcFire {
        npc_id: EntityId,
        faction: Faction,
        from: Vec2,
        target: PlayerId,
        to: Vec2,
        hit: bool,
        damage: f32,
    },
    Hit {
        attacker: PlayerId,
        target: EntityId,
        position: Vec2,
        hit: bool,
        damage: f32,
        hull: f32,
        shield: f32,
    },
    BaseHit {
        attacker: PlayerId,
        base: ObjectId,
        position: Vec2,
        damage: f32,
        health: f32,
    },
    WreckageSpawn(WreckageSnapshot),
    WreckageCollectStarted {
        id: EntityId,
        collector: PlayerId,
    },
    WreckageCollected {
        id: EntityId,
        position: Vec2,
        collector: PlayerId,
        items: Vec<LootItem>,
    },
    WreckageDespawn {
        id: EntityId,
        position: Vec2,
    },
    LootNotification {
        wreckage_id: EntityId,
        collector: PlayerId,
        credits: u64,
        items: Vec<LootItem>,
    },
    BaseUpdate(BaseSnapshot),
    BaseDestroyed {
        id: ObjectId,
        faction: Faction,
        position: Vec2,
        participants: Vec<PlayerId>,
        credits_per_player: u64,
    },
    PlayerDebuff {
        player: PlayerId,
        kind: String,
        magnitude: f32,
        expires_at: f64,
    },
    PlayerDestroyed {
        player: PlayerId,
        position: Vec2,
    },
    MiningComplete {
        player: PlayerId,
        object_id: ObjectId,
        resource: String,
        quantity: u32,
    },
}

impl ServerEvent {
    /// Channel name the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NpcSpawn(_) => "npc:spawn",
            ServerEvent::NpcUpdate(_) => "npc:update",
            ServerEvent::NpcDestroyed { .. } => "npc:destroyed",
            ServerEvent::NpcFire { .. } => "combat:npcFire",
            ServerEvent::Hit { .. } | ServerEvent::BaseHit { .. } => "combat:hit",
            ServerEvent::WreckageSpawn(_) => "wreckage:spawn",
            ServerEvent::WreckageCollectStarted { .. } => "wreckage:collectStarted",
            ServerEvent::WreckageCollected { .. } => "wreckage:collected",
            ServerEvent::WreckageDespawn { .. } => "wreckage:despawn",
            ServerEvent::LootNotification { .. } => "loot:notification",
            ServerEvent::BaseUpdate(_) => "base:update",
            ServerEvent::BaseDestroyed { .. } => "base:destroyed",
            ServerEvent::PlayerDebuff { .. } => "player:debuff",
            ServerEvent::PlayerDestroyed { .. } => "player:destroyed",
            ServerEvent::MiningComplete { .. } => "mining:complete",
        }
    }

    /// Renders the event as a flat JSON payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Move {
        position: Vec2,
        velocity: Vec2,
        rotation: f32,
    },
    Fire {
        direction: Vec2,
    },
    StartMining {
        object_id: ObjectId,
    },
    StartCollect {
        wreckage_id: EntityId,
    },
    CancelCollect {
        wreckage_id: EntityId,
    },
    Disconnect,

    Connected {
        client_id: PlayerId,
    },
    Event {
        tick: u64,
        event: ServerEvent,
    },
    Rejected {
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec_math() {
        let a = Vec2::new(3.0, 4.0);
        assert_approx_eq!(a.length(), 5.0);
        assert_approx_eq!(a.distance(Vec2::ZERO), 5.0);
        assert_approx_eq!(a.distance_squared(Vec2::ZERO), 25.0);

        let n = a.normalize();
        assert_approx_eq!(n.length(), 1.0);
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);

        let sum = a + Vec2::new(1.0, 1.0) - Vec2::new(0.5, 0.5);
        assert_approx_eq!(sum.x, 3.5);
        assert_approx_eq!((a * 2.0).y, 8.0);
    }

    #[test]
    fn test_from_angle_matches_angle() {
        let v = Vec2::from_angle(1.2);
        assert_approx_eq!(v.angle(), 1.2, 1e-5);
        assert!(!Vec2::new(f32::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_npc_type_faction_and_names() {
        assert_eq!(NpcType::PirateScout.faction(), Faction::Pirate);
        assert_eq!(NpcType::ScavengerHoarder.faction(), Faction::Scavenger);
        assert_eq!(NpcType::SwarmQueen.faction(), Faction::Swarm);
        assert_eq!(NpcType::VoidStalker.faction(), Faction::Void);

        for npc_type in NpcType::ALL {
            assert_eq!(NpcType::parse(npc_type.as_str()), Some(npc_type));
        }
        assert_eq!(NpcType::parse("space_whale"), None);
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&NpcType::ScavengerBarnacleKing).unwrap();
        assert_eq!(json, "\"scavenger_barnacle_king\"");
        let json = serde_json::to_string(&Faction::Void).unwrap();
        assert_eq!(json, "\"void\"");
    }

    #[test]
    fn test_item_kind_names_match_serde() {
        for component in ComponentType::ALL {
            let json = serde_json::to_string(&component).unwrap();
            assert_eq!(json, format!("\"{}\"", component.as_str()));
        }
        let json = serde_json::to_string(&RelicType::HiveMindFragment).unwrap();
        assert_eq!(json, "\"hive_mind_fragment\"");
        let json = serde_json::to_string(&BuffType::ScrapPact).unwrap();
        assert_eq!(json, "\"scrap_pact\"");
    }

    #[test]
    fn test_rarity_sharing() {
        assert!(Rarity::Common.is_shared());
        assert!(Rarity::Uncommon.is_shared());
        assert!(!Rarity::Rare.is_shared());
        assert!(!Rarity::UltraRare.is_shared());
    }

    #[test]
    fn test_event_names() {
        let event = ServerEvent::WreckageDespawn {
            id: 7,
            position: Vec2::ZERO,
        };
        assert_eq!(event.name(), "wreckage:despawn");

        let fire = ServerEvent::NpcFire {
            npc_id: 1,
            faction: Faction::Pirate,
            from: Vec2::ZERO,
            target: 3,
            to: Vec2::new(10.0, 0.0),
            hit: false,
            damage: 0.0,
        };
        assert_eq!(fire.name(), "combat:npcFire");
    }

    #[test]
    fn test_event_json_is_flat() {
        let event = ServerEvent::WreckageCollected {
            id: 9,
            position: Vec2::new(1.0, 2.0),
            collector: 4,
            items: vec![LootItem::Credits { amount: 50 }],
        };
        let json = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let body = &value["wreckage_collected"];
        assert_eq!(body["id"], 9);
        assert_eq!(body["collector"], 4);
        assert_eq!(body["items"][0]["credits"]["amount"], 50);
    }

    #[test]
    fn test_packet_serialization_event() {
        let packet = Packet::Event {
            tick: 42,
            event: ServerEvent::NpcSpawn(NpcSnapshot {
                id: 11,
                npc_type: NpcType::VoidWisp,
                faction: Faction::Void,
                position: Vec2::new(5.0, -5.0),
                rotation: 0.5,
                hull: 90.0,
                hull_max: 90.0,
                shield: 120.0,
                shield_max: 120.0,
                state: "idle".to_string(),
                scale: 1.0,
            }),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Event {
                tick,
                event: ServerEvent::NpcSpawn(snapshot),
            } => {
                assert_eq!(tick, 42);
                assert_eq!(snapshot.id, 11);
                assert_eq!(snapshot.npc_type, NpcType::VoidWisp);
                assert_approx_eq!(snapshot.position.y, -5.0);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_loot() {
        let packet = Packet::Event {
            tick: 1,
            event: ServerEvent::LootNotification {
                wreckage_id: 3,
                collector: 1,
                credits: 20,
                items: vec![
                    LootItem::Resource {
                        resource: "iron".to_string(),
                        quantity: 3,
                        rarity: Rarity::Common,
                    },
                    LootItem::Relic {
                        relic: RelicType::VoidHeart,
                    },
                ],
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Event {
                event: ServerEvent::LootNotification { items, .. },
                ..
            } => {
                assert_eq!(items.len(), 2);
                assert_eq!(
                    items[1],
                    LootItem::Relic {
                        relic: RelicType::VoidHeart
                    }
                );
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
