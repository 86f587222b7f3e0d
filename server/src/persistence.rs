//! Ship and inventory storage seam.
//!
//! The simulation only ever reads a ship when a player joins and writes
//! credits and inventory deltas as they happen. Each call stands alone; no
//! caller assumes two calls are applied together.

use log::debug;
use shared::PlayerId;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct ShipRecord {
    pub hull: f32,
    pub shield: f32,
    pub weapon_tier: u8,
    pub engine_tier: u8,
    pub shield_tier: u8,
    pub credits: u64,
}

impl Default for ShipRecord {
    fn default() -> Self {
        Self {
            hull: 100.0,
            shield: 50.0,
            weapon_tier: 1,
            engine_tier: 1,
            shield_tier: 1,
            credits: 0,
        }
    }
}

pub trait ShipStore: Send + Sync {
    fn get_ship(&self, player: PlayerId) -> Option<ShipRecord>;
    fn update_credits(&self, player: PlayerId, new_total: u64);
    fn upsert_inventory(&self, player: PlayerId, resource: &str, delta: i64);
}

/// Process-local store. Backs the default server and the tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ships: Mutex<HashMap<PlayerId, ShipRecord>>,
    inventory: Mutex<HashMap<(PlayerId, String), i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ship(&self, player: PlayerId, record: ShipRecord) {
        let mut ships = self.ships.lock().unwrap_or_else(|e| e.into_inner());
        ships.insert(player, record);
    }

    pub fn credits(&self, player: PlayerId) -> u64 {
        let ships = self.ships.lock().unwrap_or_else(|e| e.into_inner());
        ships.get(&player).map(|s| s.credits).unwrap_or(0)
    }

    pub fn inventory(&self, player: PlayerId, resource: &str) -> i64 {
        let inventory = self.inventory.lock().unwrap_or_else(|e| e.into_inner());
        inventory
            .get(&(player, resource.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl ShipStore for MemoryStore {
    /// Unknown pilots get a fresh starter ship.
    fn get_ship(&self, player: PlayerId) -> Option<ShipRecord> {
        let mut ships = self.ships.lock().unwrap_or_else(|e| e.into_inner());
        Some(ships.entry(player).or_default().clone())
    }

    fn update_credits(&self, player: PlayerId, new_total: u64) {
        let mut ships = self.ships.lock().unwrap_or_else(|e| e.into_inner());
        ships.entry(player).or_default().credits = new_total;
        debug!("Player {} credits now {}", player, new_total);
    }

    fn upsert_inventory(&self, player: PlayerId, resource: &str, delta: i64) {
        let mut inventory = self.inventory.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inventory.entry((player, resource.to_string())).or_insert(0);
        *entry = (*entry + delta).max(0);
    }
}
