//! Owner of every live NPC, faction base and wreckage record.
//!
//! The registry is plain CRUD plus the bookkeeping that must stay consistent
//! with it (spatial membership, base children, collection locks). It never
//! emits network events; operations return structured results that the tick
//! driver turns into broadcasts. Destructive operations tolerate absent ids.

use crate::combat::{self, KillCredit};
use crate::config::SimConfig;
use crate::entity::{FactionBase, Npc, Wreckage};
use crate::behavior::WreckageView;
use crate::spatial::SpatialIndex;
use log::{debug, info};
use shared::{EntityId, Faction, LootItem, NpcType, ObjectId, PlayerId, Vec2};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("wreckage {0} does not exist")]
    NotFound(EntityId),
    #[error("wreckage {id} is already being collected by player {by}")]
    AlreadyBeingCollected { id: EntityId, by: PlayerId },
}

/// Spawn inputs beyond archetype and position.
#[derive(Debug, Clone, Default)]
pub struct SpawnContext {
    pub now: f64,
    pub home: Option<ObjectId>,
    /// Replacement spawns (transformations) ignore the sector cap.
    pub ignore_cap: bool,
}

/// Result of damaging an NPC or base.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    pub hull: f32,
    pub shield: f32,
    pub shield_damage: f32,
    pub hull_damage: f32,
    pub destroyed: bool,
    /// Filled only on the destroying hit.
    pub credit: Option<KillCredit>,
}

impl DamageOutcome {
    pub fn participants(&self) -> &[PlayerId] {
        self.credit
            .as_ref()
            .map(|c| c.participants.as_slice())
            .unwrap_or(&[])
    }

    pub fn credits_per_player(&self) -> u64 {
        self.credit.as_ref().map(|c| c.per_player).unwrap_or(0)
    }
}

/// How a damage application should be split.
#[derive(Debug, Clone, Copy)]
pub struct DamageSpec {
    pub amount: f32,
    pub attacker: PlayerId,
    pub piercing: f32,
}

pub struct EntityRegistry {
    npcs: HashMap<EntityId, Npc>,
    bases: HashMap<ObjectId, FactionBase>,
    wreckage: HashMap<EntityId, Wreckage>,
    npc_index: SpatialIndex<EntityId>,
    wreckage_index: SpatialIndex<EntityId>,
    base_index: SpatialIndex<EntityId>,
    base_keys: HashMap<EntityId, ObjectId>,
    next_id: EntityId,
    sector_cap: usize,
}

impl EntityRegistry {
    pub fn new(cell_size: f32, sector_cap: usize) -> Self {
        Self {
            npcs: HashMap::new(),
            bases: HashMap::new(),
            wreckage: HashMap::new(),
            npc_index: SpatialIndex::new(cell_size),
            wreckage_index: SpatialIndex::new(cell_size),
            base_index: SpatialIndex::new(cell_size),
            base_keys: HashMap::new(),
            next_id: 1,
            sector_cap,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.cell_size, config.sector_cap)
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- NPCs ----

    /// Creates an NPC. Returns `None` when its sector is already full.
    pub fn spawn(
        &mut self,
        npc_type: NpcType,
        position: Vec2,
        context: SpawnContext,
    ) -> Option<EntityId> {
        let cell = self.npc_index.cell_of(position);
        if !context.ignore_cap && self.npc_index.count_in_cell(cell) >= self.sector_cap {
            debug!("Sector {:?} full, not spawning {}", cell, npc_type);
            return None;
        }

        let id = self.allocate_id();
        let mut npc = Npc::new(id, npc_type, position, context.now);
        if let Some(home_id) = context.home {
            if let Some(base) = self.bases.get_mut(&home_id) {
                base.children.push(id);
                npc.home_position = base.position;
            }
            npc.home = Some(home_id);
        }

        self.npc_index.update(id, position);
        self.npcs.insert(id, npc);
        debug!("Spawned {} {} at ({:.0}, {:.0})", npc_type, id, position.x, position.y);
        Some(id)
    }

    pub fn npc(&self, id: EntityId) -> Option<&Npc> {
        self.npcs.get(&id)
    }

    pub fn npc_mut(&mut self, id: EntityId) -> Option<&mut Npc> {
        self.npcs.get_mut(&id)
    }

    /// Live NPC ids in ascending order.
    pub fn npc_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.npcs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    /// Re-files an NPC after it moved. Cheap when it stayed in its cell.
    pub fn reindex_npc(&mut self, id: EntityId) {
        if let Some(npc) = self.npcs.get(&id) {
            self.npc_index.update(id, npc.position);
        }
    }

    pub fn npcs_near(&self, position: Vec2, radius: f32) -> Vec<EntityId> {
        let limit = radius * radius;
        let mut ids: Vec<EntityId> = self
            .npc_index
            .candidates_near(position)
            .into_iter()
            .filter(|id| {
                self.npcs
                    .get(id)
                    .map(|n| !n.destroyed && n.position.distance_squared(position) <= limit)
                    .unwrap_or(false)
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Same-faction NPCs within `radius` of `id`, excluding `id` itself.
    pub fn allies_within(&self, id: EntityId, radius: f32) -> Vec<EntityId> {
        let Some(npc) = self.npcs.get(&id) else {
            return Vec::new();
        };
        let faction = npc.faction;
        self.npcs_near(npc.position, radius)
            .into_iter()
            .filter(|other| *other != id)
            .filter(|other| self.npcs.get(other).map(|n| n.faction) == Some(faction))
            .collect()
    }

    /// Applies damage from a player. `None` for unknown or already
    /// destroyed NPCs; the destroying hit is reported exactly once.
    pub fn damage(
        &mut self,
        id: EntityId,
        spec: DamageSpec,
        config: &SimConfig,
    ) -> Option<DamageOutcome> {
        let npc = self.npcs.get_mut(&id)?;
        if npc.destroyed {
            return None;
        }

        let split = combat::split_damage(
            spec.amount,
            npc.shield,
            spec.piercing,
            config.shield_absorption,
        );
        let (hull, shield) = combat::apply_split(npc.hull, npc.shield, split);
        npc.hull = hull;
        npc.shield = shield;
        npc.ledger.record(spec.attacker, spec.amount);

        let mut outcome = DamageOutcome {
            hull,
            shield,
            shield_damage: split.shield_damage,
            hull_damage: split.hull_damage,
            destroyed: false,
            credit: None,
        };
        if hull <= 0.0 {
            npc.destroyed = true;
            outcome.destroyed = true;
            outcome.credit = Some(combat::credit_from_ledger(
                &npc.ledger,
                npc.stats().credits,
                &config.team_multipliers,
            ));
            info!(
                "{} {} destroyed by {} contributor(s)",
                npc.npc_type,
                id,
                npc.ledger.len()
            );
        }
        Some(outcome)
    }

    /// Removes an NPC. Safe to call for ids that are already gone.
    pub fn remove(&mut self, id: EntityId) -> Option<Npc> {
        let npc = self.npcs.remove(&id)?;
        self.npc_index.remove(id);
        if let Some(home) = npc.home.as_ref() {
            if let Some(base) = self.bases.get_mut(home) {
                base.children.retain(|child| *child != id);
            }
        }
        Some(npc)
    }

    /// Replaces an NPC with a stronger archetype that keeps its cargo and
    /// home. The old id is retired. Returns the new id.
    pub fn transform(&mut self, id: EntityId, into: NpcType, now: f64) -> Option<EntityId> {
        let old = self.npcs.get(&id)?;
        if old.destroyed {
            return None;
        }
        let position = old.position;
        let context = SpawnContext {
            now,
            home: old.home.clone(),
            ignore_cap: true,
        };
        let old = self.remove(id)?;
        let new_id = self.spawn(into, position, context)?;
        if let Some(npc) = self.npcs.get_mut(&new_id) {
            npc.locals.cargo = old.locals.cargo;
            npc.home_position = old.home_position;
            npc.rotation = old.rotation;
            npc.locals.scale = crate::behavior::scavenger::growth_scale(npc.locals.cargo.len());
        }
        info!("{} {} became {} {}", old.npc_type, id, into, new_id);
        Some(new_id)
    }

    /// Moves an NPC's cargo into its home base's scrap pile.
    /// Returns the base and the number of items deposited.
    pub fn deposit_cargo(&mut self, id: EntityId) -> Option<(ObjectId, usize)> {
        let npc = self.npcs.get_mut(&id)?;
        let cargo = std::mem::take(&mut npc.locals.cargo);
        let home = npc.home.clone()?;
        let base = self.bases.get_mut(&home).filter(|b| !b.destroyed)?;
        base.scrap_pile += cargo.len() as u32;
        Some((home, cargo.len()))
    }

    // ---- Bases ----

    /// Registers a base from world generation if it isn't known yet.
    pub fn ensure_base(&mut self, id: &str, faction: Faction, position: Vec2) -> bool {
        if self.bases.contains_key(id) {
            return false;
        }
        self.bases
            .insert(id.to_string(), FactionBase::new(id.to_string(), faction, position));
        // Bases are never dropped short of `clear`, so the count is a fresh key.
        let key = self.base_keys.len() as EntityId;
        self.base_index.update(key, position);
        self.base_keys.insert(key, id.to_string());
        true
    }

    /// Bases within `radius` of `position`, destroyed ones included.
    pub fn bases_near(&self, position: Vec2, radius: f32) -> Vec<ObjectId> {
        let limit = radius * radius;
        let mut ids: Vec<ObjectId> = self
            .base_index
            .candidates_within(position, radius)
            .into_iter()
            .filter_map(|key| self.base_keys.get(&key))
            .filter(|id| {
                self.bases
                    .get(id.as_str())
                    .is_some_and(|b| b.position.distance_squared(position) <= limit)
            })
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn base(&self, id: &str) -> Option<&FactionBase> {
        self.bases.get(id)
    }

    pub fn base_mut(&mut self, id: &str) -> Option<&mut FactionBase> {
        self.bases.get_mut(id)
    }

    pub fn base_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.bases.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Damages an active, standing base. Destroyed or dormant bases are
    /// untouchable and yield `None`.
    pub fn damage_base(
        &mut self,
        id: &str,
        spec: DamageSpec,
        base_credits: u64,
        config: &SimConfig,
    ) -> Option<DamageOutcome> {
        let base = self.bases.get_mut(id)?;
        if !base.is_vulnerable() {
            return None;
        }
        let amount = spec.amount.max(0.0);
        base.health = (base.health - amount).max(0.0);
        base.ledger.record(spec.attacker, amount);

        let mut outcome = DamageOutcome {
            hull: base.health,
            shield: 0.0,
            shield_damage: 0.0,
            hull_damage: amount,
            destroyed: false,
            credit: None,
        };
        if base.health <= 0.0 {
            base.destroyed = true;
            base.active = false;
            base.respawn_at = None;
            outcome.destroyed = true;
            outcome.credit = Some(combat::credit_from_ledger(
                &base.ledger,
                base_credits,
                &config.team_multipliers,
            ));
            info!("Base {} destroyed", id);
        }
        Some(outcome)
    }

    // ---- Wreckage ----

    #[allow(clippy::too_many_arguments)]
    pub fn spawn_wreckage(
        &mut self,
        position: Vec2,
        faction: Faction,
        size: f32,
        items: Vec<LootItem>,
        contributors: Option<Vec<PlayerId>>,
        now: f64,
        ttl: f64,
    ) -> EntityId {
        let id = self.allocate_id();
        self.wreckage.insert(
            id,
            Wreckage {
                id,
                position,
                size,
                faction,
                items,
                contributors,
                collector: None,
                collect_started_at: None,
                progress: 0.0,
                spawned_at: now,
                despawn_at: now + ttl,
            },
        );
        self.wreckage_index.update(id, position);
        id
    }

    pub fn wreckage(&self, id: EntityId) -> Option<&Wreckage> {
        self.wreckage.get(&id)
    }

    pub fn wreckage_mut(&mut self, id: EntityId) -> Option<&mut Wreckage> {
        self.wreckage.get_mut(&id)
    }

    pub fn wreckage_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.wreckage.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn wreckage_count(&self) -> usize {
        self.wreckage.len()
    }

    pub fn wreckage_views_near(&self, position: Vec2, radius: f32) -> Vec<WreckageView> {
        let limit = radius * radius;
        let mut views: Vec<WreckageView> = self
            .wreckage_index
            .candidates_near(position)
            .into_iter()
            .filter_map(|id| self.wreckage.get(&id))
            .filter(|w| w.position.distance_squared(position) <= limit)
            .map(|w| WreckageView {
                id: w.id,
                position: w.position,
                collector: w.collector,
            })
            .collect();
        views.sort_unstable_by_key(|w| w.id);
        views
    }

    /// Takes the single collector lock on a wreckage.
    pub fn start_collect(
        &mut self,
        id: EntityId,
        player: PlayerId,
        now: f64,
    ) -> Result<(), CollectError> {
        let wreckage = self.wreckage.get_mut(&id).ok_or(CollectError::NotFound(id))?;
        match wreckage.collector {
            Some(by) if by != player => Err(CollectError::AlreadyBeingCollected { id, by }),
            Some(_) => Ok(()),
            None => {
                wreckage.collector = Some(player);
                wreckage.collect_started_at = Some(now);
                wreckage.progress = 0.0;
                Ok(())
            }
        }
    }

    /// Releases `player`'s lock. Returns whether anything changed; absent
    /// wreckage or a lock held by nobody/someone else is a no-op.
    pub fn cancel_collection(&mut self, id: EntityId, player: PlayerId) -> bool {
        match self.wreckage.get_mut(&id) {
            Some(w) if w.collector == Some(player) => {
                w.collector = None;
                w.collect_started_at = None;
                w.progress = 0.0;
                true
            }
            _ => false,
        }
    }

    /// Removes a wreckage from the world and hands back its record.
    pub fn take_wreckage(&mut self, id: EntityId) -> Option<Wreckage> {
        let wreckage = self.wreckage.remove(&id)?;
        self.wreckage_index.remove(id);
        Some(wreckage)
    }

    /// Removes every wreckage past its TTL, collected or not.
    pub fn expire_wreckage(&mut self, now: f64) -> Vec<Wreckage> {
        let expired: Vec<EntityId> = self
            .wreckage
            .values()
            .filter(|w| w.is_expired(now))
            .map(|w| w.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.take_wreckage(id))
            .collect()
    }

    /// Drops everything. Used on simulation stop.
    pub fn clear(&mut self) {
        self.npcs.clear();
        self.bases.clear();
        self.wreckage.clear();
        self.npc_index.clear();
        self.wreckage_index.clear();
        self.base_index.clear();
        self.base_keys.clear();
    }
}
