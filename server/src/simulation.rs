//! The tick driver.
//!
//! [`Simulation`] owns every piece of mutable world state and advances it one
//! step at a time in a fixed order: players, bases, NPCs, mining, loot,
//! hazards, then periodic base broadcasts. Inbound player actions (see
//! `actions.rs`) mutate the same state between steps. Nothing in a step
//! returns an error; faults are logged and the step carries on.

use crate::archetype::{self, LootTier, SpecialAttack};
use crate::behavior::{self, BehaviorContext, HomeView, Intent, PlayerView, SEARCH_RADIUS};
use crate::broadcast::{Broadcaster, Outbound, Outbox};
use crate::combat;
use crate::config::SimConfig;
use crate::entity::BehaviorState;
use crate::loot;
use crate::mining::{self, MiningTracker};
use crate::persistence::{ShipRecord, ShipStore};
use crate::player::PlayerShip;
use crate::registry::{DamageOutcome, EntityRegistry, SpawnContext};
use crate::spatial::Cell;
use crate::world::{Hazard, HazardKind, WorldSource};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::{EntityId, Faction, LootItem, NpcType, PlayerId, ServerEvent, Vec2};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Longest step the integrators will take, in seconds.
const MAX_STEP: f32 = 0.25;
/// How far from its base a fresh NPC appears.
const SPAWN_SPREAD: f32 = 300.0;
/// Ion storm slow lasts this long after leaving the storm.
const ION_LINGER: f64 = 1.0;

pub struct Simulation {
    pub(crate) config: SimConfig,
    pub(crate) registry: EntityRegistry,
    pub(crate) players: HashMap<PlayerId, PlayerShip>,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) mining: MiningTracker,
    pub(crate) outbox: Outbox,
    pub(crate) rng: StdRng,
    pub(crate) store: Arc<dyn ShipStore>,
    pub(crate) world: Arc<dyn WorldSource>,
    known_sectors: HashSet<Cell>,
    hazards: HashMap<Cell, Vec<Hazard>>,
    tick: u64,
    last_step: Option<f64>,
}

impl Simulation {
    pub fn new(config: SimConfig, store: Arc<dyn ShipStore>, world: Arc<dyn WorldSource>) -> Self {
        Self {
            registry: EntityRegistry::from_config(&config),
            broadcaster: Broadcaster::new(&config),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            players: HashMap::new(),
            mining: MiningTracker::default(),
            outbox: Outbox::default(),
            store,
            world,
            known_sectors: HashSet::new(),
            hazards: HashMap::new(),
            tick: 0,
            last_step: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerShip> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerShip> {
        self.players.get_mut(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Brings a player's ship into the world. Returns false if they are
    /// already in it.
    pub fn add_player(&mut self, id: PlayerId) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }
        let record = self.store.get_ship(id).unwrap_or_else(|| {
            warn!("No ship on record for player {}, using a starter ship", id);
            ShipRecord::default()
        });
        let ship = PlayerShip::from_record(id, &record);
        self.broadcaster.update_membership(id, ship.position);
        self.players.insert(id, ship);
        info!("Player {} entered the simulation", id);
        true
    }

    /// Drops a player and everything they had in progress. Unknown ids are a no-op.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let known = self.players.remove(&id).is_some();
        self.broadcaster.remove(id);
        self.mining.cancel(id);
        self.release_collections(id);
        if known {
            info!("Player {} left the simulation", id);
        }
        known
    }

    /// Events queued by action handlers since the last drain.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        self.outbox.drain()
    }

    /// Spawns an NPC outside of any base and announces it.
    pub fn spawn_npc(&mut self, npc_type: NpcType, position: Vec2, now: f64) -> Option<EntityId> {
        let context = SpawnContext {
            now,
            ..SpawnContext::default()
        };
        let id = self.registry.spawn(npc_type, position, context)?;
        self.announce_spawn(id);
        Some(id)
    }

    /// Tears the world down. Players stay connected but everything else is
    /// regenerated lazily on the next step.
    pub fn stop(&mut self) {
        self.registry.clear();
        self.mining.clear();
        self.known_sectors.clear();
        self.hazards.clear();
        self.outbox.drain();
        self.last_step = None;
        info!("Simulation cleared after {} ticks", self.tick);
    }

    /// Advances the world to `now` and returns the addressed events.
    pub fn step(&mut self, now: f64) -> Vec<Outbound> {
        let dt = match self.last_step {
            Some(last) => ((now - last) as f32).clamp(0.0, MAX_STEP),
            None => 0.0,
        };
        self.last_step = Some(now);
        self.tick += 1;

        self.update_players(now, dt);
        self.update_bases(now);
        self.update_npcs(now, dt);
        self.update_mining(now);
        self.update_loot(now);
        self.update_hazards(now, dt);
        self.broadcast_bases();

        let outbound = self.outbox.drain();
        if self.tick % 200 == 0 {
            debug!(
                "Tick {}: {} players, {} npcs, {} wreckage, {} events",
                self.tick,
                self.players.len(),
                self.registry.npc_count(),
                self.registry.wreckage_count(),
                outbound.len()
            );
        }
        outbound
    }

    fn sorted_player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn release_collections(&mut self, player: PlayerId) {
        for id in self.registry.wreckage_ids() {
            if self.registry.cancel_collection(id, player) {
                debug!("Released wreckage {} held by player {}", id, player);
            }
        }
    }

    fn announce_spawn(&mut self, id: EntityId) {
        if let Some(npc) = self.registry.npc(id) {
            let snapshot = npc.snapshot();
            self.outbox
                .near(&self.broadcaster, snapshot.position, ServerEvent::NpcSpawn(snapshot));
        }
    }

    // ---- players ----

    fn update_players(&mut self, now: f64, dt: f32) {
        let mut destroyed = Vec::new();
        for id in self.sorted_player_ids() {
            let Some(ship) = self.players.get_mut(&id) else {
                continue;
            };
            ship.expire_buffs(now);
            let acid = ship.debuffs.tick(now);
            if acid > 0.0 {
                ship.apply_hull_damage(acid);
            }
            ship.regen_shield(now, dt);
            if ship.is_destroyed() {
                destroyed.push((id, ship.position));
                ship.respawn();
            }
        }

        for (id, position) in destroyed {
            info!("Player {} destroyed at ({:.0}, {:.0})", id, position.x, position.y);
            self.outbox.near(
                &self.broadcaster,
                position,
                ServerEvent::PlayerDestroyed {
                    player: id,
                    position,
                },
            );
            self.broadcaster.update_membership(id, Vec2::ZERO);
            self.mining.cancel(id);
            self.release_collections(id);
        }
    }

    // ---- bases ----

    /// Pulls in world objects for every sector next to a player.
    fn discover_sectors(&mut self) {
        let cell_size = self.config.cell_size;
        let mut fresh = Vec::new();
        for ship in self.players.values() {
            for cell in Cell::of(ship.position, cell_size).neighbourhood() {
                if self.known_sectors.insert(cell) {
                    fresh.push(cell);
                }
            }
        }
        fresh.sort_unstable();

        for cell in fresh {
            let objects = self.world.objects_in_sector(cell.x, cell.y);
            for site in objects.bases {
                if self.registry.ensure_base(&site.id, site.faction, site.position) {
                    debug!("Registered {} base {}", site.faction, site.id);
                }
            }
            for hazard in objects.hazards {
                self.hazards
                    .entry(Cell::of(hazard.position, cell_size))
                    .or_default()
                    .push(hazard);
            }
        }
    }

    fn update_bases(&mut self, now: f64) {
        self.discover_sectors();

        let activation = self.config.base_activation_range;

        for base_id in self.registry.base_ids() {
            let mut spawns: Vec<NpcType> = Vec::new();
            let mut defender = None;
            let mut changed = false;
            let Some(base) = self.registry.base_mut(&base_id) else {
                continue;
            };

            if base.destroyed {
                if base.respawn_at.is_some_and(|at| now >= at) {
                    base.health = base.max_health;
                    base.destroyed = false;
                    base.active = false;
                    base.respawn_at = None;
                    base.defender_called = false;
                    base.scrap_pile = 0;
                    base.ledger.clear();
                    info!("Base {} rebuilt", base.id);
                    changed = true;
                }
            } else {
                let near = !self
                    .broadcaster
                    .players_near(base.position, activation)
                    .is_empty();
                if near {
                    base.last_player_near = now;
                    if !base.active {
                        base.active = true;
                        base.activated_at = Some(now);
                        base.next_spawn_at = now;
                        base.defender_called = false;
                        info!("Base {} activated", base.id);
                        changed = true;
                    }
                } else if base.active
                    && now - base.last_player_near >= self.config.base_deactivate_after
                {
                    base.active = false;
                    info!("Base {} went dormant", base.id);
                    changed = true;
                }
            }

            if base.active {
                if now >= base.next_spawn_at && base.children.len() < self.config.base_npc_cap {
                    base.next_spawn_at = now + self.config.spawn_interval;
                    let table = archetype::base_spawn_table(base.faction);
                    match table.choose_weighted(&mut self.rng, |(_, weight)| *weight) {
                        Ok((npc_type, _)) => spawns.push(*npc_type),
                        Err(e) => warn!("Base {} has no usable spawn table: {}", base.id, e),
                    }
                }
                if !base.defender_called && base.health < base.max_health * 0.5 {
                    defender = Some(archetype::base_defender(base.faction));
                }
                if base.faction == Faction::Scavenger && self.config.scrap_threshold > 0 {
                    while base.scrap_pile >= self.config.scrap_threshold {
                        base.scrap_pile -= self.config.scrap_threshold;
                        spawns.push(NpcType::ScavengerHoarder);
                    }
                }
            }

            let origin = base.position;
            let snapshot = base.snapshot();
            if changed {
                self.outbox
                    .near(&self.broadcaster, origin, ServerEvent::BaseUpdate(snapshot));
            }

            for npc_type in spawns {
                self.spawn_near_base(&base_id, origin, npc_type, now);
            }
            if let Some(npc_type) = defender {
                // A refused spawn leaves the call open for a later tick.
                if self.spawn_near_base(&base_id, origin, npc_type, now).is_some() {
                    if let Some(base) = self.registry.base_mut(&base_id) {
                        base.defender_called = true;
                    }
                    info!("Base {} calls in its defender", base_id);
                }
            }
        }
    }

    fn spawn_near_base(
        &mut self,
        base_id: &str,
        origin: Vec2,
        npc_type: NpcType,
        now: f64,
    ) -> Option<EntityId> {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..SPAWN_SPREAD);
        let position = origin + Vec2::from_angle(angle) * distance;
        let context = SpawnContext {
            now,
            home: Some(base_id.to_string()),
            ignore_cap: false,
        };
        let id = self.registry.spawn(npc_type, position, context)?;
        self.announce_spawn(id);
        Some(id)
    }

    fn broadcast_bases(&mut self) {
        let every = self.config.base_broadcast_ticks.max(1);
        if self.tick % every != 0 {
            return;
        }
        for base_id in self.registry.base_ids() {
            if let Some(base) = self.registry.base(&base_id) {
                let snapshot = base.snapshot();
                self.outbox
                    .near(&self.broadcaster, snapshot.position, ServerEvent::BaseUpdate(snapshot));
            }
        }
    }

    // ---- NPCs ----

    fn player_views(&self, position: Vec2, radius: f32, now: f64) -> Vec<PlayerView> {
        self.broadcaster
            .players_near(position, radius.min(self.config.cell_size))
            .into_iter()
            .filter_map(|id| self.players.get(&id))
            .map(|ship| ship.view(now))
            .collect()
    }

    fn update_npcs(&mut self, now: f64, dt: f32) {
        for id in self.registry.npc_ids() {
            // Earlier intents this tick may have removed or replaced it.
            let Some(npc) = self.registry.npc(id) else {
                continue;
            };
            if npc.destroyed {
                continue;
            }
            let strategy = npc.strategy;
            let position = npc.position;
            let stats = npc.stats();
            let sight = (stats.aggro_range * 1.5).max(self.config.rage_clear_radius);
            let players = self.player_views(position, sight, now);
            let wreckage = if npc.faction == Faction::Scavenger {
                self.registry.wreckage_views_near(position, SEARCH_RADIUS)
            } else {
                Vec::new()
            };
            let home = npc
                .home
                .as_deref()
                .and_then(|home| self.registry.base(home))
                .filter(|base| !base.destroyed)
                .map(|base| HomeView {
                    id: base.id.clone(),
                    position: base.position,
                });

            let ctx = BehaviorContext {
                now,
                dt,
                config: &self.config,
                players: &players,
                wreckage: &wreckage,
                home,
            };
            let intent = match self.registry.npc_mut(id) {
                Some(npc) => strategy(npc, &ctx),
                None => None,
            };

            self.registry.reindex_npc(id);
            if let Some(npc) = self.registry.npc(id) {
                let snapshot = npc.snapshot();
                self.outbox
                    .near(&self.broadcaster, snapshot.position, ServerEvent::NpcUpdate(snapshot));
            }
            if let Some(intent) = intent {
                self.apply_intent(id, intent, now);
            }
        }
    }

    fn apply_intent(&mut self, id: EntityId, intent: Intent, now: f64) {
        let Some(npc) = self.registry.npc(id) else {
            return;
        };
        let stats = npc.stats();
        let faction = npc.faction;
        let from = npc.position;

        match intent {
            Intent::Fire { target } => {
                let Some(ship) = self.players.get_mut(&target) else {
                    return;
                };
                let outcome = combat::resolve_npc_fire(
                    archetype::faction_accuracy(faction),
                    stats.damage,
                    stats.weapon_range,
                    from,
                    ship.position,
                    ship.velocity,
                    &self.config,
                    &mut self.rng,
                );
                if outcome.hit {
                    ship.apply_damage(outcome.damage, stats.piercing);
                }
                let to = ship.position;
                self.outbox.near(
                    &self.broadcaster,
                    from,
                    ServerEvent::NpcFire {
                        npc_id: id,
                        faction,
                        from,
                        target,
                        to,
                        hit: outcome.hit,
                        damage: outcome.damage,
                    },
                );
            }
            Intent::Special { target } => {
                let Some(special) = stats.special else {
                    return;
                };
                let Some(ship) = self.players.get_mut(&target) else {
                    return;
                };
                if !combat::within_weapon_range(
                    from,
                    ship.position,
                    stats.weapon_range,
                    self.config.range_tolerance,
                ) {
                    return;
                }
                let event = match special {
                    SpecialAttack::Acid {
                        damage,
                        interval,
                        duration,
                        ..
                    } => {
                        ship.debuffs.apply_dot(damage, interval, now, duration);
                        ServerEvent::PlayerDebuff {
                            player: target,
                            kind: "acid".to_string(),
                            magnitude: damage,
                            expires_at: now + duration,
                        }
                    }
                    SpecialAttack::Slow {
                        percent, duration, ..
                    } => {
                        let slow = ship.debuffs.apply_slow(percent, now, duration);
                        ServerEvent::PlayerDebuff {
                            player: target,
                            kind: "slow".to_string(),
                            magnitude: slow.percent,
                            expires_at: slow.expires_at,
                        }
                    }
                };
                let at = ship.position;
                self.outbox.near(&self.broadcaster, at, event);
            }
            Intent::Enrage { target } => {
                let group = behavior::spread_rage(&mut self.registry, id, target, now, &self.config);
                debug!("NPC {} rage spread to {} NPC(s)", id, group.len());
            }
            Intent::Collect { wreckage } => {
                let free = self
                    .registry
                    .wreckage(wreckage)
                    .is_some_and(|w| w.collector.is_none());
                if !free {
                    if let Some(npc) = self.registry.npc_mut(id) {
                        npc.state = BehaviorState::Idle;
                    }
                    debug!("NPC {} lost wreckage {} to another collector", id, wreckage);
                    return;
                }
                let Some(taken) = self.registry.take_wreckage(wreckage) else {
                    return;
                };
                if let Some(npc) = self.registry.npc_mut(id) {
                    npc.locals.cargo.extend(taken.items);
                }
                self.outbox.near(
                    &self.broadcaster,
                    taken.position,
                    ServerEvent::WreckageDespawn {
                        id: wreckage,
                        position: taken.position,
                    },
                );
            }
            Intent::Deposit => match self.registry.deposit_cargo(id) {
                Some((base, count)) => debug!("NPC {} dumped {} item(s) at {}", id, count, base),
                None => debug!("NPC {} has no standing base, cargo lost", id),
            },
            Intent::Transform { into } => {
                let Some(new_id) = self.registry.transform(id, into, now) else {
                    return;
                };
                self.outbox.near(
                    &self.broadcaster,
                    from,
                    ServerEvent::NpcDestroyed {
                        id,
                        faction,
                        position: from,
                        cause: "transformed".to_string(),
                        participants: Vec::new(),
                        credits_per_player: 0,
                    },
                );
                self.announce_spawn(new_id);
            }
            Intent::Flee { from: threat } => {
                debug!("NPC {} breaking off from player {}", id, threat);
            }
            Intent::Despawn => {
                if self.registry.remove(id).is_some() {
                    self.outbox.near(
                        &self.broadcaster,
                        from,
                        ServerEvent::NpcDestroyed {
                            id,
                            faction,
                            position: from,
                            cause: "despawned".to_string(),
                            participants: Vec::new(),
                            credits_per_player: 0,
                        },
                    );
                }
            }
        }
    }

    // ---- deaths ----

    /// Adds credits to each player's running total and persists it.
    pub(crate) fn pay_credits(&mut self, shares: &[(PlayerId, u64)]) {
        for (player, amount) in shares {
            if *amount == 0 {
                continue;
            }
            let total = match self.players.get_mut(player) {
                Some(ship) => {
                    ship.credits += amount;
                    ship.credits
                }
                None => {
                    let current = self.store.get_ship(*player).map(|s| s.credits).unwrap_or(0);
                    current + amount
                }
            };
            self.store.update_credits(*player, total);
        }
    }

    /// Turns a destroyed NPC into wreckage and pays its kill credit.
    pub(crate) fn handle_npc_death(&mut self, id: EntityId, outcome: &DamageOutcome, now: f64) {
        let Some(npc) = self.registry.remove(id) else {
            return;
        };
        if let Some(credit) = &outcome.credit {
            self.pay_credits(&credit.shares);
        }

        // Stolen cargo goes back into the wreck alongside the drop.
        let dropped = loot::generate_for(npc.npc_type, &mut self.rng);
        let items = loot::merge(dropped.into_iter().chain(npc.locals.cargo));
        let participants = outcome.participants().to_vec();
        let contributors = (!participants.is_empty()).then(|| participants.clone());
        let size = loot::wreckage_size(&items);
        let wreckage_id = self.registry.spawn_wreckage(
            npc.position,
            npc.faction,
            size,
            items,
            contributors,
            now,
            self.config.wreckage_ttl,
        );

        self.outbox.near(
            &self.broadcaster,
            npc.position,
            ServerEvent::NpcDestroyed {
                id,
                faction: npc.faction,
                position: npc.position,
                cause: "destroyed".to_string(),
                participants,
                credits_per_player: outcome.credits_per_player(),
            },
        );
        self.announce_wreckage(wreckage_id);
    }

    pub(crate) fn handle_base_death(&mut self, base_id: &str, outcome: &DamageOutcome, now: f64) {
        let respawn_at = now + self.config.base_respawn;
        let Some(base) = self.registry.base_mut(base_id) else {
            return;
        };
        base.respawn_at = Some(respawn_at);
        let (faction, position) = (base.faction, base.position);

        if let Some(credit) = &outcome.credit {
            self.pay_credits(&credit.shares);
        }
        let items = loot::generate(faction, LootTier::Base, &mut self.rng);
        let participants = outcome.participants().to_vec();
        let contributors = (!participants.is_empty()).then(|| participants.clone());
        let size = loot::wreckage_size(&items);
        let wreckage_id = self.registry.spawn_wreckage(
            position,
            faction,
            size,
            items,
            contributors,
            now,
            self.config.wreckage_ttl,
        );

        self.outbox.near(
            &self.broadcaster,
            position,
            ServerEvent::BaseDestroyed {
                id: base_id.to_string(),
                faction,
                position,
                participants,
                credits_per_player: outcome.credits_per_player(),
            },
        );
        self.announce_wreckage(wreckage_id);
    }

    fn announce_wreckage(&mut self, id: EntityId) {
        if let Some(wreckage) = self.registry.wreckage(id) {
            let snapshot = wreckage.snapshot();
            self.outbox
                .near(&self.broadcaster, snapshot.position, ServerEvent::WreckageSpawn(snapshot));
        }
    }

    // ---- mining ----

    fn update_mining(&mut self, now: f64) {
        for session in self.mining.take_due(now) {
            let Some(ship) = self.players.get(&session.player) else {
                continue;
            };
            let reach = self.config.mining_range + self.config.range_tolerance;
            let in_range = self
                .world
                .object_position(&session.object_id, now)
                .is_some_and(|p| p.distance(ship.position) <= reach);
            if !in_range {
                debug!(
                    "Player {} drifted away from {}, mining cancelled",
                    session.player, session.object_id
                );
                continue;
            }

            let quantity = mining::roll_yield(&mut self.rng);
            self.store
                .upsert_inventory(session.player, &session.resource, quantity as i64);
            self.outbox.to_player(
                session.player,
                ServerEvent::MiningComplete {
                    player: session.player,
                    object_id: session.object_id,
                    resource: session.resource,
                    quantity,
                },
            );
        }
    }

    // ---- loot ----

    fn update_loot(&mut self, now: f64) {
        for wreckage in self.registry.expire_wreckage(now) {
            debug!("Wreckage {} expired", wreckage.id);
            self.outbox.near(
                &self.broadcaster,
                wreckage.position,
                ServerEvent::WreckageDespawn {
                    id: wreckage.id,
                    position: wreckage.position,
                },
            );
        }

        let reach = self.config.collect_range + self.config.range_tolerance;
        for id in self.registry.wreckage_ids() {
            let Some(wreckage) = self.registry.wreckage(id) else {
                continue;
            };
            let (Some(collector), Some(started)) = (wreckage.collector, wreckage.collect_started_at)
            else {
                continue;
            };
            let close = self
                .players
                .get(&collector)
                .is_some_and(|ship| ship.position.distance(wreckage.position) <= reach);
            if !close {
                self.registry.cancel_collection(id, collector);
                debug!("Player {} left wreckage {}, collection cancelled", collector, id);
                continue;
            }

            let duration = self.config.collect_duration.max(f64::EPSILON);
            let progress = ((now - started) / duration).clamp(0.0, 1.0) as f32;
            if let Some(wreckage) = self.registry.wreckage_mut(id) {
                wreckage.progress = progress;
            }
            if progress >= 1.0 {
                self.complete_collection(id, collector, now);
            }
        }
    }

    fn complete_collection(&mut self, id: EntityId, collector: PlayerId, now: f64) {
        let Some(wreckage) = self.registry.take_wreckage(id) else {
            return;
        };
        let distribution = loot::distribute(
            &wreckage.items,
            collector,
            wreckage.contributors.as_deref(),
            &self.config.team_multipliers,
        );

        for payout in &distribution.payouts {
            self.pay_credits(&[(payout.player, payout.credits)]);
            for item in &payout.items {
                match item {
                    LootItem::Resource {
                        resource, quantity, ..
                    } => self
                        .store
                        .upsert_inventory(payout.player, resource, *quantity as i64),
                    LootItem::Component { component } => {
                        self.store
                            .upsert_inventory(payout.player, component.as_str(), 1)
                    }
                    LootItem::Relic { relic } => {
                        self.store.upsert_inventory(payout.player, relic.as_str(), 1)
                    }
                    LootItem::Buff { buff } => {
                        if let Some(ship) = self.players.get_mut(&payout.player) {
                            ship.grant_buff(*buff, now, self.config.buff_duration);
                            debug!("Player {} gained {}", payout.player, buff.as_str());
                        }
                    }
                    LootItem::Credits { .. } => {}
                }
            }
            self.outbox.to_player(
                payout.player,
                ServerEvent::LootNotification {
                    wreckage_id: id,
                    collector,
                    credits: payout.credits,
                    items: distribution.found.clone(),
                },
            );
        }

        info!(
            "Player {} collected wreckage {} ({} recipient(s), {} credits)",
            collector,
            id,
            distribution.recipients.len(),
            distribution.credits_paid()
        );
        self.outbox.near(
            &self.broadcaster,
            wreckage.position,
            ServerEvent::WreckageCollected {
                id,
                position: wreckage.position,
                collector,
                items: distribution.found,
            },
        );
    }

    // ---- hazards ----

    fn update_hazards(&mut self, now: f64, dt: f32) {
        let cell_size = self.config.cell_size;
        let mut slowed = Vec::new();
        for id in self.sorted_player_ids() {
            let Some(ship) = self.players.get_mut(&id) else {
                continue;
            };
            let at = ship.position;
            for cell in Cell::of(at, cell_size).neighbourhood() {
                let Some(hazards) = self.hazards.get(&cell) else {
                    continue;
                };
                for hazard in hazards.iter().filter(|h| h.contains(at)) {
                    match hazard.kind {
                        HazardKind::Radiation => ship.apply_hull_damage(hazard.intensity * dt),
                        HazardKind::Nebula => ship.drain_shield(hazard.intensity * dt),
                        HazardKind::IonStorm => {
                            let was_slowed = ship.debuffs.is_slowed(now);
                            let slow = ship.debuffs.apply_slow(hazard.intensity, now, ION_LINGER);
                            if !was_slowed {
                                slowed.push((id, at, slow));
                            }
                        }
                    }
                }
            }
        }

        for (player, position, slow) in slowed {
            self.outbox.near(
                &self.broadcaster,
                position,
                ServerEvent::PlayerDebuff {
                    player,
                    kind: HazardKind::IonStorm.as_str().to_string(),
                    magnitude: slow.percent,
                    expires_at: slow.expires_at,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::MiningSession;
    use crate::persistence::MemoryStore;
    use crate::registry::DamageSpec;
    use crate::world::{BaseSite, FixedWorld, Mineable};
    use assert_approx_eq::assert_approx_eq;
    use shared::Rarity;

    fn simulation_with(world: FixedWorld) -> (Simulation, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sim = Simulation::new(SimConfig::default(), store.clone(), Arc::new(world));
        (sim, store)
    }

    fn empty_world() -> FixedWorld {
        FixedWorld::new(SimConfig::default().cell_size)
    }

    fn names(outbound: &[Outbound]) -> Vec<&'static str> {
        outbound.iter().map(|o| o.event.name()).collect()
    }

    fn place(sim: &mut Simulation, id: PlayerId, position: Vec2) {
        sim.add_player(id);
        if let Some(ship) = sim.players.get_mut(&id) {
            ship.position = position;
        }
        sim.broadcaster.update_membership(id, position);
    }

    #[test]
    fn test_player_lifecycle() {
        let (mut sim, _) = simulation_with(empty_world());
        assert!(sim.add_player(1));
        assert!(!sim.add_player(1));
        assert_eq!(sim.player_count(), 1);
        assert!(sim.remove_player(1));
        assert!(!sim.remove_player(1));
        assert_eq!(sim.player_count(), 0);
    }

    #[test]
    fn test_stored_ship_is_loaded_and_credited() {
        let (mut sim, store) = simulation_with(empty_world());
        store.insert_ship(
            4,
            ShipRecord {
                hull: 80.0,
                credits: 500,
                ..ShipRecord::default()
            },
        );
        assert!(sim.add_player(4));
        let ship = sim.player(4).unwrap();
        assert_approx_eq!(ship.hull_max, 80.0);
        assert_eq!(ship.credits, 500);

        sim.pay_credits(&[(4, 25)]);
        assert_eq!(store.credits(4), 525);

        // Offline players are paid from their stored record
        sim.remove_player(4);
        sim.pay_credits(&[(4, 5)]);
        assert_eq!(store.credits(4), 530);

        assert!(sim.player_mut(4).is_none());
    }

    #[test]
    fn test_step_counts_ticks() {
        let (mut sim, _) = simulation_with(empty_world());
        sim.step(0.0);
        sim.step(0.05);
        assert_eq!(sim.tick(), 2);
    }

    #[test]
    fn test_base_activates_and_spawns() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.bases.push(BaseSite {
            id: "base_1_0_0".to_string(),
            faction: Faction::Pirate,
            position: Vec2::new(3000.0, 500.0),
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(2100.0, 500.0));

        let outbound = sim.step(0.0);
        let base = sim.registry().base("base_1_0_0").unwrap();
        assert!(base.active);
        assert_eq!(base.children.len(), 1);
        assert_eq!(sim.registry().npc_count(), 1);
        assert!(names(&outbound).contains(&"npc:spawn"));
        assert!(names(&outbound).contains(&"base:update"));

        // Next spawn waits for the interval.
        sim.step(1.0);
        assert_eq!(sim.registry().base("base_1_0_0").unwrap().children.len(), 1);
    }

    #[test]
    fn test_base_goes_dormant_without_players() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.bases.push(BaseSite {
            id: "base_1_0_0".to_string(),
            faction: Faction::Void,
            position: Vec2::new(3000.0, 500.0),
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(2100.0, 500.0));
        sim.step(0.0);

        place(&mut sim, 1, Vec2::new(-1500.0, 500.0));
        sim.step(10.0);
        assert!(sim.registry().base("base_1_0_0").unwrap().active);
        sim.step(10.0 + cfg.base_deactivate_after);
        assert!(!sim.registry().base("base_1_0_0").unwrap().active);
    }

    #[test]
    fn test_scrap_pile_becomes_hoarder() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.bases.push(BaseSite {
            id: "base_1_0_0".to_string(),
            faction: Faction::Scavenger,
            position: Vec2::new(3000.0, 500.0),
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(2100.0, 500.0));
        sim.step(0.0);
        if let Some(base) = sim.registry_mut().base_mut("base_1_0_0") {
            base.scrap_pile = cfg.scrap_threshold;
        }
        sim.step(1.0);

        let base = sim.registry().base("base_1_0_0").unwrap();
        assert_eq!(base.scrap_pile, 0);
        let hoarders = base
            .children
            .iter()
            .filter_map(|id| sim.registry().npc(*id))
            .filter(|npc| npc.npc_type == NpcType::ScavengerHoarder)
            .count();
        assert!(hoarders >= 1);
    }

    #[test]
    fn test_npc_death_leaves_wreckage_and_pays() {
        let (mut sim, store) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(100.0, 0.0));
        let id = sim.spawn_npc(NpcType::SwarmDrone, Vec2::ZERO, 0.0).unwrap();

        let cfg = sim.config().clone();
        let spec = DamageSpec {
            amount: 1000.0,
            attacker: 1,
            piercing: 0.0,
        };
        let outcome = sim.registry_mut().damage(id, spec, &cfg).unwrap();
        assert!(outcome.destroyed);
        sim.handle_npc_death(id, &outcome, 0.0);

        assert!(sim.registry().npc(id).is_none());
        assert_eq!(sim.registry().wreckage_count(), 1);
        let base_credits = archetype::stats(NpcType::SwarmDrone).credits;
        assert_eq!(store.credits(1), base_credits);
        assert_eq!(sim.player(1).unwrap().credits, base_credits);

        let events = sim.drain_outbound();
        let destroyed = events
            .iter()
            .find_map(|o| match &o.event {
                ServerEvent::NpcDestroyed {
                    participants,
                    credits_per_player,
                    ..
                } => Some((participants.clone(), *credits_per_player)),
                _ => None,
            })
            .unwrap();
        assert_eq!(destroyed, (vec![1], base_credits));
        assert!(names(&events).contains(&"wreckage:spawn"));

        // A second death report for the same id changes nothing.
        sim.handle_npc_death(id, &outcome, 0.0);
        assert_eq!(sim.registry().wreckage_count(), 1);
    }

    #[test]
    fn test_collection_splits_among_contributors() {
        let (mut sim, store) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(10.0, 0.0));
        place(&mut sim, 2, Vec2::new(-10.0, 0.0));
        let items = vec![
            LootItem::Credits { amount: 100 },
            LootItem::Resource {
                resource: "iron".to_string(),
                quantity: 5,
                rarity: Rarity::Common,
            },
            LootItem::Resource {
                resource: "platinum".to_string(),
                quantity: 2,
                rarity: Rarity::Rare,
            },
        ];
        let wreckage = sim.registry_mut().spawn_wreckage(
            Vec2::ZERO,
            Faction::Pirate,
            30.0,
            items,
            Some(vec![2]),
            0.0,
            120.0,
        );
        sim.registry_mut().start_collect(wreckage, 1, 0.0).unwrap();

        sim.step(0.0);
        assert!(sim.registry().wreckage(wreckage).is_some());
        let outbound = sim.step(sim.config().collect_duration);
        assert!(sim.registry().wreckage(wreckage).is_none());

        // 100 × 1.5 split two ways.
        assert_eq!(store.credits(1), 75);
        assert_eq!(store.credits(2), 75);
        assert_eq!(store.inventory(1, "iron"), 3);
        assert_eq!(store.inventory(2, "iron"), 2);
        assert_eq!(store.inventory(1, "platinum"), 2);
        assert_eq!(store.inventory(2, "platinum"), 0);

        let notified: Vec<PlayerId> = outbound
            .iter()
            .filter(|o| o.event.name() == "loot:notification")
            .flat_map(|o| o.recipients.clone())
            .collect();
        assert_eq!(notified, vec![1, 2]);
        assert!(names(&outbound).contains(&"wreckage:collected"));
    }

    #[test]
    fn test_collection_cancelled_when_collector_leaves() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::ZERO);
        let wreckage = sim.registry_mut().spawn_wreckage(
            Vec2::ZERO,
            Faction::Swarm,
            20.0,
            vec![LootItem::Credits { amount: 10 }],
            None,
            0.0,
            120.0,
        );
        sim.registry_mut().start_collect(wreckage, 1, 0.0).unwrap();
        if let Some(ship) = sim.players.get_mut(&1) {
            ship.position = Vec2::new(900.0, 0.0);
        }
        sim.step(0.5);
        let w = sim.registry().wreckage(wreckage).unwrap();
        assert_eq!(w.collector, None);
    }

    #[test]
    fn test_wreckage_expires() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::ZERO);
        sim.registry_mut().spawn_wreckage(
            Vec2::new(50.0, 0.0),
            Faction::Void,
            20.0,
            Vec::new(),
            None,
            0.0,
            10.0,
        );
        assert!(!names(&sim.step(5.0)).contains(&"wreckage:despawn"));
        assert!(names(&sim.step(10.0)).contains(&"wreckage:despawn"));
        assert_eq!(sim.registry().wreckage_count(), 0);
    }

    #[test]
    fn test_mining_yields_resource() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.mineables.push(Mineable {
            id: "asteroid_0_0_0".to_string(),
            resource: "iron".to_string(),
            position: Vec2::new(100.0, 100.0),
            orbit: None,
        });
        let (mut sim, store) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(120.0, 100.0));
        sim.mining.start(MiningSession {
            player: 1,
            object_id: "asteroid_0_0_0".to_string(),
            resource: "iron".to_string(),
            started_at: 0.0,
            completes_at: 3.0,
        });

        assert!(!names(&sim.step(2.0)).contains(&"mining:complete"));
        let outbound = sim.step(3.0);
        let complete = outbound
            .iter()
            .find(|o| o.event.name() == "mining:complete")
            .unwrap();
        assert_eq!(complete.recipients, vec![1]);
        let mined = store.inventory(1, "iron");
        assert!((1..=4).contains(&mined));
    }

    #[test]
    fn test_mining_out_of_range_yields_nothing() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.mineables.push(Mineable {
            id: "asteroid_0_0_0".to_string(),
            resource: "iron".to_string(),
            position: Vec2::new(100.0, 100.0),
            orbit: None,
        });
        let (mut sim, store) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(1500.0, 100.0));
        sim.mining.start(MiningSession {
            player: 1,
            object_id: "asteroid_0_0_0".to_string(),
            resource: "iron".to_string(),
            started_at: 0.0,
            completes_at: 3.0,
        });
        sim.step(3.0);
        assert_eq!(store.inventory(1, "iron"), 0);
        assert!(sim.mining.is_empty());
    }

    #[test]
    fn test_radiation_and_nebula_wear_down_ships() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.hazards.push(Hazard {
            id: "hazard_0_0_0".to_string(),
            kind: HazardKind::Radiation,
            position: Vec2::new(500.0, 500.0),
            radius: 300.0,
            intensity: 10.0,
        });
        world.hazards.push(Hazard {
            id: "hazard_-1_-1_0".to_string(),
            kind: HazardKind::Nebula,
            position: Vec2::new(-500.0, -500.0),
            radius: 300.0,
            intensity: 20.0,
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(500.0, 500.0));
        place(&mut sim, 2, Vec2::new(-500.0, -500.0));
        sim.step(0.0);
        sim.step(0.25);

        let irradiated = sim.player(1).unwrap();
        assert_approx_eq!(irradiated.hull, 97.5);
        assert_approx_eq!(irradiated.shield, irradiated.shield_max);

        let fogged = sim.player(2).unwrap();
        assert_approx_eq!(fogged.hull, fogged.hull_max);
        assert_approx_eq!(fogged.shield, fogged.shield_max - 5.0);
    }

    #[test]
    fn test_scavenger_cargo_merges_into_wreckage() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(100.0, 0.0));
        let id = sim
            .spawn_npc(NpcType::ScavengerScrapper, Vec2::ZERO, 0.0)
            .unwrap();
        let iron = |quantity| LootItem::Resource {
            resource: "iron".to_string(),
            quantity,
            rarity: Rarity::Common,
        };
        if let Some(npc) = sim.registry_mut().npc_mut(id) {
            npc.locals.cargo = vec![iron(2), iron(3), LootItem::Credits { amount: 5 }];
        }

        let cfg = sim.config().clone();
        let spec = DamageSpec {
            amount: 10_000.0,
            attacker: 1,
            piercing: 0.0,
        };
        let outcome = sim.registry_mut().damage(id, spec, &cfg).unwrap();
        sim.handle_npc_death(id, &outcome, 0.0);

        let wrecks = sim.registry().wreckage_ids();
        assert_eq!(wrecks.len(), 1);
        let items = &sim.registry().wreckage(wrecks[0]).unwrap().items;

        let mut names: Vec<&str> = items
            .iter()
            .filter_map(|item| match item {
                LootItem::Resource { resource, .. } => Some(resource.as_str()),
                _ => None,
            })
            .collect();
        let resource_entries = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), resource_entries);

        let iron_total: u32 = items
            .iter()
            .filter_map(|item| match item {
                LootItem::Resource {
                    resource, quantity, ..
                } if resource == "iron" => Some(*quantity),
                _ => None,
            })
            .sum();
        assert!(iron_total >= 5);

        let credits: Vec<u64> = items
            .iter()
            .filter_map(|item| match item {
                LootItem::Credits { amount } => Some(*amount),
                _ => None,
            })
            .collect();
        assert_eq!(credits.len(), 1);
        assert!(credits[0] > 5);
    }

    #[test]
    fn test_scavenger_refused_a_locked_wreck_keeps_looking() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(30.0, 0.0));
        let wreckage = sim.registry_mut().spawn_wreckage(
            Vec2::ZERO,
            Faction::Pirate,
            20.0,
            vec![LootItem::Credits { amount: 10 }],
            None,
            0.0,
            120.0,
        );
        sim.registry_mut().start_collect(wreckage, 1, 0.0).unwrap();
        let id = sim
            .spawn_npc(NpcType::ScavengerScrapper, Vec2::new(10.0, 0.0), 0.0)
            .unwrap();
        if let Some(npc) = sim.registry_mut().npc_mut(id) {
            npc.state = BehaviorState::Collecting { wreckage, until: 0.0 };
        }

        sim.apply_intent(id, Intent::Collect { wreckage }, 1.0);

        let npc = sim.registry().npc(id).unwrap();
        assert_eq!(npc.state, BehaviorState::Idle);
        assert!(npc.locals.cargo.is_empty());
        assert_eq!(sim.registry().wreckage(wreckage).unwrap().collector, Some(1));
    }

    #[test]
    fn test_refused_defender_can_be_called_again() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.bases.push(BaseSite {
            id: "base_1_0_0".to_string(),
            faction: Faction::Pirate,
            position: Vec2::new(3000.0, 500.0),
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(2100.0, 500.0));
        sim.step(0.0);

        if let Some(base) = sim.registry_mut().base_mut("base_1_0_0") {
            base.health = base.max_health * 0.4;
        }
        // Fill the base's sector so the defender has no room.
        while sim
            .registry_mut()
            .spawn(NpcType::VoidWisp, Vec2::new(3000.0, 500.0), SpawnContext::default())
            .is_some()
        {}
        sim.step(0.05);
        assert!(!sim.registry().base("base_1_0_0").unwrap().defender_called);

        for id in sim.registry().npc_ids() {
            sim.registry_mut().remove(id);
        }
        sim.step(0.1);

        let base = sim.registry().base("base_1_0_0").unwrap();
        assert!(base.defender_called);
        let defender = archetype::base_defender(Faction::Pirate);
        assert!(base
            .children
            .iter()
            .filter_map(|id| sim.registry().npc(*id))
            .any(|npc| npc.npc_type == defender));
    }

    #[test]
    fn test_ion_storm_slows_once() {
        let cfg = SimConfig::default();
        let mut world = FixedWorld::new(cfg.cell_size);
        world.hazards.push(Hazard {
            id: "hazard_0_0_0".to_string(),
            kind: HazardKind::IonStorm,
            position: Vec2::new(500.0, 500.0),
            radius: 300.0,
            intensity: 0.3,
        });
        let (mut sim, _) = simulation_with(world);
        place(&mut sim, 1, Vec2::new(500.0, 500.0));

        let first = sim.step(0.0);
        let second = sim.step(0.05);
        assert!(names(&first).contains(&"player:debuff"));
        assert!(!names(&second).contains(&"player:debuff"));
        assert!(sim.player(1).unwrap().debuffs.is_slowed(0.05));
    }

    #[test]
    fn test_player_death_respawns_at_origin() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(800.0, 800.0));
        if let Some(ship) = sim.players.get_mut(&1) {
            ship.hull = 0.0;
        }
        let outbound = sim.step(0.0);
        assert!(names(&outbound).contains(&"player:destroyed"));
        let ship = sim.player(1).unwrap();
        assert_eq!(ship.position, Vec2::ZERO);
        assert_approx_eq!(ship.hull, ship.hull_max);
    }

    #[test]
    fn test_swarm_shoots_at_nearby_player() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::new(200.0, 0.0));
        sim.spawn_npc(NpcType::SwarmDrone, Vec2::ZERO, 0.0).unwrap();

        let mut fired = false;
        for i in 0..20 {
            let outbound = sim.step(i as f64 * 0.05);
            fired |= names(&outbound).contains(&"combat:npcFire");
        }
        assert!(fired);
    }

    #[test]
    fn test_hoarder_transforms_with_cargo() {
        let (mut sim, _) = simulation_with(empty_world());
        let id = sim
            .spawn_npc(NpcType::ScavengerHoarder, Vec2::new(400.0, 400.0), 0.0)
            .unwrap();
        let cargo = sim.config().transform_cargo;
        if let Some(npc) = sim.registry_mut().npc_mut(id) {
            npc.locals.cargo = vec![LootItem::Credits { amount: 5 }; cargo];
        }
        sim.step(0.0);

        assert!(sim.registry().npc(id).is_none());
        let ids = sim.registry().npc_ids();
        assert_eq!(ids.len(), 1);
        let king = sim.registry().npc(ids[0]).unwrap();
        assert_eq!(king.npc_type, NpcType::ScavengerBarnacleKing);
        assert_eq!(king.locals.cargo.len(), cargo);
    }

    #[test]
    fn test_stop_clears_world() {
        let (mut sim, _) = simulation_with(empty_world());
        place(&mut sim, 1, Vec2::ZERO);
        sim.spawn_npc(NpcType::VoidWisp, Vec2::new(100.0, 0.0), 0.0);
        sim.stop();
        assert_eq!(sim.registry().npc_count(), 0);
        assert_eq!(sim.player_count(), 1);
    }
}
