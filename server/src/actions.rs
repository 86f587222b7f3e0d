//! Inbound player actions.
//!
//! Each handler validates its payload against the player's current ship and
//! either applies it straight to the simulation state or rejects it with an
//! [`ActionError`]. Rejected actions change nothing.

use crate::archetype;
use crate::behavior;
use crate::combat;
use crate::mining::MiningSession;
use crate::player::WEAPON_RANGE;
use crate::registry::{CollectError, DamageSpec};
use crate::simulation::Simulation;
use log::debug;
use shared::{EntityId, ObjectId, PlayerId, ServerEvent, Vec2};
use thiserror::Error;

/// Half-width of the firing cone, in radians.
pub const AIM_CONE: f32 = 0.15;
/// Slack on reported speed over the ship's limit.
const SPEED_SLACK: f32 = 1.25;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("player {0} is not in the simulation")]
    UnknownPlayer(PlayerId),
    #[error("non-finite values in action payload")]
    NonFinite,
    #[error("speed {speed:.1} exceeds limit {limit:.1}")]
    TooFast { speed: f32, limit: f32 },
    #[error("weapon is cooling down")]
    FireCooldown,
    #[error("fire direction must be non-zero")]
    BadDirection,
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("target is {distance:.0} away, range is {range:.0}")]
    OutOfRange { distance: f32, range: f32 },
    #[error("wreckage {0} does not exist")]
    WreckageNotFound(EntityId),
    #[error("wreckage {id} is already being collected by player {by}")]
    AlreadyBeingCollected { id: EntityId, by: PlayerId },
}

impl From<CollectError> for ActionError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::NotFound(id) => ActionError::WreckageNotFound(id),
            CollectError::AlreadyBeingCollected { id, by } => {
                ActionError::AlreadyBeingCollected { id, by }
            }
        }
    }
}

/// What a shot struck.
#[derive(Debug, Clone, PartialEq)]
pub enum FireTarget {
    Npc(EntityId),
    Base(ObjectId),
}

/// Angle between `aim` (unit) and the line from `from` to `to`.
fn off_axis(aim: Vec2, from: Vec2, to: Vec2) -> f32 {
    let offset = to - from;
    let len = offset.length();
    if len <= f32::EPSILON {
        return 0.0;
    }
    ((aim.x * offset.x + aim.y * offset.y) / len)
        .clamp(-1.0, 1.0)
        .acos()
}

impl Simulation {
    pub fn player_move(
        &mut self,
        player: PlayerId,
        position: Vec2,
        velocity: Vec2,
        rotation: f32,
        now: f64,
    ) -> Result<(), ActionError> {
        if !position.is_finite() || !velocity.is_finite() || !rotation.is_finite() {
            return Err(ActionError::NonFinite);
        }
        let ship = self
            .players
            .get_mut(&player)
            .ok_or(ActionError::UnknownPlayer(player))?;
        let limit = ship.max_speed(now) * SPEED_SLACK;
        let speed = velocity.length();
        if speed > limit {
            return Err(ActionError::TooFast { speed, limit });
        }

        ship.position = position;
        ship.velocity = velocity;
        ship.rotation = rotation;
        ship.last_move_at = Some(now);
        if self.broadcaster.update_membership(player, position) {
            debug!("Player {} moved into a new sector", player);
        }
        Ok(())
    }

    /// Fires the player's gun along `direction`. Returns what was hit, if
    /// anything; a clean miss is not an error.
    pub fn player_fire(
        &mut self,
        player: PlayerId,
        direction: Vec2,
        now: f64,
    ) -> Result<Option<FireTarget>, ActionError> {
        if !direction.is_finite() {
            return Err(ActionError::NonFinite);
        }
        let aim = direction.normalize();
        if aim == Vec2::ZERO {
            return Err(ActionError::BadDirection);
        }
        let ship = self
            .players
            .get_mut(&player)
            .ok_or(ActionError::UnknownPlayer(player))?;
        if !ship.can_fire(now) {
            return Err(ActionError::FireCooldown);
        }
        ship.last_fire_at = Some(now);
        let origin = ship.position;
        let damage = ship.weapon_damage(now);
        let reach = WEAPON_RANGE + self.config.range_tolerance;

        let npc_target = self
            .registry
            .npcs_near(origin, reach)
            .into_iter()
            .filter_map(|id| self.registry.npc(id))
            .filter(|npc| off_axis(aim, origin, npc.position) <= AIM_CONE)
            .map(|npc| (npc.id, npc.position.distance(origin)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let base_target = self
            .registry
            .bases_near(origin, reach)
            .into_iter()
            .filter_map(|id| self.registry.base(&id))
            .filter(|base| base.is_vulnerable())
            .filter(|base| off_axis(aim, origin, base.position) <= AIM_CONE)
            .map(|base| (base.id.clone(), base.position.distance(origin)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let spec = DamageSpec {
            amount: damage,
            attacker: player,
            piercing: 0.0,
        };
        match (npc_target, base_target) {
            (Some((id, d)), base) if base.as_ref().map_or(true, |(_, bd)| d <= *bd) => {
                Ok(self.hit_npc(id, origin, spec, now))
            }
            (_, Some((id, _))) => Ok(self.hit_base(&id, origin, spec, now)),
            _ => Ok(None),
        }
    }

    fn hit_npc(
        &mut self,
        id: EntityId,
        origin: Vec2,
        spec: DamageSpec,
        now: f64,
    ) -> Option<FireTarget> {
        let position = self.registry.npc(id)?.position;
        // Positions may have moved since the shot was aimed.
        if !combat::within_weapon_range(origin, position, WEAPON_RANGE, self.config.range_tolerance)
        {
            return None;
        }
        let outcome = self.registry.damage(id, spec, &self.config)?;
        self.outbox.near(
            &self.broadcaster,
            position,
            ServerEvent::Hit {
                attacker: spec.attacker,
                target: id,
                position,
                hit: true,
                damage: spec.amount,
                hull: outcome.hull,
                shield: outcome.shield,
            },
        );

        if outcome.destroyed {
            self.handle_npc_death(id, &outcome, now);
        } else {
            let enraged =
                behavior::spread_rage(&mut self.registry, id, spec.attacker, now, &self.config);
            debug!(
                "Player {} provoked {} NPC(s) around {}",
                spec.attacker,
                enraged.len(),
                id
            );
        }
        Some(FireTarget::Npc(id))
    }

    fn hit_base(
        &mut self,
        id: &str,
        origin: Vec2,
        spec: DamageSpec,
        now: f64,
    ) -> Option<FireTarget> {
        let base = self.registry.base(id)?;
        let (faction, position) = (base.faction, base.position);
        if !combat::within_weapon_range(origin, position, WEAPON_RANGE, self.config.range_tolerance)
        {
            return None;
        }
        let credits = archetype::base_kill_credits(faction);
        let outcome = self
            .registry
            .damage_base(id, spec, credits, &self.config)?;
        self.outbox.near(
            &self.broadcaster,
            position,
            ServerEvent::BaseHit {
                attacker: spec.attacker,
                base: id.to_string(),
                position,
                damage: spec.amount,
                health: outcome.hull,
            },
        );

        if outcome.destroyed {
            self.handle_base_death(id, &outcome, now);
        } else {
            // Defenders close to the base turn on the attacker.
            let defenders = self
                .registry
                .base(id)
                .map(|base| base.children.clone())
                .unwrap_or_default();
            let radius = self.config.rage_spread_radius;
            for child in defenders {
                if let Some(npc) = self.registry.npc_mut(child) {
                    if npc.position.distance(position) <= radius {
                        behavior::enrage(npc, spec.attacker, now, &self.config);
                    }
                }
            }
            if let Some(base) = self.registry.base(id) {
                let snapshot = base.snapshot();
                self.outbox
                    .near(&self.broadcaster, position, ServerEvent::BaseUpdate(snapshot));
            }
        }
        Some(FireTarget::Base(id.to_string()))
    }

    pub fn start_mining(
        &mut self,
        player: PlayerId,
        object_id: &str,
        now: f64,
    ) -> Result<(), ActionError> {
        let ship = self
            .players
            .get(&player)
            .ok_or(ActionError::UnknownPlayer(player))?;
        let mineable = self
            .world
            .mineable(object_id)
            .ok_or_else(|| ActionError::UnknownObject(object_id.to_string()))?;
        let distance = mineable.position_at(now).distance(ship.position);
        if distance > self.config.mining_range {
            return Err(ActionError::OutOfRange {
                distance,
                range: self.config.mining_range,
            });
        }

        let replaced = self.mining.start(MiningSession {
            player,
            object_id: mineable.id,
            resource: mineable.resource,
            started_at: now,
            completes_at: now + self.config.mining_duration,
        });
        if let Some(old) = replaced {
            debug!("Player {} abandoned mining {}", player, old.object_id);
        }
        Ok(())
    }

    /// Takes the collection lock on a wreckage for `player`.
    pub fn start_collect(
        &mut self,
        player: PlayerId,
        wreckage_id: EntityId,
        now: f64,
    ) -> Result<(), ActionError> {
        let ship = self
            .players
            .get(&player)
            .ok_or(ActionError::UnknownPlayer(player))?;
        let wreckage = self
            .registry
            .wreckage(wreckage_id)
            .ok_or(ActionError::WreckageNotFound(wreckage_id))?;
        let distance = wreckage.position.distance(ship.position);
        if distance > self.config.collect_range {
            return Err(ActionError::OutOfRange {
                distance,
                range: self.config.collect_range,
            });
        }
        let position = wreckage.position;

        self.registry.start_collect(wreckage_id, player, now)?;
        self.outbox.near(
            &self.broadcaster,
            position,
            ServerEvent::WreckageCollectStarted {
                id: wreckage_id,
                collector: player,
            },
        );
        Ok(())
    }

    /// Releases the player's lock. Always succeeds; returns whether a lock
    /// was actually held.
    pub fn cancel_collect(&mut self, player: PlayerId, wreckage_id: EntityId) -> bool {
        self.registry.cancel_collection(wreckage_id, player)
    }
}
