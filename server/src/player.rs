//! In-memory state of a connected player's ship.

use crate::behavior::PlayerView;
use crate::combat::{self, DamageSplit};
use crate::debuff::DebuffState;
use crate::persistence::ShipRecord;
use shared::{BuffType, PlayerId, Vec2};

pub const WEAPON_RANGE: f32 = 600.0;
pub const FIRE_COOLDOWN: f64 = 0.25;
const BASE_SPEED: f32 = 200.0;
const SPEED_PER_ENGINE_TIER: f32 = 40.0;
const BASE_DAMAGE: f32 = 10.0;
const DAMAGE_PER_WEAPON_TIER: f32 = 6.0;
const SHIELD_REGEN: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveBuff {
    pub buff: BuffType,
    pub expires_at: f64,
}

#[derive(Debug, Clone)]
pub struct PlayerShip {
    pub id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub hull: f32,
    pub hull_max: f32,
    pub shield: f32,
    pub shield_max: f32,
    pub weapon_tier: u8,
    pub engine_tier: u8,
    pub shield_tier: u8,
    pub credits: u64,
    pub buffs: Vec<ActiveBuff>,
    pub debuffs: DebuffState,
    pub last_fire_at: Option<f64>,
    pub last_move_at: Option<f64>,
}

impl PlayerShip {
    pub fn from_record(id: PlayerId, record: &ShipRecord) -> Self {
        Self {
            id,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            hull: record.hull,
            hull_max: record.hull,
            shield: record.shield,
            shield_max: record.shield,
            weapon_tier: record.weapon_tier,
            engine_tier: record.engine_tier,
            shield_tier: record.shield_tier,
            credits: record.credits,
            buffs: Vec::new(),
            debuffs: DebuffState::default(),
            last_fire_at: None,
            last_move_at: None,
        }
    }

    pub fn has_buff(&self, buff: BuffType, now: f64) -> bool {
        self.buffs
            .iter()
            .any(|b| b.buff == buff && b.expires_at > now)
    }

    /// Activates `buff`, or pushes its expiry out if already active.
    pub fn grant_buff(&mut self, buff: BuffType, now: f64, duration: f64) {
        let expires_at = now + duration;
        match self.buffs.iter_mut().find(|b| b.buff == buff) {
            Some(active) => active.expires_at = active.expires_at.max(expires_at),
            None => self.buffs.push(ActiveBuff { buff, expires_at }),
        }
        if buff == BuffType::ShieldBoost {
            self.shield = (self.shield + self.shield_max * 0.25).min(self.shield_max);
        }
    }

    pub fn expire_buffs(&mut self, now: f64) {
        self.buffs.retain(|b| b.expires_at > now);
    }

    pub fn max_speed(&self, now: f64) -> f32 {
        let mut speed = BASE_SPEED + SPEED_PER_ENGINE_TIER * self.engine_tier as f32;
        if self.has_buff(BuffType::SpeedBoost, now) {
            speed *= 1.2;
        }
        speed * (1.0 - self.debuffs.slow_percent(now))
    }

    pub fn weapon_damage(&self, now: f64) -> f32 {
        let damage = BASE_DAMAGE + DAMAGE_PER_WEAPON_TIER * self.weapon_tier as f32;
        if self.has_buff(BuffType::DamageBoost, now) {
            damage * 1.25
        } else {
            damage
        }
    }

    pub fn can_fire(&self, now: f64) -> bool {
        self.last_fire_at
            .map(|last| now - last >= FIRE_COOLDOWN)
            .unwrap_or(true)
    }

    pub fn regen_shield(&mut self, now: f64, dt: f32) {
        let mut rate = SHIELD_REGEN * self.shield_tier.max(1) as f32;
        if self.has_buff(BuffType::ShieldBoost, now) {
            rate *= 1.25;
        }
        self.shield = (self.shield + rate * dt).min(self.shield_max);
    }

    /// Shield-then-hull damage with optional piercing.
    pub fn apply_damage(&mut self, amount: f32, piercing: f32) -> DamageSplit {
        let split = combat::split_damage(amount, self.shield, piercing, 1.0);
        let (hull, shield) = combat::apply_split(self.hull, self.shield, split);
        self.hull = hull;
        self.shield = shield;
        split
    }

    /// Damage straight to hull, used by radiation.
    pub fn apply_hull_damage(&mut self, amount: f32) {
        self.hull = (self.hull - amount.max(0.0)).max(0.0);
    }

    pub fn drain_shield(&mut self, amount: f32) {
        self.shield = (self.shield - amount.max(0.0)).max(0.0);
    }

    pub fn is_destroyed(&self) -> bool {
        self.hull <= 0.0
    }

    /// Back at the origin with full hull and shield and no effects.
    pub fn respawn(&mut self) {
        self.position = Vec2::ZERO;
        self.velocity = Vec2::ZERO;
        self.hull = self.hull_max;
        self.shield = self.shield_max;
        self.debuffs.clear();
    }

    pub fn view(&self, now: f64) -> PlayerView {
        PlayerView {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            theft_immune: self.has_buff(BuffType::ScrapPact, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ship() -> PlayerShip {
        PlayerShip::from_record(1, &ShipRecord::default())
    }

    #[test]
    fn test_derived_stats_follow_tiers() {
        let mut s = ship();
        s.engine_tier = 3;
        s.weapon_tier = 2;
        assert_approx_eq!(s.max_speed(0.0), 320.0);
        assert_approx_eq!(s.weapon_damage(0.0), 22.0);
    }

    #[test]
    fn test_buffs_modify_and_expire() {
        let mut s = ship();
        let plain = s.max_speed(0.0);
        s.grant_buff(BuffType::SpeedBoost, 0.0, 60.0);
        assert_approx_eq!(s.max_speed(1.0), plain * 1.2);
        s.expire_buffs(61.0);
        assert!(s.buffs.is_empty());
        assert_approx_eq!(s.max_speed(61.0), plain);
    }

    #[test]
    fn test_slow_reduces_speed() {
        let mut s = ship();
        let plain = s.max_speed(0.0);
        s.debuffs.apply_slow(0.3, 0.0, 5.0);
        assert_approx_eq!(s.max_speed(1.0), plain * 0.7);
    }

    #[test]
    fn test_fire_cooldown() {
        let mut s = ship();
        assert!(s.can_fire(0.0));
        s.last_fire_at = Some(1.0);
        assert!(!s.can_fire(1.1));
        assert!(s.can_fire(1.25));
    }

    #[test]
    fn test_damage_and_respawn() {
        let mut s = ship();
        s.position = Vec2::new(500.0, 500.0);
        s.apply_damage(30.0, 0.0);
        assert_approx_eq!(s.shield, 20.0);
        assert_approx_eq!(s.hull, 100.0);
        s.apply_damage(500.0, 0.0);
        assert!(s.is_destroyed());

        s.respawn();
        assert_eq!(s.position, Vec2::ZERO);
        assert_approx_eq!(s.hull, s.hull_max);
        assert_approx_eq!(s.shield, s.shield_max);
    }

    #[test]
    fn test_scrap_pact_grants_theft_immunity() {
        let mut s = ship();
        assert!(!s.view(0.0).theft_immune);
        s.grant_buff(BuffType::ScrapPact, 0.0, 60.0);
        assert!(s.view(10.0).theft_immune);
        assert!(!s.view(61.0).theft_immune);
    }

    #[test]
    fn test_shield_boost_restores_immediately() {
        let mut s = ship();
        s.shield = 0.0;
        s.grant_buff(BuffType::ShieldBoost, 0.0, 60.0);
        assert_approx_eq!(s.shield, s.shield_max * 0.25);
    }
}
