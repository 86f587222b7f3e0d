//! Simulation tuning surface.
//!
//! Defaults are compiled in; any field can be overridden through a
//! `VOIDLINE_*` environment variable. The numbers are gameplay tuning: only
//! their shape (monotonic penalties, capped ranges, non-decreasing team
//! multipliers) is relied upon by the rest of the crate.

use log::info;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("cell size {cell_size} is smaller than broadcast range {range}")]
    CellTooSmall { cell_size: f32, range: f32 },
    #[error("team multiplier table must be non-empty and non-decreasing")]
    BadMultiplierTable,
    #[error("tick rate must be between 1 and 240 Hz, got {0}")]
    BadTickRate(u32),
}

/// How far an event travels from its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastTier {
    Near,
    Standard,
    Far,
}

/// Reward scaling by number of distinct damage contributors.
///
/// Index `n - 1` holds the multiplier for `n` contributors; counts beyond the
/// table use the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMultipliers(Vec<f32>);

impl TeamMultipliers {
    pub fn new(table: Vec<f32>) -> Result<Self, ConfigError> {
        if table.is_empty() || table.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::BadMultiplierTable);
        }
        Ok(Self(table))
    }

    pub fn for_count(&self, contributors: usize) -> f32 {
        if contributors == 0 {
            return 1.0;
        }
        let idx = (contributors - 1).min(self.0.len() - 1);
        self.0[idx]
    }
}

impl Default for TeamMultipliers {
    fn default() -> Self {
        Self(vec![1.0, 1.5, 1.8, 2.0, 2.2])
    }
}

impl FromStr for TeamMultipliers {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let table = s
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "VOIDLINE_TEAM_MULTIPLIERS".to_string(),
                value: s.to_string(),
            })?;
        TeamMultipliers::new(table)
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_rate: u32,
    pub cell_size: f32,
    pub range_near: f32,
    pub range_standard: f32,
    pub range_far: f32,

    pub wreckage_ttl: f64,
    pub collect_duration: f64,
    pub collect_range: f32,

    pub rage_spread_radius: f32,
    pub rage_clear_radius: f32,
    pub rage_duration: f64,
    pub theft_radius: f32,
    pub rage_speed_bonus: f32,

    pub accuracy_min: f32,
    pub accuracy_max: f32,
    pub distance_penalty_max: f32,
    pub velocity_penalty_max: f32,
    pub velocity_threshold: f32,
    pub shield_absorption: f32,
    pub range_tolerance: f32,

    pub team_multipliers: TeamMultipliers,

    pub sector_cap: usize,
    pub base_npc_cap: usize,
    pub spawn_interval: f64,
    pub base_activation_range: f32,
    pub base_deactivate_after: f64,
    pub base_respawn: f64,
    pub base_broadcast_ticks: u64,
    pub scrap_threshold: u32,

    pub npc_idle_despawn: f64,
    pub transform_cargo: usize,
    pub scavenger_collect_time: f64,
    pub scavenger_dump_time: f64,

    pub mining_duration: f64,
    pub mining_range: f32,

    pub buff_duration: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            cell_size: 2000.0,
            range_near: 800.0,
            range_standard: 1500.0,
            range_far: 2000.0,

            wreckage_ttl: 120.0,
            collect_duration: 2.0,
            collect_range: 120.0,

            rage_spread_radius: 600.0,
            rage_clear_radius: 1400.0,
            rage_duration: 20.0,
            theft_radius: 150.0,
            rage_speed_bonus: 1.5,

            accuracy_min: 0.15,
            accuracy_max: 0.95,
            distance_penalty_max: 0.30,
            velocity_penalty_max: 0.25,
            velocity_threshold: 150.0,
            shield_absorption: 1.0,
            range_tolerance: 50.0,

            team_multipliers: TeamMultipliers::default(),

            sector_cap: 24,
            base_npc_cap: 6,
            spawn_interval: 20.0,
            base_activation_range: 2500.0,
            base_deactivate_after: 30.0,
            base_respawn: 300.0,
            base_broadcast_ticks: 10,
            scrap_threshold: 10,

            npc_idle_despawn: 60.0,
            transform_cargo: 6,
            scavenger_collect_time: 1.5,
            scavenger_dump_time: 2.0,

            mining_duration: 3.0,
            mining_range: 180.0,

            buff_duration: 60.0,
            seed: 0x5eed,
        }
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(raw) = std::env::var(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
        info!("Config override {}={}", key, raw.trim());
    }
    Ok(())
}

impl SimConfig {
    /// Defaults overridden by any `VOIDLINE_*` variables present, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = SimConfig::default();
        env_override("VOIDLINE_TICK_RATE", &mut cfg.tick_rate)?;
        env_override("VOIDLINE_CELL_SIZE", &mut cfg.cell_size)?;
        env_override("VOIDLINE_RANGE_NEAR", &mut cfg.range_near)?;
        env_override("VOIDLINE_RANGE_STANDARD", &mut cfg.range_standard)?;
        env_override("VOIDLINE_RANGE_FAR", &mut cfg.range_far)?;
        env_override("VOIDLINE_WRECKAGE_TTL", &mut cfg.wreckage_ttl)?;
        env_override("VOIDLINE_COLLECT_DURATION", &mut cfg.collect_duration)?;
        env_override("VOIDLINE_COLLECT_RANGE", &mut cfg.collect_range)?;
        env_override("VOIDLINE_RAGE_SPREAD", &mut cfg.rage_spread_radius)?;
        env_override("VOIDLINE_RAGE_CLEAR", &mut cfg.rage_clear_radius)?;
        env_override("VOIDLINE_RAGE_DURATION", &mut cfg.rage_duration)?;
        env_override("VOIDLINE_THEFT_RADIUS", &mut cfg.theft_radius)?;
        env_override("VOIDLINE_RAGE_SPEED", &mut cfg.rage_speed_bonus)?;
        env_override(
            "VOIDLINE_DISTANCE_PENALTY_MAX",
            &mut cfg.distance_penalty_max,
        )?;
        env_override(
            "VOIDLINE_VELOCITY_PENALTY_MAX",
            &mut cfg.velocity_penalty_max,
        )?;
        env_override("VOIDLINE_VELOCITY_THRESHOLD", &mut cfg.velocity_threshold)?;
        env_override("VOIDLINE_TEAM_MULTIPLIERS", &mut cfg.team_multipliers)?;
        env_override("VOIDLINE_RANGE_TOLERANCE", &mut cfg.range_tolerance)?;
        env_override("VOIDLINE_SECTOR_CAP", &mut cfg.sector_cap)?;
        env_override("VOIDLINE_SPAWN_INTERVAL", &mut cfg.spawn_interval)?;
        env_override("VOIDLINE_BASE_ACTIVATION", &mut cfg.base_activation_range)?;
        env_override("VOIDLINE_BASE_RESPAWN", &mut cfg.base_respawn)?;
        env_override("VOIDLINE_NPC_IDLE_DESPAWN", &mut cfg.npc_idle_despawn)?;
        env_override("VOIDLINE_SHIELD_ABSORPTION", &mut cfg.shield_absorption)?;
        env_override("VOIDLINE_SCRAP_THRESHOLD", &mut cfg.scrap_threshold)?;
        env_override("VOIDLINE_TRANSFORM_CARGO", &mut cfg.transform_cargo)?;
        env_override("VOIDLINE_MINING_DURATION", &mut cfg.mining_duration)?;
        env_override("VOIDLINE_MINING_RANGE", &mut cfg.mining_range)?;
        env_override(
            "VOIDLINE_BASE_BROADCAST_TICKS",
            &mut cfg.base_broadcast_ticks,
        )?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err(ConfigError::BadTickRate(self.tick_rate));
        }
        let widest = self.range_near.max(self.range_standard).max(self.range_far);
        if self.cell_size < widest {
            return Err(ConfigError::CellTooSmall {
                cell_size: self.cell_size,
                range: widest,
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn broadcast_range(&self, tier: BroadcastTier) -> f32 {
        match tier {
            BroadcastTier::Near => self.range_near,
            BroadcastTier::Standard => self.range_standard,
            BroadcastTier::Far => self.range_far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
        assert_approx_eq!(cfg.broadcast_range(BroadcastTier::Far), 2000.0);
    }

    #[test]
    fn test_cell_must_cover_widest_range() {
        let cfg = SimConfig {
            cell_size: 1000.0,
            ..SimConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::CellTooSmall { range, .. }) => assert_approx_eq!(range, 2000.0),
            other => panic!("Unexpected validation result: {:?}", other),
        }
    }

    #[test]
    fn test_tick_rate_bounds() {
        let cfg = SimConfig {
            tick_rate: 0,
            ..SimConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadTickRate(0))));
    }

    #[test]
    fn test_team_multiplier_lookup_caps() {
        let table = TeamMultipliers::default();
        assert_approx_eq!(table.for_count(0), 1.0);
        assert_approx_eq!(table.for_count(1), 1.0);
        assert_approx_eq!(table.for_count(2), 1.5);
        assert_approx_eq!(table.for_count(5), 2.2);
        assert_approx_eq!(table.for_count(40), 2.2);
    }

    #[test]
    fn test_team_multiplier_parsing() {
        let table: TeamMultipliers = "1.0, 1.25,2".parse().unwrap();
        assert_approx_eq!(table.for_count(3), 2.0);

        assert!("".parse::<TeamMultipliers>().is_err());
        assert!("1.0,abc".parse::<TeamMultipliers>().is_err());
        assert!(matches!(
            "2.0,1.0".parse::<TeamMultipliers>(),
            Err(ConfigError::BadMultiplierTable)
        ));
    }
}
