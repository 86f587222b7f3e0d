//! Static world objects: faction bases, hazards and mineables.
//!
//! The simulation asks for a sector's objects when a player first comes near
//! it, and for an object's current position when that object moves on a
//! schedule (comets). Generation itself is deterministic per seed and sector.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Faction, ObjectId, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardKind {
    /// Hull damage per second, ignoring shields.
    Radiation,
    /// Movement slow while inside.
    IonStorm,
    /// Shield drain per second.
    Nebula,
}

impl HazardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Radiation => "radiation",
            HazardKind::IonStorm => "ion_storm",
            HazardKind::Nebula => "nebula",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub id: ObjectId,
    pub kind: HazardKind,
    pub position: Vec2,
    pub radius: f32,
    pub intensity: f32,
}

impl Hazard {
    pub fn contains(&self, point: Vec2) -> bool {
        self.position.distance_squared(point) <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseSite {
    pub id: ObjectId,
    pub faction: Faction,
    pub position: Vec2,
}

/// Circular path for objects whose position is computed from time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    pub center: Vec2,
    pub radius: f32,
    /// Radians per second.
    pub speed: f32,
    pub phase: f32,
}

impl Orbit {
    pub fn position_at(&self, now: f64) -> Vec2 {
        let angle = self.phase + (now * self.speed as f64) as f32;
        self.center + Vec2::from_angle(angle) * self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mineable {
    pub id: ObjectId,
    pub resource: String,
    pub position: Vec2,
    pub orbit: Option<Orbit>,
}

impl Mineable {
    pub fn position_at(&self, now: f64) -> Vec2 {
        self.orbit
            .map(|o| o.position_at(now))
            .unwrap_or(self.position)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorObjects {
    pub bases: Vec<BaseSite>,
    pub hazards: Vec<Hazard>,
    pub mineables: Vec<Mineable>,
}

pub trait WorldSource: Send + Sync {
    fn objects_in_sector(&self, sector_x: i32, sector_y: i32) -> SectorObjects;
    fn object_position(&self, id: &str, now: f64) -> Option<Vec2>;
    fn mineable(&self, id: &str) -> Option<Mineable>;
}

/// Seeded procedural world. Sector contents depend only on (seed, x, y).
#[derive(Debug, Clone)]
pub struct ProceduralWorld {
    seed: u64,
    sector_size: f32,
}

const ASTEROID_RESOURCES: [&str; 4] = ["iron", "carbon", "copper", "titanium"];

impl ProceduralWorld {
    pub fn new(seed: u64, sector_size: f32) -> Self {
        Self { seed, sector_size }
    }

    fn sector_rng(&self, x: i32, y: i32) -> StdRng {
        let mixed = self.seed
            ^ (x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (y as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        StdRng::seed_from_u64(mixed)
    }

    fn point_in_sector<R: Rng>(&self, rng: &mut R, x: i32, y: i32) -> Vec2 {
        let margin = self.sector_size * 0.1;
        Vec2::new(
            x as f32 * self.sector_size + rng.gen_range(margin..self.sector_size - margin),
            y as f32 * self.sector_size + rng.gen_range(margin..self.sector_size - margin),
        )
    }

    fn generate(&self, x: i32, y: i32) -> SectorObjects {
        let mut rng = self.sector_rng(x, y);
        let mut objects = SectorObjects::default();

        // The origin sector stays free of bases so respawned players are safe.
        if (x, y) != (0, 0) && rng.gen_bool(0.35) {
            let faction = Faction::ALL[rng.gen_range(0..Faction::ALL.len())];
            objects.bases.push(BaseSite {
                id: format!("base_{}_{}_0", x, y),
                faction,
                position: self.point_in_sector(&mut rng, x, y),
            });
        }

        let hazard_count = rng.gen_range(0..=2);
        for i in 0..hazard_count {
            let kind = match rng.gen_range(0..3) {
                0 => HazardKind::Radiation,
                1 => HazardKind::IonStorm,
                _ => HazardKind::Nebula,
            };
            let intensity = match kind {
                HazardKind::Radiation => 3.0,
                HazardKind::IonStorm => 0.3,
                HazardKind::Nebula => 5.0,
            };
            objects.hazards.push(Hazard {
                id: format!("hazard_{}_{}_{}", x, y, i),
                kind,
                position: self.point_in_sector(&mut rng, x, y),
                radius: rng.gen_range(150.0..400.0),
                intensity,
            });
        }

        let asteroid_count = rng.gen_range(3..=6);
        for i in 0..asteroid_count {
            let resource = ASTEROID_RESOURCES[rng.gen_range(0..ASTEROID_RESOURCES.len())];
            objects.mineables.push(Mineable {
                id: format!("asteroid_{}_{}_{}", x, y, i),
                resource: resource.to_string(),
                position: self.point_in_sector(&mut rng, x, y),
                orbit: None,
            });
        }

        if rng.gen_bool(0.2) {
            let center = Vec2::new(
                (x as f32 + 0.5) * self.sector_size,
                (y as f32 + 0.5) * self.sector_size,
            );
            let orbit = Orbit {
                center,
                radius: self.sector_size * 0.3,
                speed: rng.gen_range(0.01..0.05),
                phase: rng.gen_range(0.0..std::f32::consts::TAU),
            };
            objects.mineables.push(Mineable {
                id: format!("comet_{}_{}_0", x, y),
                resource: "ice".to_string(),
                position: orbit.position_at(0.0),
                orbit: Some(orbit),
            });
        }

        objects
    }

    /// Sector coordinates encoded in a generated id (`kind_x_y_n`).
    fn sector_of(id: &str) -> Option<(i32, i32)> {
        let mut parts = id.split('_').skip(1);
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        Some((x, y))
    }
}

impl WorldSource for ProceduralWorld {
    fn objects_in_sector(&self, sector_x: i32, sector_y: i32) -> SectorObjects {
        self.generate(sector_x, sector_y)
    }

    fn object_position(&self, id: &str, now: f64) -> Option<Vec2> {
        let (x, y) = Self::sector_of(id)?;
        let objects = self.generate(x, y);
        if let Some(m) = objects.mineables.iter().find(|m| m.id == id) {
            return Some(m.position_at(now));
        }
        if let Some(b) = objects.bases.iter().find(|b| b.id == id) {
            return Some(b.position);
        }
        objects
            .hazards
            .iter()
            .find(|h| h.id == id)
            .map(|h| h.position)
    }

    fn mineable(&self, id: &str) -> Option<Mineable> {
        let (x, y) = Self::sector_of(id)?;
        self.generate(x, y)
            .mineables
            .into_iter()
            .find(|m| m.id == id)
    }
}

/// Hand-placed world, for tests and scripted scenarios.
#[derive(Debug, Clone, Default)]
pub struct FixedWorld {
    pub sector_size: f32,
    pub bases: Vec<BaseSite>,
    pub hazards: Vec<Hazard>,
    pub mineables: Vec<Mineable>,
}

impl FixedWorld {
    pub fn new(sector_size: f32) -> Self {
        Self {
            sector_size,
            ..Self::default()
        }
    }

    fn in_sector(&self, position: Vec2, x: i32, y: i32) -> bool {
        (position.x / self.sector_size).floor() as i32 == x
            && (position.y / self.sector_size).floor() as i32 == y
    }
}

impl WorldSource for FixedWorld {
    fn objects_in_sector(&self, sector_x: i32, sector_y: i32) -> SectorObjects {
        SectorObjects {
            bases: self
                .bases
                .iter()
                .filter(|b| self.in_sector(b.position, sector_x, sector_y))
                .cloned()
                .collect(),
            hazards: self
                .hazards
                .iter()
                .filter(|h| self.in_sector(h.position, sector_x, sector_y))
                .cloned()
                .collect(),
            mineables: self
                .mineables
                .iter()
                .filter(|m| self.in_sector(m.position, sector_x, sector_y))
                .cloned()
                .collect(),
        }
    }

    fn object_position(&self, id: &str, now: f64) -> Option<Vec2> {
        self.mineables
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.position_at(now))
            .or_else(|| self.bases.iter().find(|b| b.id == id).map(|b| b.position))
    }

    fn mineable(&self, id: &str) -> Option<Mineable> {
        self.mineables.iter().find(|m| m.id == id).cloned()
    }
}
