//! Per-player slow and damage-over-time effects.
//!
//! Effects are plain timestamps checked once per step; nothing here owns a
//! timer, so an effect on a player who disconnects just disappears with them.

/// Movement slow. `percent` is the fraction of max speed removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slow {
    pub percent: f32,
    pub expires_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOverTime {
    pub damage: f32,
    pub interval: f64,
    pub expires_at: f64,
    pub next_tick_at: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebuffState {
    slow: Option<Slow>,
    dots: Vec<DamageOverTime>,
}

impl DebuffState {
    /// Applies or refreshes a slow. The stronger percent and the later
    /// expiry win; slows never stack additively.
    pub fn apply_slow(&mut self, percent: f32, now: f64, duration: f64) -> Slow {
        let percent = percent.clamp(0.0, 0.95);
        let incoming = Slow {
            percent,
            expires_at: now + duration,
        };
        let merged = match self.slow {
            Some(current) if current.expires_at > now => Slow {
                percent: current.percent.max(incoming.percent),
                expires_at: current.expires_at.max(incoming.expires_at),
            },
            _ => incoming,
        };
        self.slow = Some(merged);
        merged
    }

    pub fn apply_dot(&mut self, damage: f32, interval: f64, now: f64, duration: f64) {
        let interval = interval.max(0.05);
        self.dots.push(DamageOverTime {
            damage,
            interval,
            expires_at: now + duration,
            next_tick_at: now + interval,
        });
    }

    /// Advances every effect to `now`, dropping expired ones.
    /// Returns the damage that came due.
    pub fn tick(&mut self, now: f64) -> f32 {
        let mut due = 0.0;
        for dot in &mut self.dots {
            while dot.next_tick_at <= now && dot.next_tick_at <= dot.expires_at {
                due += dot.damage;
                dot.next_tick_at += dot.interval;
            }
        }
        self.dots.retain(|dot| dot.next_tick_at <= dot.expires_at);
        if matches!(self.slow, Some(slow) if slow.expires_at <= now) {
            self.slow = None;
        }
        due
    }

    /// Current slow as a fraction of speed removed.
    pub fn slow_percent(&self, now: f64) -> f32 {
        match self.slow {
            Some(slow) if slow.expires_at > now => slow.percent,
            _ => 0.0,
        }
    }

    pub fn is_slowed(&self, now: f64) -> bool {
        self.slow_percent(now) > 0.0
    }

    pub fn active_dots(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slow.is_none() && self.dots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slow = None;
        self.dots.clear();
    }
}
