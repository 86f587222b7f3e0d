//! Self-correcting fixed-rate tick scheduling.
//!
//! Each step is timed; the next deadline is whatever is left of the target
//! interval after the step, or immediately when the step overran. Steps never
//! overlap because the deadline only moves once the current step has
//! returned. The server loop sleeps until [`TickScheduler::next_deadline`].

use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Delay before the next step given how long the last one took.
pub fn next_delay(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

#[derive(Debug)]
pub struct TickScheduler {
    interval: Duration,
    state: SchedulerState,
    started: Option<Instant>,
    deadline: Instant,
    ticks: u64,
    overruns: u64,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: SchedulerState::Stopped,
            started: None,
            deadline: Instant::now(),
            ticks: 0,
            overruns: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// `stopped -> running`. Starting twice keeps the original clock.
    pub fn start(&mut self) {
        if self.state == SchedulerState::Running {
            return;
        }
        self.state = SchedulerState::Running;
        self.started.get_or_insert_with(Instant::now);
        self.deadline = Instant::now();
        info!(
            "Tick scheduler running at {:.1} Hz",
            1.0 / self.interval.as_secs_f64()
        );
    }

    pub fn stop(&mut self) {
        if self.state == SchedulerState::Running {
            info!("Tick scheduler stopped after {} ticks", self.ticks);
        }
        self.state = SchedulerState::Stopped;
    }

    /// Simulation clock in seconds since the first start.
    pub fn now(&self) -> f64 {
        self.started
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// When the next step is due.
    pub fn next_deadline(&self) -> Instant {
        self.deadline
    }

    /// Records a finished step and returns the delay before the next one.
    pub fn finish_step(&mut self, elapsed: Duration) -> Duration {
        self.ticks += 1;
        let delay = next_delay(self.interval, elapsed);
        self.deadline = Instant::now() + delay;
        if delay.is_zero() && elapsed > self.interval {
            self.overruns += 1;
            warn!(
                "Tick {} took {:?}, over the {:?} budget",
                self.ticks, elapsed, self.interval
            );
        } else if self.ticks % 200 == 0 {
            debug!("Tick {} took {:?}", self.ticks, elapsed);
        }
        delay
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
