//! Discrete-time clock driving the simulated components

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, RnnError};

/// One unit of simulated time
pub type Tick = u64;

/// What a component reported after being ticked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Nothing left to do until new work arrives
    Idle,
    /// Work is still in progress
    Busy,
    /// The component has finished for good
    Finished(ExitCause),
}

/// Why a simulation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCause {
    TrainingComplete,
    Aborted,
    Idle,
    TickBudgetExhausted,
}

impl std::fmt::Display for ExitCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cause = match self {
            ExitCause::TrainingComplete => "RNN training completed",
            ExitCause::Aborted => "RNN training aborted",
            ExitCause::Idle => "simulated components went idle",
            ExitCause::TickBudgetExhausted => "simulate() limit reached",
        };
        f.write_str(cause)
    }
}

/// A component that advances with the simulation clock.
///
/// `now` is absolute simulated time and never decreases between calls.
pub trait Clocked {
    fn tick(&mut self, now: Tick) -> Result<Activity>;
}

/// Where and why a simulation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitEvent {
    pub tick: Tick,
    pub cause: ExitCause,
}

/// Drives a root component one clock period at a time
pub struct Simulator {
    clock_period: Tick,
    max_ticks: Option<Tick>,
    now: Tick,
}

impl Simulator {
    /// Create a simulator with the given clock period and optional tick budget
    pub fn new(clock_period: Tick, max_ticks: Option<Tick>) -> Result<Self> {
        if clock_period == 0 {
            return Err(RnnError::config("clock period must be at least one tick"));
        }
        Ok(Simulator {
            clock_period,
            max_ticks,
            now: 0,
        })
    }

    /// Current simulated time
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Tick `root` until it finishes, goes idle, or the tick budget runs out
    pub fn run<C: Clocked + ?Sized>(&mut self, root: &mut C) -> Result<ExitEvent> {
        loop {
            if let Some(limit) = self.max_ticks {
                if self.now >= limit {
                    return Ok(self.exit(ExitCause::TickBudgetExhausted));
                }
            }

            self.now += self.clock_period;
            match root.tick(self.now)? {
                Activity::Busy => {}
                Activity::Idle => return Ok(self.exit(ExitCause::Idle)),
                Activity::Finished(cause) => return Ok(self.exit(cause)),
            }
        }
    }

    fn exit(&self, cause: ExitCause) -> ExitEvent {
        info!(tick = self.now, %cause, "Exiting simulation");
        debug!(clock_period = self.clock_period, "simulator stopped");
        ExitEvent {
            tick: self.now,
            cause,
        }
    }
}
