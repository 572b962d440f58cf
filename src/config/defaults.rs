//! Default parameter values.
//!
//! These mirror the parameter declarations of the simulated objects so that a
//! config file only has to spell out what differs.

use crate::clock::Tick;

// ============================================================================
// Neuron
// ============================================================================

/// Per-neuron learning rate used when the trainer has no global rate.
pub const LEARNING_RATE: f64 = 0.01;

/// Standard deviation of the normal distribution used for weight initialization.
pub const INIT_STD: f64 = 0.1;

// ============================================================================
// Topology
// ============================================================================

pub const INPUT_NEURONS: usize = 3;
pub const HIDDEN_NEURONS: usize = 5;
pub const OUTPUT_NEURONS: usize = 2;

// ============================================================================
// Interconnect
// ============================================================================

/// Ticks needed to carry one packet across an interconnect.
pub const LATENCY: Tick = 10;

/// Values an interconnect may have queued in one time unit.
pub const BANDWIDTH: usize = 10;

// ============================================================================
// Training
// ============================================================================

pub const MAX_EPOCHS: usize = 1;

// ============================================================================
// Simulation
// ============================================================================

pub const CLOCK_PERIOD: Tick = 1;

/// Ticks between two steps of the single-unit trainer.
pub const SINGLE_UNIT_STEP_INTERVAL: Tick = 100;

pub const SINGLE_UNIT_STEPS: usize = 100;

// serde default hooks

pub(crate) fn learning_rate() -> f64 {
    LEARNING_RATE
}

pub(crate) fn init_std() -> f64 {
    INIT_STD
}

pub(crate) fn latency() -> Tick {
    LATENCY
}

pub(crate) fn bandwidth() -> usize {
    BANDWIDTH
}

pub(crate) fn max_epochs() -> usize {
    MAX_EPOCHS
}

pub(crate) fn clock_period() -> Tick {
    CLOCK_PERIOD
}
