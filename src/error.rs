//! Errors raised by the simulator core

use thiserror::Error;

use crate::clock::Tick;

pub type Result<T> = std::result::Result<T, RnnError>;

/// Fatal errors surfaced by neurons, interconnects, the network and the trainers.
///
/// None of these are recovered locally: a run that hits one is aborted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RnnError {
    /// A vector did not have the length its consumer expects
    #[error("shape mismatch in {context}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// More values were queued on an interconnect than it can carry in one time unit
    #[error(
        "{link} over bandwidth {bandwidth} at tick {at}: {requested} sent with {queued} queued"
    )]
    BandwidthExceeded {
        link: String,
        at: Tick,
        requested: usize,
        queued: usize,
        bandwidth: usize,
    },

    /// `backward` was called on a neuron with no matching `forward`
    #[error("backward called on neuron {neuron} without a preceding forward")]
    UnpairedBackward { neuron: usize },

    /// Inconsistent parameters detected while building an entity
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RnnError {
    pub(crate) fn shape(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        RnnError::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        RnnError::Configuration(message.into())
    }
}
