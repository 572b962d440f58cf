//! Optimizers for training neural networks

mod sgd;

pub use sgd::{PerNeuronSGD, SGD};

use crate::RnnNetwork;

/// Common trait for optimizers
pub trait Optimizer {
    /// Apply a single optimization step
    fn step(&mut self, network: &mut RnnNetwork);

    /// Rate reported in logs and training reports, if a single one applies
    fn learning_rate(&self) -> Option<f64>;
}
