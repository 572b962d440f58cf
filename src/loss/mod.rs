//! Loss functions for training neural networks

mod mse;

pub use mse::MSELoss;

use crate::error::Result;

/// Common trait for loss functions
pub trait Loss {
    /// Calculate the loss between predictions and targets
    fn forward(predictions: &[f64], targets: &[f64]) -> Result<f64>;

    /// Calculate gradients of the loss with respect to the predictions
    fn backward(predictions: &[f64], targets: &[f64]) -> Result<Vec<f64>>;
}
