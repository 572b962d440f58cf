use super::Optimizer;
use crate::RnnNetwork;

/// Basic Stochastic Gradient Descent optimizer
#[derive(Debug, Clone, Copy)]
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    /// Create a new SGD optimizer with the specified learning rate
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, network: &mut RnnNetwork) {
        network.apply_gradients(self.learning_rate);
    }

    fn learning_rate(&self) -> Option<f64> {
        Some(self.learning_rate)
    }
}

/// Gradient descent where every neuron steps with its own learning rate
#[derive(Debug, Clone, Copy, Default)]
pub struct PerNeuronSGD;

impl Optimizer for PerNeuronSGD {
    fn step(&mut self, network: &mut RnnNetwork) {
        network.apply_own_gradients();
    }

    fn learning_rate(&self) -> Option<f64> {
        None
    }
}
