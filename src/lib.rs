//! # RNN Simulator
//!
//! A clocked simulator of a recurrent neural network trained with
//! backpropagation through time.
//!
//! Neurons are grouped into input, hidden and output layers. Layers exchange
//! activations over interconnects that model transfer latency and bandwidth in
//! simulated ticks, and hidden activations are fed back to the hidden layer on
//! the next time step. A [`Trainer`] runs epochs over an ordered training
//! sequence, and every component can be driven by a [`Simulator`] through the
//! [`Clocked`] trait.

pub mod activation;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod interconnect;
pub mod loss;
mod network;
pub mod neuron;
pub mod optimizer;
pub mod single_unit;
pub mod trainer;

// Re-export main types
pub use activation::Activation;
pub use clock::{Activity, Clocked, ExitCause, ExitEvent, Simulator, Tick};
pub use config::{NetworkConfig, NeuronConfig, SimConfig};
pub use error::{Result, RnnError};
pub use interconnect::Interconnect;
pub use network::{NetworkStats, RnnNetwork};
pub use neuron::{LayerRole, Neuron};
pub use single_unit::SingleUnitTrainer;
pub use trainer::{CancelToken, Trainer, TrainingReport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
