//! Simulation configuration
//!
//! Every simulated entity is built from a plain, validated struct. A whole run
//! is described by [`SimConfig`], which can be loaded from a TOML file:
//!
//! ```toml
//! [network]
//! layers = { input = 3, hidden = 5, output = 2 }
//! timing = "timed"
//!
//! [network.input_to_hidden]
//! latency = 10
//! bandwidth = 10
//!
//! [training]
//! training_data = [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
//! target_outputs = [[0.4, 0.5], [0.7, 0.8]]
//! max_epochs = 30000
//! ```
//!
//! Missing sections and fields fall back to [`defaults`]. Unknown keys are rejected.

pub mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::activation::Activation;
use crate::clock::Tick;
use crate::error::RnnError;
use crate::neuron::LayerRole;

/// Errors while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] RnnError),
}

/// Parameters of a single neuron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeuronConfig {
    pub id: usize,
    pub role: LayerRole,
    pub num_inputs: usize,
    #[serde(default)]
    pub num_recurrent_inputs: usize,
    /// Explicit input weights; drawn from the seed when absent
    #[serde(default)]
    pub input_weights: Option<Vec<f64>>,
    /// Explicit recurrent weights; drawn from the seed when absent
    #[serde(default)]
    pub recurrent_weights: Option<Vec<f64>>,
    /// Explicit bias; drawn from the seed when absent
    #[serde(default)]
    pub bias: Option<f64>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "defaults::learning_rate")]
    pub learning_rate: f64,
    /// Seed for weight initialization; the neuron id when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "defaults::init_std")]
    pub init_std: f64,
}

impl NeuronConfig {
    pub fn new(id: usize, role: LayerRole, num_inputs: usize) -> Self {
        NeuronConfig {
            id,
            role,
            num_inputs,
            num_recurrent_inputs: 0,
            input_weights: None,
            recurrent_weights: None,
            bias: None,
            activation: Activation::default(),
            learning_rate: defaults::LEARNING_RATE,
            seed: None,
            init_std: defaults::INIT_STD,
        }
    }

    pub fn with_recurrent_inputs(mut self, count: usize) -> Self {
        self.num_recurrent_inputs = count;
        self
    }

    pub fn with_input_weights(mut self, weights: Vec<f64>) -> Self {
        self.input_weights = Some(weights);
        self
    }

    pub fn with_recurrent_weights(mut self, weights: Vec<f64>) -> Self {
        self.recurrent_weights = Some(weights);
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seed actually used for initialization
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or(self.id as u64)
    }
}

/// Neuron counts per layer, used to generate a fully connected topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSizes {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
}

/// Latency and throughput of one interconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterconnectConfig {
    #[serde(default = "defaults::latency")]
    pub latency: Tick,
    #[serde(default = "defaults::bandwidth")]
    pub bandwidth: usize,
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        InterconnectConfig {
            latency: defaults::LATENCY,
            bandwidth: defaults::BANDWIDTH,
        }
    }
}

impl InterconnectConfig {
    pub fn new(latency: Tick, bandwidth: usize) -> Self {
        InterconnectConfig { latency, bandwidth }
    }

    pub fn validate(&self, link: &str) -> Result<(), RnnError> {
        if self.bandwidth == 0 {
            return Err(RnnError::config(format!(
                "{link}: bandwidth must be at least one value per time unit"
            )));
        }
        Ok(())
    }
}

/// Whether interconnect latency and bandwidth are modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Transfers take `latency` ticks and are limited by `bandwidth`
    #[default]
    Timed,
    /// Transfers are instantaneous and unlimited
    Untimed,
}

/// When hidden recurrent state is zeroed during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Once at the start of every epoch
    #[default]
    PerEpoch,
    /// Before every training sample
    PerSample,
    /// Never; state carries across epochs
    Never,
}

/// Topology, interconnects and BPTT settings of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Generate neurons from layer sizes; the default 3/5/2 topology when
    /// neither `layers` nor `neurons` is given
    #[serde(default)]
    pub layers: Option<LayerSizes>,
    /// Explicit neurons, in order; takes the place of `layers`
    #[serde(default)]
    pub neurons: Vec<NeuronConfig>,
    /// Activation of generated neurons
    #[serde(default)]
    pub activation: Activation,
    /// Learning rate of generated neurons
    #[serde(default = "defaults::learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub input_to_hidden: InterconnectConfig,
    #[serde(default)]
    pub hidden_to_hidden: InterconnectConfig,
    #[serde(default)]
    pub hidden_to_output: InterconnectConfig,
    #[serde(default)]
    pub timing: TimingMode,
    /// Recurrent hops a gradient may cross; unlimited when absent
    #[serde(default)]
    pub bptt_depth: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig::layered(
            defaults::INPUT_NEURONS,
            defaults::HIDDEN_NEURONS,
            defaults::OUTPUT_NEURONS,
        )
    }
}

impl NetworkConfig {
    /// A fully connected network with the given layer sizes
    pub fn layered(input: usize, hidden: usize, output: usize) -> Self {
        NetworkConfig {
            layers: Some(LayerSizes {
                input,
                hidden,
                output,
            }),
            neurons: Vec::new(),
            activation: Activation::default(),
            learning_rate: defaults::LEARNING_RATE,
            input_to_hidden: InterconnectConfig::default(),
            hidden_to_hidden: InterconnectConfig::default(),
            hidden_to_output: InterconnectConfig::default(),
            timing: TimingMode::default(),
            bptt_depth: None,
        }
    }

    /// A network built from explicit neuron configurations
    pub fn from_neurons(neurons: Vec<NeuronConfig>) -> Self {
        NetworkConfig {
            layers: None,
            neurons,
            ..NetworkConfig::layered(0, 0, 0)
        }
    }

    pub fn with_interconnects(mut self, link: InterconnectConfig) -> Self {
        self.input_to_hidden = link;
        self.hidden_to_hidden = link;
        self.hidden_to_output = link;
        self
    }

    pub fn with_timing(mut self, timing: TimingMode) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_bptt_depth(mut self, depth: Option<usize>) -> Self {
        self.bptt_depth = depth;
        self
    }

    /// Neuron configurations this network is made of.
    ///
    /// Explicit neurons win; otherwise neurons are generated from the layer sizes.
    /// Generated neurons get consecutive ids starting at zero, input layer first,
    /// and use their id as seed.
    pub fn resolve_neurons(&self) -> Result<Vec<NeuronConfig>, RnnError> {
        if !self.neurons.is_empty() {
            if self.layers.is_some() {
                return Err(RnnError::config(
                    "network declares both `layers` and `neurons`; use one of them",
                ));
            }
            return Ok(self.neurons.clone());
        }

        let sizes = self.layers.unwrap_or(LayerSizes {
            input: defaults::INPUT_NEURONS,
            hidden: defaults::HIDDEN_NEURONS,
            output: defaults::OUTPUT_NEURONS,
        });
        let mut neurons = Vec::with_capacity(sizes.input + sizes.hidden + sizes.output);
        let mut push = |role, num_inputs, num_recurrent| {
            let id = neurons.len();
            neurons.push(
                NeuronConfig::new(id, role, num_inputs)
                    .with_recurrent_inputs(num_recurrent)
                    .with_activation(self.activation)
                    .with_learning_rate(self.learning_rate),
            );
        };
        for _ in 0..sizes.input {
            push(LayerRole::Input, 1, 0);
        }
        for _ in 0..sizes.hidden {
            push(LayerRole::Hidden, sizes.input, sizes.hidden);
        }
        for _ in 0..sizes.output {
            push(LayerRole::Output, sizes.hidden, 0);
        }
        Ok(neurons)
    }
}

/// Training sequence and schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    #[serde(default)]
    pub training_data: Vec<Vec<f64>>,
    #[serde(default)]
    pub target_outputs: Vec<Vec<f64>>,
    #[serde(default = "defaults::max_epochs")]
    pub max_epochs: usize,
    /// Global learning rate; each neuron's own rate is used when absent
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub recurrent_reset: ResetPolicy,
    /// Restore initial weights and drop recorded losses at the start of every training run
    #[serde(default)]
    pub reinitialize_weights: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            training_data: vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]],
            target_outputs: vec![vec![0.4, 0.5], vec![0.7, 0.8]],
            max_epochs: defaults::MAX_EPOCHS,
            learning_rate: None,
            recurrent_reset: ResetPolicy::default(),
            reinitialize_weights: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), RnnError> {
        if self.max_epochs == 0 {
            return Err(RnnError::config("max_epochs must be at least 1"));
        }
        if let Some(rate) = self.learning_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(RnnError::config(format!(
                    "learning rate must be a positive finite number, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Clock settings of the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "defaults::clock_period")]
    pub clock_period: Tick,
    /// Stop after this many ticks even if training has not finished
    #[serde(default)]
    pub max_ticks: Option<Tick>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            clock_period: defaults::CLOCK_PERIOD,
            max_ticks: None,
        }
    }
}

/// A complete simulation run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl SimConfig {
    /// Load from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "Loaded simulation config");
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need the network to be built
    pub fn validate(&self) -> Result<(), RnnError> {
        self.network.input_to_hidden.validate("input_to_hidden")?;
        self.network.hidden_to_hidden.validate("hidden_to_hidden")?;
        self.network.hidden_to_output.validate("hidden_to_output")?;
        self.network.resolve_neurons()?;
        self.training.validate()?;
        if self.simulation.clock_period == 0 {
            return Err(RnnError::config("clock_period must be at least one tick"));
        }
        Ok(())
    }
}
