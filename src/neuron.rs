use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::activation::Activation;
use crate::clock::{Activity, Clocked, Tick};
use crate::config::NeuronConfig;
use crate::error::{Result, RnnError};

// Estimated cost of each operation, in cycles
const MAC_CYCLES: u64 = 4;
const BIAS_CYCLES: u64 = 1;
const ACTIVATION_CYCLES: u64 = 5;
const DERIVATIVE_CYCLES: u64 = 5;
const WEIGHT_UPDATE_CYCLES: u64 = 13;
const BIAS_UPDATE_CYCLES: u64 = 10;

/// Layer a neuron belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerRole {
    #[serde(alias = "input")]
    Input,
    #[serde(alias = "hidden")]
    Hidden,
    #[serde(alias = "output")]
    Output,
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            LayerRole::Input => "INPUT",
            LayerRole::Hidden => "HIDDEN",
            LayerRole::Output => "OUTPUT",
        };
        f.write_str(role)
    }
}

/// Inputs and pre-activation of one forward evaluation, kept for the backward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardCache {
    pub(crate) inputs: Vec<f64>,
    pub(crate) recurrent_inputs: Vec<f64>,
    pub(crate) pre_activation: f64,
}

impl ForwardCache {
    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    pub fn recurrent_inputs(&self) -> &[f64] {
        &self.recurrent_inputs
    }

    pub fn pre_activation(&self) -> f64 {
        self.pre_activation
    }
}

/// Gradient accumulators, same layout as the parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub input_weights: Vec<f64>,
    pub recurrent_weights: Vec<f64>,
    pub bias: f64,
}

impl Gradients {
    fn zeros(num_inputs: usize, num_recurrent: usize) -> Self {
        Gradients {
            input_weights: vec![0.0; num_inputs],
            recurrent_weights: vec![0.0; num_recurrent],
            bias: 0.0,
        }
    }

    /// True when nothing has been accumulated since the last reset
    pub fn is_zero(&self) -> bool {
        self.bias == 0.0
            && self.input_weights.iter().all(|&g| g == 0.0)
            && self.recurrent_weights.iter().all(|&g| g == 0.0)
    }

    fn clear(&mut self) {
        self.input_weights.fill(0.0);
        self.recurrent_weights.fill(0.0);
        self.bias = 0.0;
    }
}

/// Counters describing the work a neuron has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NeuronStats {
    pub cycles: u64,
    pub activations: u64,
    pub backward_passes: u64,
    pub learning_updates: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct Parameters {
    input_weights: Vec<f64>,
    recurrent_weights: Vec<f64>,
    bias: f64,
}

/// A single recurrent neuron
#[derive(Debug, Clone)]
pub struct Neuron {
    id: usize,
    role: LayerRole,
    activation: Activation,
    learning_rate: f64,
    input_weights: Vec<f64>,
    recurrent_weights: Vec<f64>,
    bias: f64,
    /// Last computed activation
    output: Option<f64>,
    cache: Option<ForwardCache>,
    gradients: Gradients,
    initial: Parameters,
    pending_cycles: u64,
    clock: Tick,
    stats: NeuronStats,
}

impl Neuron {
    /// Build a neuron, drawing any parameter not given explicitly from its seed.
    ///
    /// Draw order is input weights, recurrent weights, then bias, each from
    /// `Normal(0, init_std)`.
    pub fn new(config: &NeuronConfig) -> Result<Self> {
        if config.role != LayerRole::Hidden && config.num_recurrent_inputs != 0 {
            return Err(RnnError::config(format!(
                "neuron {}: {} neurons take no recurrent inputs, got {}",
                config.id, config.role, config.num_recurrent_inputs
            )));
        }
        if !config.init_std.is_finite() || config.init_std < 0.0 {
            return Err(RnnError::config(format!(
                "neuron {}: init_std must be a non-negative finite number",
                config.id
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.effective_seed());
        let dist = Normal::new(0.0, config.init_std)
            .map_err(|e| RnnError::config(format!("neuron {}: {e}", config.id)))?;

        let input_weights = match &config.input_weights {
            Some(weights) if weights.len() != config.num_inputs => {
                return Err(RnnError::shape(
                    format!("neuron {} input weights", config.id),
                    config.num_inputs,
                    weights.len(),
                ));
            }
            Some(weights) => weights.clone(),
            None => (0..config.num_inputs).map(|_| dist.sample(&mut rng)).collect(),
        };

        let recurrent_weights = match &config.recurrent_weights {
            Some(weights) if weights.len() != config.num_recurrent_inputs => {
                return Err(RnnError::shape(
                    format!("neuron {} recurrent weights", config.id),
                    config.num_recurrent_inputs,
                    weights.len(),
                ));
            }
            Some(weights) => weights.clone(),
            None => (0..config.num_recurrent_inputs)
                .map(|_| dist.sample(&mut rng))
                .collect(),
        };

        let bias = config.bias.unwrap_or_else(|| dist.sample(&mut rng));

        debug!(
            id = config.id,
            role = %config.role,
            inputs = config.num_inputs,
            recurrent = config.num_recurrent_inputs,
            "Created neuron"
        );

        Ok(Neuron {
            id: config.id,
            role: config.role,
            activation: config.activation,
            learning_rate: config.learning_rate,
            gradients: Gradients::zeros(input_weights.len(), recurrent_weights.len()),
            initial: Parameters {
                input_weights: input_weights.clone(),
                recurrent_weights: recurrent_weights.clone(),
                bias,
            },
            input_weights,
            recurrent_weights,
            bias,
            output: None,
            cache: None,
            pending_cycles: 0,
            clock: 0,
            stats: NeuronStats::default(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    pub fn activation_fn(&self) -> Activation {
        self.activation
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn num_inputs(&self) -> usize {
        self.input_weights.len()
    }

    pub fn num_recurrent_inputs(&self) -> usize {
        self.recurrent_weights.len()
    }

    pub fn input_weights(&self) -> &[f64] {
        &self.input_weights
    }

    #[cfg(test)]
    pub(crate) fn input_weights_mut(&mut self) -> &mut [f64] {
        &mut self.input_weights
    }

    pub fn recurrent_weights(&self) -> &[f64] {
        &self.recurrent_weights
    }

    #[cfg(test)]
    pub(crate) fn recurrent_weights_mut(&mut self) -> &mut [f64] {
        &mut self.recurrent_weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    #[cfg(test)]
    pub(crate) fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    /// Activation from the most recent forward evaluation, if any
    pub fn output(&self) -> Option<f64> {
        self.output
    }

    /// Cache of the forward evaluation still waiting for its backward pass
    pub fn forward_cache(&self) -> Option<&ForwardCache> {
        self.cache.as_ref()
    }

    pub fn gradients(&self) -> &Gradients {
        &self.gradients
    }

    pub fn stats(&self) -> NeuronStats {
        self.stats
    }

    /// Cycles charged but not yet drained by the clock
    pub fn pending_cycles(&self) -> u64 {
        self.pending_cycles
    }

    /// Latch an external value as this neuron's activation, unchanged.
    ///
    /// Input neurons pass their feature through this way: no activation, no
    /// cache and nothing to train.
    pub fn set_state(&mut self, value: f64) {
        self.output = Some(value);
        self.cache = None;
    }

    /// Forward evaluation: `f(x·w + r·u + b)`
    pub fn forward(&mut self, inputs: &[f64], recurrent_inputs: &[f64]) -> Result<f64> {
        if inputs.len() != self.input_weights.len() {
            return Err(RnnError::shape(
                format!("neuron {} inputs", self.id),
                self.input_weights.len(),
                inputs.len(),
            ));
        }
        if recurrent_inputs.len() != self.recurrent_weights.len() {
            return Err(RnnError::shape(
                format!("neuron {} recurrent inputs", self.id),
                self.recurrent_weights.len(),
                recurrent_inputs.len(),
            ));
        }

        let weighted: f64 = dot(inputs, &self.input_weights);
        let recurrent: f64 = dot(recurrent_inputs, &self.recurrent_weights);
        let z = weighted + recurrent + self.bias;
        let output = self.activation.apply(z);

        trace!(id = self.id, weighted, recurrent, bias = self.bias, "weighted sums");
        debug!(id = self.id, z, output, "Activated neuron");

        self.cache = Some(ForwardCache {
            inputs: inputs.to_vec(),
            recurrent_inputs: recurrent_inputs.to_vec(),
            pre_activation: z,
        });
        self.output = Some(output);
        self.charge(
            (inputs.len() + recurrent_inputs.len()) as u64 * MAC_CYCLES
                + BIAS_CYCLES
                + ACTIVATION_CYCLES,
        );
        self.stats.activations += 1;

        Ok(output)
    }

    /// Backward pass for the most recent forward evaluation.
    ///
    /// Accumulates parameter gradients and returns the gradients with respect to
    /// the external and recurrent inputs. Consumes the forward cache, so each
    /// forward pairs with exactly one backward.
    pub fn backward(&mut self, grad_output: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        let cache = self
            .cache
            .take()
            .ok_or(RnnError::UnpairedBackward { neuron: self.id })?;
        Ok(self.backward_from(&cache, grad_output))
    }

    /// Backward pass against an earlier forward evaluation
    pub(crate) fn backward_from(
        &mut self,
        cache: &ForwardCache,
        grad_output: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        let grad_z = grad_output * self.activation.derivative(cache.pre_activation);

        for (g, &x) in self.gradients.input_weights.iter_mut().zip(&cache.inputs) {
            *g += grad_z * x;
        }
        for (g, &r) in self
            .gradients
            .recurrent_weights
            .iter_mut()
            .zip(&cache.recurrent_inputs)
        {
            *g += grad_z * r;
        }
        self.gradients.bias += grad_z;

        let grad_inputs = self.input_weights.iter().map(|&w| grad_z * w).collect();
        let grad_recurrent = self.recurrent_weights.iter().map(|&u| grad_z * u).collect();

        self.charge(
            DERIVATIVE_CYCLES
                + (cache.inputs.len() + cache.recurrent_inputs.len()) as u64 * MAC_CYCLES
                + BIAS_CYCLES,
        );
        self.stats.backward_passes += 1;
        trace!(id = self.id, grad_output, grad_z, "backward");

        (grad_inputs, grad_recurrent)
    }

    /// Apply accumulated gradients using a learning rate, then clear them
    pub fn apply_gradients(&mut self, learning_rate: f64) {
        for (w, g) in self
            .input_weights
            .iter_mut()
            .zip(&self.gradients.input_weights)
        {
            *w -= learning_rate * g;
        }
        for (u, g) in self
            .recurrent_weights
            .iter_mut()
            .zip(&self.gradients.recurrent_weights)
        {
            *u -= learning_rate * g;
        }
        self.bias -= learning_rate * self.gradients.bias;

        debug!(
            id = self.id,
            learning_rate,
            bias = self.bias,
            grad_bias = self.gradients.bias,
            "Applied gradients"
        );

        self.gradients.clear();
        self.charge(
            (self.input_weights.len() + self.recurrent_weights.len()) as u64
                * WEIGHT_UPDATE_CYCLES
                + BIAS_UPDATE_CYCLES,
        );
        self.stats.learning_updates += 1;
    }

    /// Apply accumulated gradients with this neuron's own learning rate
    pub fn apply_own_gradients(&mut self) {
        self.apply_gradients(self.learning_rate);
    }

    /// Restore the parameters the neuron was built with and drop transient state
    pub fn reinitialize(&mut self) {
        self.input_weights.clone_from(&self.initial.input_weights);
        self.recurrent_weights
            .clone_from(&self.initial.recurrent_weights);
        self.bias = self.initial.bias;
        self.output = None;
        self.cache = None;
        self.gradients.clear();
    }

    fn charge(&mut self, cycles: u64) {
        self.pending_cycles += cycles;
        self.stats.cycles += cycles;
    }
}

impl Clocked for Neuron {
    /// Drain charged compute cycles, one per elapsed tick
    fn tick(&mut self, now: Tick) -> Result<Activity> {
        let elapsed = now.saturating_sub(self.clock);
        self.clock = self.clock.max(now);
        self.pending_cycles = self.pending_cycles.saturating_sub(elapsed);
        Ok(if self.pending_cycles > 0 {
            Activity::Busy
        } else {
            Activity::Idle
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, w)| x * w).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden(weights: Vec<f64>, recurrent: Vec<f64>, bias: f64) -> Neuron {
        let config = NeuronConfig::new(1, LayerRole::Hidden, weights.len())
            .with_recurrent_inputs(recurrent.len())
            .with_input_weights(weights)
            .with_recurrent_weights(recurrent)
            .with_bias(bias);
        Neuron::new(&config).unwrap()
    }

    #[test]
    fn test_neuron_forward_tanh() {
        let config = NeuronConfig::new(0, LayerRole::Output, 3)
            .with_input_weights(vec![1.0, 1.0, 1.0])
            .with_bias(0.0);
        let mut neuron = Neuron::new(&config).unwrap();

        assert_eq!(neuron.output(), None);
        let output = neuron.forward(&[1.0, 0.0, 0.0], &[]).unwrap();

        assert!((output - 1.0f64.tanh()).abs() < 1e-12);
        assert!((output - 0.7616).abs() < 1e-4);
        assert_eq!(neuron.output(), Some(output));
    }

    #[test]
    fn test_neuron_forward_with_recurrent_inputs() {
        let mut neuron = hidden(vec![0.5, -0.3, 0.8], vec![0.1, 0.1, 0.1], 0.2);
        let output = neuron
            .forward(&[1.0, 0.5, -0.2], &[0.3, 0.3, 0.3])
            .unwrap();

        let z = 0.5 - 0.15 - 0.16 + 0.09 + 0.2;
        assert!((output - f64::tanh(z)).abs() < 1e-12);
        assert!((neuron.forward_cache().unwrap().pre_activation() - z).abs() < 1e-12);
    }

    #[test]
    fn test_neuron_shape_checks() {
        let mut neuron = hidden(vec![0.5, -0.3], vec![0.1], 0.0);

        assert!(matches!(
            neuron.forward(&[1.0], &[0.0]),
            Err(RnnError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            neuron.forward(&[1.0, 1.0], &[]),
            Err(RnnError::ShapeMismatch { expected: 1, actual: 0, .. })
        ));

        let config = NeuronConfig::new(4, LayerRole::Hidden, 3)
            .with_recurrent_inputs(2)
            .with_input_weights(vec![1.0, 2.0]);
        assert!(matches!(
            Neuron::new(&config),
            Err(RnnError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_recurrent_inputs_only_for_hidden() {
        let config = NeuronConfig::new(0, LayerRole::Output, 2).with_recurrent_inputs(1);
        assert!(matches!(
            Neuron::new(&config),
            Err(RnnError::Configuration(_))
        ));
    }

    #[test]
    fn test_neuron_backward() {
        let mut neuron = hidden(vec![0.5, -0.3], vec![0.2], 0.1);
        neuron.forward(&[1.0, 2.0], &[0.5]).unwrap();
        let z: f64 = 0.5 - 0.6 + 0.1 + 0.1;
        let grad_z = 0.8 * (1.0 - z.tanh().powi(2));

        let (grad_inputs, grad_recurrent) = neuron.backward(0.8).unwrap();

        assert!((grad_inputs[0] - grad_z * 0.5).abs() < 1e-12);
        assert!((grad_inputs[1] + grad_z * 0.3).abs() < 1e-12);
        assert!((grad_recurrent[0] - grad_z * 0.2).abs() < 1e-12);

        let gradients = neuron.gradients();
        assert!((gradients.input_weights[0] - grad_z).abs() < 1e-12);
        assert!((gradients.input_weights[1] - 2.0 * grad_z).abs() < 1e-12);
        assert!((gradients.recurrent_weights[0] - 0.5 * grad_z).abs() < 1e-12);
        assert!((gradients.bias - grad_z).abs() < 1e-12);
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut neuron = hidden(vec![0.5], vec![0.1], 0.0);
        assert_eq!(
            neuron.backward(1.0),
            Err(RnnError::UnpairedBackward { neuron: 1 })
        );

        neuron.forward(&[1.0], &[0.0]).unwrap();
        neuron.backward(1.0).unwrap();
        assert_eq!(
            neuron.backward(1.0),
            Err(RnnError::UnpairedBackward { neuron: 1 })
        );
    }

    #[test]
    fn test_apply_gradients_clears_accumulators() {
        let mut neuron = hidden(vec![0.5, -0.3], vec![0.2], 0.1);
        neuron.forward(&[1.0, 2.0], &[0.5]).unwrap();
        neuron.backward(0.8).unwrap();

        let before = neuron.gradients().clone();
        assert!(!before.is_zero());
        let w0 = neuron.input_weights()[0];
        let u0 = neuron.recurrent_weights()[0];
        let b = neuron.bias();

        neuron.apply_gradients(0.1);

        let expected_w0 = w0 - 0.1 * before.input_weights[0];
        let expected_u0 = u0 - 0.1 * before.recurrent_weights[0];
        assert!((neuron.input_weights()[0] - expected_w0).abs() < 1e-12);
        assert!((neuron.recurrent_weights()[0] - expected_u0).abs() < 1e-12);
        assert!((neuron.bias() - (b - 0.1 * before.bias)).abs() < 1e-12);
        assert!(neuron.gradients().is_zero());
        assert_eq!(neuron.stats().learning_updates, 1);
    }

    #[test]
    fn test_seeded_initialization_is_deterministic() {
        let config = NeuronConfig::new(3, LayerRole::Hidden, 3).with_recurrent_inputs(5);
        let a = Neuron::new(&config).unwrap();
        let b = Neuron::new(&config).unwrap();
        assert_eq!(a.input_weights(), b.input_weights());
        assert_eq!(a.recurrent_weights(), b.recurrent_weights());
        assert_eq!(a.bias(), b.bias());

        let c = Neuron::new(&config.clone().with_seed(99)).unwrap();
        assert_ne!(a.input_weights(), c.input_weights());

        // Small weights drawn around zero
        assert!(a.input_weights().iter().all(|w| w.abs() < 1.0));
        assert_eq!(a.recurrent_weights().len(), 5);
    }

    #[test]
    fn test_reinitialize_restores_parameters() {
        let mut neuron = hidden(vec![0.5, -0.3], vec![0.2], 0.1);
        neuron.forward(&[1.0, 2.0], &[0.5]).unwrap();
        neuron.backward(0.8).unwrap();
        neuron.apply_gradients(0.5);
        assert_ne!(neuron.input_weights(), &[0.5, -0.3]);

        neuron.reinitialize();
        assert_eq!(neuron.input_weights(), &[0.5, -0.3]);
        assert_eq!(neuron.recurrent_weights(), &[0.2]);
        assert_eq!(neuron.bias(), 0.1);
        assert_eq!(neuron.output(), None);
    }

    #[test]
    fn test_clock_drains_cycles() {
        let mut neuron = hidden(vec![0.5, -0.3, 0.8], vec![], 0.0);
        neuron.forward(&[1.0, 0.5, -0.2], &[]).unwrap();

        // 3 multiply-accumulates, bias add, tanh
        assert_eq!(neuron.pending_cycles(), 3 * 4 + 1 + 5);
        assert_eq!(neuron.tick(10).unwrap(), Activity::Busy);
        assert_eq!(neuron.pending_cycles(), 8);
        assert_eq!(neuron.tick(18).unwrap(), Activity::Idle);
        assert_eq!(neuron.stats().cycles, 18);
    }

    #[test]
    fn test_backward_cycles() {
        let mut neuron = hidden(vec![0.5, -0.3], vec![0.2], 0.0);
        neuron.forward(&[1.0, 0.5], &[0.1]).unwrap();
        let after_forward = neuron.stats().cycles;

        neuron.backward(1.0).unwrap();
        // derivative, one term per weight gradient, bias gradient
        assert_eq!(neuron.stats().cycles - after_forward, 5 + 3 * 4 + 1);
    }

    #[test]
    fn test_set_state_passes_value_through() {
        let mut neuron = hidden(vec![0.5], vec![], 0.3);
        neuron.set_state(-0.25);
        assert_eq!(neuron.output(), Some(-0.25));
        assert!(neuron.forward_cache().is_none());
        assert_eq!(neuron.stats().activations, 0);
        assert!(matches!(
            neuron.backward(1.0),
            Err(RnnError::UnpairedBackward { .. })
        ));
    }
}
