use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::clock::{Activity, Clocked, Tick};
use crate::config::{NetworkConfig, TimingMode};
use crate::error::{Result, RnnError};
use crate::interconnect::{Interconnect, InterconnectStats};
use crate::neuron::{ForwardCache, LayerRole, Neuron, NeuronStats};

/// Hidden-layer forward caches of one time step, kept for backpropagation through time
#[derive(Debug, Clone)]
struct StepTrace {
    hidden: Vec<ForwardCache>,
}

/// Aggregated counters of a network
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct NetworkStats {
    pub neurons: NeuronStats,
    pub input_to_hidden: InterconnectStats,
    pub hidden_to_hidden: InterconnectStats,
    pub hidden_to_output: InterconnectStats,
}

/// A recurrent network: input, hidden and output layers joined by three interconnects.
///
/// Hidden neurons receive every input activation and, through the recurrent
/// interconnect, every hidden activation of the previous time step.
#[derive(Debug, Clone)]
pub struct RnnNetwork {
    input: Vec<Neuron>,
    hidden: Vec<Neuron>,
    output: Vec<Neuron>,
    input_to_hidden: Interconnect,
    hidden_to_hidden: Interconnect,
    hidden_to_output: Interconnect,
    timing: TimingMode,
    bptt_depth: Option<usize>,
    /// Hidden activations of the last evaluated step
    previous_hidden: Vec<f64>,
    /// Latest evaluated step, until it is backpropagated
    pending: Option<StepTrace>,
    /// Backpropagated steps since the last reset or gradient application
    history: VecDeque<StepTrace>,
    /// Simulated time reached by the last transfer
    now: Tick,
}

impl RnnNetwork {
    /// Build a network and check that the layers fit together
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let neuron_configs = config.resolve_neurons()?;

        let mut ids = HashSet::new();
        let mut input = Vec::new();
        let mut hidden = Vec::new();
        let mut output = Vec::new();
        for neuron_config in &neuron_configs {
            if !ids.insert(neuron_config.id) {
                return Err(RnnError::config(format!(
                    "duplicate neuron id {}",
                    neuron_config.id
                )));
            }
            let neuron = Neuron::new(neuron_config)?;
            match neuron.role() {
                LayerRole::Input => input.push(neuron),
                LayerRole::Hidden => hidden.push(neuron),
                LayerRole::Output => output.push(neuron),
            }
        }

        for (role, layer) in [
            (LayerRole::Input, &input),
            (LayerRole::Hidden, &hidden),
            (LayerRole::Output, &output),
        ] {
            if layer.is_empty() {
                return Err(RnnError::config(format!("{role} layer has no neurons")));
            }
        }

        check_layer(&input, 1, 0)?;
        check_layer(&hidden, input.len(), hidden.len())?;
        check_layer(&output, hidden.len(), 0)?;

        let network = RnnNetwork {
            input_to_hidden: Interconnect::new("input_to_hidden", &config.input_to_hidden)?,
            hidden_to_hidden: Interconnect::new("hidden_to_hidden", &config.hidden_to_hidden)?,
            hidden_to_output: Interconnect::new("hidden_to_output", &config.hidden_to_output)?,
            timing: config.timing,
            bptt_depth: config.bptt_depth,
            previous_hidden: vec![0.0; hidden.len()],
            pending: None,
            history: VecDeque::new(),
            now: 0,
            input,
            hidden,
            output,
        };

        debug!(
            input = network.input.len(),
            hidden = network.hidden.len(),
            output = network.output.len(),
            timing = ?network.timing,
            bptt_depth = ?network.bptt_depth,
            "Created RNN"
        );
        Ok(network)
    }

    pub fn input_size(&self) -> usize {
        self.input.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden.len()
    }

    pub fn output_size(&self) -> usize {
        self.output.len()
    }

    pub fn input_layer(&self) -> &[Neuron] {
        &self.input
    }

    pub fn hidden_layer(&self) -> &[Neuron] {
        &self.hidden
    }

    pub fn output_layer(&self) -> &[Neuron] {
        &self.output
    }

    pub fn neurons(&self) -> impl Iterator<Item = &Neuron> {
        self.input.iter().chain(&self.hidden).chain(&self.output)
    }

    fn neurons_mut(&mut self) -> impl Iterator<Item = &mut Neuron> {
        self.input
            .iter_mut()
            .chain(&mut self.hidden)
            .chain(&mut self.output)
    }

    /// Neurons with parameters; input neurons only pass features through
    fn trainable_mut(&mut self) -> impl Iterator<Item = &mut Neuron> {
        self.hidden.iter_mut().chain(&mut self.output)
    }

    pub fn neuron(&self, id: usize) -> Option<&Neuron> {
        self.neurons().find(|n| n.id() == id)
    }

    pub fn neuron_mut(&mut self, id: usize) -> Option<&mut Neuron> {
        self.neurons_mut().find(|n| n.id() == id)
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    pub fn bptt_depth(&self) -> Option<usize> {
        self.bptt_depth
    }

    /// Hidden activations that feed the next step's recurrent inputs
    pub fn recurrent_state(&self) -> &[f64] {
        &self.previous_hidden
    }

    /// Simulated time reached by the network's transfers
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Move simulated time forward to `t`; never moves it back
    pub fn advance_to(&mut self, t: Tick) {
        self.now = self.now.max(t);
    }

    /// Number of earlier backpropagated steps a gradient can currently reach
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut neurons = NeuronStats::default();
        for n in self.neurons() {
            let s = n.stats();
            neurons.cycles += s.cycles;
            neurons.activations += s.activations;
            neurons.backward_passes += s.backward_passes;
            neurons.learning_updates += s.learning_updates;
        }
        NetworkStats {
            neurons,
            input_to_hidden: self.input_to_hidden.stats(),
            hidden_to_hidden: self.hidden_to_hidden.stats(),
            hidden_to_output: self.hidden_to_output.stats(),
        }
    }

    /// Run one time step and return the output activations.
    ///
    /// The hidden activations computed here become the recurrent input of the
    /// next call.
    pub fn evaluate(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input.len() {
            return Err(RnnError::shape("network input", self.input.len(), input.len()));
        }

        for (neuron, &x) in self.input.iter_mut().zip(input) {
            neuron.set_state(x);
        }

        let hidden_inputs = relay(&mut self.input_to_hidden, self.timing, &mut self.now, input)?;
        let recurrent_inputs = self.receive_recurrent();

        let hidden_acts = self
            .hidden
            .iter_mut()
            .map(|neuron| neuron.forward(&hidden_inputs, &recurrent_inputs))
            .collect::<Result<Vec<_>>>()?;

        if self.timing == TimingMode::Timed {
            self.hidden_to_hidden.send(&hidden_acts, self.now)?;
        }

        let output_inputs = relay(
            &mut self.hidden_to_output,
            self.timing,
            &mut self.now,
            &hidden_acts,
        )?;
        let outputs = self
            .output
            .iter_mut()
            .map(|neuron| neuron.forward(&output_inputs, &[]))
            .collect::<Result<Vec<_>>>()?;

        self.record_step();
        self.previous_hidden = hidden_acts;

        debug!(now = self.now, ?outputs, "Evaluated time step");
        Ok(outputs)
    }

    /// Recurrent inputs for the current step: the previous hidden activations,
    /// waiting for their packet if it is still in transit
    fn receive_recurrent(&mut self) -> Vec<f64> {
        match self.timing {
            TimingMode::Untimed => self.previous_hidden.clone(),
            TimingMode::Timed => match self.hidden_to_hidden.next_arrival() {
                Some(arrival) => {
                    self.now = self.now.max(arrival);
                    self.hidden_to_hidden.deliver(self.now)
                }
                None => vec![0.0; self.hidden.len()],
            },
        }
    }

    fn record_step(&mut self) {
        let hidden = self
            .hidden
            .iter()
            .filter_map(|n| n.forward_cache().cloned())
            .collect();
        // A step evaluated without a backward pass breaks the chain of steps
        // a gradient may cross
        if self.pending.replace(StepTrace { hidden }).is_some() {
            self.history.clear();
        }
    }

    /// Backpropagate the loss gradient of the latest step through time.
    ///
    /// Gradients flow output → hidden for the latest step, then cross the
    /// recurrent edge into earlier backpropagated steps, up to `bptt_depth` hops
    /// (or back to the last reset when unlimited). Parameter gradients
    /// accumulate until [`apply_gradients`](Self::apply_gradients).
    pub fn backpropagate(&mut self, output_gradient: &[f64]) -> Result<()> {
        if output_gradient.len() != self.output.len() {
            return Err(RnnError::shape(
                "output gradient",
                self.output.len(),
                output_gradient.len(),
            ));
        }

        let mut grad_hidden = vec![0.0; self.hidden.len()];
        for (neuron, &g) in self.output.iter_mut().zip(output_gradient) {
            let (grad_inputs, _) = neuron.backward(g)?;
            add_assign(&mut grad_hidden, &grad_inputs);
        }

        // Latest step: each neuron's own pending forward
        let mut grad_previous = vec![0.0; self.hidden.len()];
        for (neuron, &g) in self.hidden.iter_mut().zip(&grad_hidden) {
            let (_, grad_recurrent) = neuron.backward(g)?;
            add_assign(&mut grad_previous, &grad_recurrent);
        }

        // Earlier steps, through the recurrent edge
        let hops = self
            .bptt_depth
            .map_or(self.history.len(), |depth| self.history.len().min(depth));
        for trace in self.history.iter().rev().take(hops) {
            let mut grad_earlier = vec![0.0; self.hidden.len()];
            let steps = self.hidden.iter_mut().zip(&trace.hidden).zip(&grad_previous);
            for ((neuron, cache), &g) in steps {
                let (_, grad_recurrent) = neuron.backward_from(cache, g);
                add_assign(&mut grad_earlier, &grad_recurrent);
            }
            grad_previous = grad_earlier;
        }

        if let Some(trace) = self.pending.take() {
            self.history.push_back(trace);
        }
        if let Some(depth) = self.bptt_depth {
            while self.history.len() > depth {
                self.history.pop_front();
            }
        }
        Ok(())
    }

    /// Apply accumulated gradients on every hidden and output neuron with one learning rate
    pub fn apply_gradients(&mut self, learning_rate: f64) {
        for neuron in self.trainable_mut() {
            neuron.apply_gradients(learning_rate);
        }
        self.history.clear();
    }

    /// Apply accumulated gradients on every hidden and output neuron with its own rate
    pub fn apply_own_gradients(&mut self) {
        for neuron in self.trainable_mut() {
            neuron.apply_own_gradients();
        }
        self.history.clear();
    }

    /// Zero the recurrent state and forget the time steps behind it
    pub fn reset_recurrent_state(&mut self) {
        self.previous_hidden.fill(0.0);
        self.hidden_to_hidden.clear();
        self.pending = None;
        self.history.clear();
    }

    /// Restore every neuron's initial parameters and zero the recurrent state
    pub fn reinitialize(&mut self) {
        for neuron in self.neurons_mut() {
            neuron.reinitialize();
        }
        self.reset_recurrent_state();
    }
}

impl Clocked for RnnNetwork {
    /// Busy while a neuron is still computing, a packet is in transit, or the
    /// last transfer has not been reached yet
    fn tick(&mut self, now: Tick) -> Result<Activity> {
        let mut busy = now < self.now;
        for neuron in self.neurons_mut() {
            busy |= neuron.tick(now)? == Activity::Busy;
        }
        for link in [
            &mut self.input_to_hidden,
            &mut self.hidden_to_hidden,
            &mut self.hidden_to_output,
        ] {
            busy |= link.tick(now)? == Activity::Busy;
        }
        Ok(if busy { Activity::Busy } else { Activity::Idle })
    }
}

fn check_layer(layer: &[Neuron], num_inputs: usize, num_recurrent: usize) -> Result<()> {
    for neuron in layer {
        if neuron.num_inputs() != num_inputs {
            return Err(RnnError::config(format!(
                "{} neuron {} takes {} inputs, layer wiring provides {}",
                neuron.role(),
                neuron.id(),
                neuron.num_inputs(),
                num_inputs
            )));
        }
        if neuron.num_recurrent_inputs() != num_recurrent {
            return Err(RnnError::config(format!(
                "{} neuron {} takes {} recurrent inputs, layer wiring provides {}",
                neuron.role(),
                neuron.id(),
                neuron.num_recurrent_inputs(),
                num_recurrent
            )));
        }
    }
    Ok(())
}

/// Carry `values` across `link`, advancing simulated time by its latency
fn relay(
    link: &mut Interconnect,
    timing: TimingMode,
    now: &mut Tick,
    values: &[f64],
) -> Result<Vec<f64>> {
    match timing {
        TimingMode::Untimed => Ok(values.to_vec()),
        TimingMode::Timed => {
            link.send(values, *now)?;
            *now += link.latency();
            let delivered = link.deliver(*now);
            if delivered.len() != values.len() {
                return Err(RnnError::shape(
                    format!("{} delivery", link.name()),
                    values.len(),
                    delivered.len(),
                ));
            }
            Ok(delivered)
        }
    }
}

fn add_assign(acc: &mut [f64], values: &[f64]) {
    for (a, v) in acc.iter_mut().zip(values) {
        *a += v;
    }
}
