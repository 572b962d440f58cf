//! Training harness for one recurrent neuron, without interconnect timing.

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{Activity, Clocked, ExitCause, Tick};
use crate::config::defaults;
use crate::error::{Result, RnnError};
use crate::neuron::Neuron;

/// One synthetic (input, target) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Vec<f64>,
    pub target: f64,
}

impl Sample {
    pub fn new(input: Vec<f64>, target: f64) -> Self {
        Sample { input, target }
    }
}

/// Built-in samples for a three-input neuron
pub fn default_samples() -> Vec<Sample> {
    vec![
        Sample::new(vec![1.0, 0.5, -0.2], 0.4),
        Sample::new(vec![0.3, 0.7, -0.1], 0.5),
        Sample::new(vec![0.9, -0.4, 0.8], 0.9),
    ]
}

/// Loss summary of one training step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepSummary {
    pub step: usize,
    /// Sum of squared errors over the samples
    pub loss: f64,
}

pub struct SingleUnitTrainer {
    neuron: Neuron,
    samples: Vec<Sample>,
    learning_rate: f64,
    previous_input: Vec<f64>,
    steps: Vec<StepSummary>,
    step_interval: Tick,
    max_steps: usize,
    next_step_at: Tick,
}

impl SingleUnitTrainer {
    pub fn new(neuron: Neuron, samples: Vec<Sample>, learning_rate: f64) -> Result<Self> {
        if samples.is_empty() {
            return Err(RnnError::config("single-unit trainer needs at least one sample"));
        }
        for sample in &samples {
            if sample.input.len() != neuron.num_inputs() {
                return Err(RnnError::shape(
                    "single-unit sample",
                    neuron.num_inputs(),
                    sample.input.len(),
                ));
            }
        }
        if neuron.num_recurrent_inputs() != neuron.num_inputs() {
            return Err(RnnError::config(format!(
                "single-unit neuron needs one recurrent input per input, got {} for {}",
                neuron.num_recurrent_inputs(),
                neuron.num_inputs()
            )));
        }
        check_learning_rate(learning_rate)?;

        Ok(SingleUnitTrainer {
            previous_input: vec![0.0; neuron.num_inputs()],
            neuron,
            samples,
            learning_rate,
            steps: Vec::new(),
            step_interval: defaults::SINGLE_UNIT_STEP_INTERVAL,
            max_steps: defaults::SINGLE_UNIT_STEPS,
            next_step_at: defaults::SINGLE_UNIT_STEP_INTERVAL,
        })
    }

    /// Ticks between steps when driven by a clock; the first step happens one interval in
    pub fn with_schedule(mut self, step_interval: Tick, max_steps: usize) -> Result<Self> {
        if step_interval == 0 {
            return Err(RnnError::config("step interval must be at least one tick"));
        }
        self.step_interval = step_interval;
        self.max_steps = max_steps;
        self.next_step_at = step_interval;
        Ok(self)
    }

    pub fn neuron(&self) -> &Neuron {
        &self.neuron
    }

    pub fn steps(&self) -> &[StepSummary] {
        &self.steps
    }

    pub fn steps_completed(&self) -> usize {
        self.steps.len()
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// One pass over the samples, applying gradients after every sample.
    ///
    /// The recurrent input of each sample is the previous sample's input vector,
    /// zeros before the first sample ever seen.
    pub fn step(&mut self) -> Result<StepSummary> {
        let mut loss = 0.0;

        for sample in &self.samples {
            let output = self.neuron.forward(&sample.input, &self.previous_input)?;
            let error = output - sample.target;
            loss += error * error;

            self.neuron.backward(2.0 * error)?;
            self.neuron.apply_gradients(self.learning_rate);
            self.previous_input.clone_from(&sample.input);
        }

        let summary = StepSummary {
            step: self.steps.len() + 1,
            loss,
        };
        debug!(step = summary.step, loss, "Single-unit step");
        self.steps.push(summary);
        Ok(summary)
    }

    /// Run `num_steps` steps back to back at `learning_rate`
    pub fn run_steps(
        &mut self,
        num_steps: usize,
        learning_rate: f64,
    ) -> Result<Vec<StepSummary>> {
        check_learning_rate(learning_rate)?;
        self.learning_rate = learning_rate;
        let summaries = (0..num_steps)
            .map(|_| self.step())
            .collect::<Result<Vec<_>>>()?;
        if let Some(last) = summaries.last() {
            info!(steps = num_steps, final_loss = last.loss, "Single-unit training finished");
        }
        Ok(summaries)
    }
}

fn check_learning_rate(learning_rate: f64) -> Result<()> {
    if !learning_rate.is_finite() || learning_rate <= 0.0 {
        return Err(RnnError::config(format!(
            "learning rate must be a positive finite number, got {learning_rate}"
        )));
    }
    Ok(())
}

impl Clocked for SingleUnitTrainer {
    fn tick(&mut self, now: Tick) -> Result<Activity> {
        if self.steps.len() >= self.max_steps {
            return Ok(Activity::Finished(ExitCause::TrainingComplete));
        }
        if now >= self.next_step_at {
            self.step()?;
            self.next_step_at += self.step_interval;
        }
        Ok(Activity::Busy)
    }
}
