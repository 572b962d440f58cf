//! Epoch-based training of an [`RnnNetwork`] over an ordered sequence.
//!
//! Every epoch presents the whole sequence once, backpropagating after each
//! sample and applying the accumulated gradients a single time at the end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::RnnNetwork;
use crate::clock::{Activity, Clocked, ExitCause, Tick};
use crate::config::{ResetPolicy, SimConfig};
use crate::data::TrainingSet;
use crate::error::{Result, RnnError};
use crate::loss::{Loss, MSELoss};
use crate::network::NetworkStats;
use crate::optimizer::{Optimizer, PerNeuronSGD, SGD};

/// Where the trainer is within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    Idle,
    Forward,
    Loss,
    Backward,
    ApplyGradients,
    EpochDone,
    Finished,
}

/// Shared flag asking a training run to stop at the next epoch boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    /// Loss of the last completed epoch
    pub final_loss: Option<f64>,
    pub epoch_losses: Vec<f64>,
    pub aborted: bool,
    /// Global learning rate, absent when each neuron used its own
    pub learning_rate: Option<f64>,
    pub stats: NetworkStats,
}

pub struct Trainer {
    network: RnnNetwork,
    data: TrainingSet,
    optimizer: Box<dyn Optimizer>,
    reset_policy: ResetPolicy,
    reinitialize_weights: bool,
    max_epochs: usize,
    phase: TrainingPhase,
    epoch_losses: Vec<f64>,
    started: bool,
    aborted: bool,
    cancel: CancelToken,
}

impl Trainer {
    /// Create a trainer; the data widths must match the network's layers
    pub fn new(
        network: RnnNetwork,
        data: TrainingSet,
        optimizer: Box<dyn Optimizer>,
        max_epochs: usize,
    ) -> Result<Self> {
        data.validate_against(&network)?;
        if max_epochs == 0 {
            return Err(RnnError::config("max_epochs must be at least 1"));
        }
        Ok(Trainer {
            network,
            data,
            optimizer,
            reset_policy: ResetPolicy::default(),
            reinitialize_weights: false,
            max_epochs,
            phase: TrainingPhase::Idle,
            epoch_losses: Vec::new(),
            started: false,
            aborted: false,
            cancel: CancelToken::new(),
        })
    }

    /// Build network, data and optimizer from a simulation config
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        let network = RnnNetwork::new(&config.network)?;
        let data = TrainingSet::from_config(&config.training)?;
        let optimizer: Box<dyn Optimizer> = match config.training.learning_rate {
            Some(rate) => Box::new(SGD::new(rate)),
            None => Box::new(PerNeuronSGD),
        };

        let mut trainer = Trainer::new(network, data, optimizer, config.training.max_epochs)?;
        trainer.reset_policy = config.training.recurrent_reset;
        trainer.reinitialize_weights = config.training.reinitialize_weights;
        Ok(trainer)
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn with_reinitialize_weights(mut self, reinitialize: bool) -> Self {
        self.reinitialize_weights = reinitialize;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn network(&self) -> &RnnNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut RnnNetwork {
        &mut self.network
    }

    pub fn into_network(self) -> RnnNetwork {
        self.network
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }

    pub fn epochs_completed(&self) -> usize {
        self.epoch_losses.len()
    }

    pub fn epoch_losses(&self) -> &[f64] {
        &self.epoch_losses
    }

    /// Present the sequence once and apply the accumulated gradients.
    ///
    /// Returns the summed per-sample MSE of the epoch.
    pub fn run_epoch(&mut self) -> Result<f64> {
        if !self.started {
            self.start_run();
        }
        let epoch = self.epoch_losses.len() + 1;
        if self.reset_policy == ResetPolicy::PerEpoch {
            self.network.reset_recurrent_state();
        }

        let mut epoch_loss = 0.0;
        for (input, target) in self.data.iter() {
            if self.reset_policy == ResetPolicy::PerSample {
                self.network.reset_recurrent_state();
            }

            self.phase = TrainingPhase::Forward;
            let output = self.network.evaluate(input)?;

            self.phase = TrainingPhase::Loss;
            epoch_loss += MSELoss::forward(&output, target)?;
            let gradient = MSELoss::backward(&output, target)?;

            self.phase = TrainingPhase::Backward;
            self.network.backpropagate(&gradient)?;
        }

        self.phase = TrainingPhase::ApplyGradients;
        self.optimizer.step(&mut self.network);

        if !epoch_loss.is_finite() {
            warn!(epoch, epoch_loss, "Non-finite training loss");
        }
        self.epoch_losses.push(epoch_loss);
        self.phase = TrainingPhase::EpochDone;

        if epoch == 1 || epoch % self.progress_interval() == 0 || epoch == self.max_epochs {
            info!(epoch, max_epochs = self.max_epochs, epoch_loss, "Epoch finished");
        } else {
            debug!(epoch, epoch_loss, "Epoch finished");
        }
        Ok(epoch_loss)
    }

    /// Run the remaining epochs up to `max_epochs`, stopping early only when cancelled
    pub fn train(&mut self, max_epochs: usize) -> Result<TrainingReport> {
        if max_epochs == 0 {
            return Err(RnnError::config("max_epochs must be at least 1"));
        }
        self.max_epochs = max_epochs;
        self.start_run();

        while self.epochs_completed() < self.max_epochs {
            if self.cancel.is_cancelled() {
                self.aborted = true;
                break;
            }
            self.run_epoch()?;
        }

        self.finish();
        Ok(self.report())
    }

    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            epochs_completed: self.epochs_completed(),
            final_loss: self.epoch_losses.last().copied(),
            epoch_losses: self.epoch_losses.clone(),
            aborted: self.aborted,
            learning_rate: self.optimizer.learning_rate(),
            stats: self.network.stats(),
        }
    }

    /// Every call to `train` is a new run; a run driven by the clock or by
    /// bare `run_epoch` calls starts with its first epoch
    fn start_run(&mut self) {
        self.started = true;
        self.aborted = false;
        self.phase = TrainingPhase::Idle;
        if self.reinitialize_weights {
            self.network.reinitialize();
            self.epoch_losses.clear();
        }
        info!(
            samples = self.data.len(),
            max_epochs = self.max_epochs,
            learning_rate = ?self.optimizer.learning_rate(),
            reset = ?self.reset_policy,
            "Starting RNN training"
        );
    }

    fn finish(&mut self) {
        if self.phase == TrainingPhase::Finished {
            return;
        }
        self.phase = TrainingPhase::Finished;
        info!(
            epochs = self.epochs_completed(),
            final_loss = ?self.epoch_losses.last(),
            aborted = self.aborted,
            "RNN training finished"
        );
    }

    fn exit_cause(&self) -> ExitCause {
        if self.aborted {
            ExitCause::Aborted
        } else {
            ExitCause::TrainingComplete
        }
    }

    fn progress_interval(&self) -> usize {
        (self.max_epochs / 10).max(1)
    }
}

impl Clocked for Trainer {
    /// Start one epoch per tick once the network has caught up with simulated time
    fn tick(&mut self, now: Tick) -> Result<Activity> {
        if self.phase == TrainingPhase::Finished {
            return Ok(Activity::Finished(self.exit_cause()));
        }
        if self.network.tick(now)? == Activity::Busy {
            return Ok(Activity::Busy);
        }

        if self.cancel.is_cancelled() {
            self.aborted = true;
        }
        if self.aborted || self.epochs_completed() >= self.max_epochs {
            self.finish();
            return Ok(Activity::Finished(self.exit_cause()));
        }

        self.network.advance_to(now);
        self.run_epoch()?;
        Ok(Activity::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Simulator;
    use crate::config::{InterconnectConfig, NetworkConfig, TimingMode, TrainingConfig};

    fn toy_trainer(timing: TimingMode, learning_rate: f64) -> Trainer {
        let config = NetworkConfig::layered(1, 4, 1).with_timing(timing);
        let network = RnnNetwork::new(&config).unwrap();
        let data = TrainingSet::new(
            vec![vec![1.0], vec![0.5], vec![0.0]],
            vec![vec![1.0], vec![0.5], vec![0.0]],
        )
        .unwrap();
        Trainer::new(network, data, Box::new(SGD::new(learning_rate)), 1).unwrap()
    }

    #[test]
    fn test_toy_dataset_loss_decreases() {
        let mut trainer = toy_trainer(TimingMode::Timed, 0.1);
        let report = trainer.train(1000).unwrap();

        assert_eq!(report.epochs_completed, 1000);
        assert!(!report.aborted);
        let first = report.epoch_losses[0];
        let last = report.final_loss.unwrap();
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert_eq!(trainer.phase(), TrainingPhase::Finished);
    }

    #[test]
    fn test_epoch_loss_sums_sample_losses() {
        let mut trainer = toy_trainer(TimingMode::Untimed, 0.1);
        let mut network = trainer.network().clone();

        let mut expected = 0.0;
        network.reset_recurrent_state();
        for (x, y) in [(1.0, 1.0), (0.5, 0.5), (0.0, 0.0)] {
            let out = network.evaluate(&[x]).unwrap();
            expected += MSELoss::forward(&out, &[y]).unwrap();
        }

        let loss = trainer.run_epoch().unwrap();
        assert!((loss - expected).abs() < 1e-12);
        assert_eq!(trainer.phase(), TrainingPhase::EpochDone);
        assert!(trainer.network().neurons().all(|n| n.gradients().is_zero()));
    }

    #[test]
    fn test_single_gradient_application_per_epoch() {
        let mut trainer = toy_trainer(TimingMode::Untimed, 0.1);
        trainer.run_epoch().unwrap();
        trainer.run_epoch().unwrap();
        let network = trainer.network();
        for neuron in network.hidden_layer().iter().chain(network.output_layer()) {
            assert_eq!(neuron.stats().learning_updates, 2);
        }
        assert!(network.input_layer().iter().all(|n| n.stats().learning_updates == 0));
    }

    #[test]
    fn test_training_is_deterministic() {
        let run = || {
            let mut trainer = toy_trainer(TimingMode::Timed, 0.05);
            trainer.train(20).unwrap();
            trainer
                .network()
                .neurons()
                .map(|n| (n.input_weights().to_vec(), n.recurrent_weights().to_vec(), n.bias()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_policies_change_training() {
        let final_loss = |policy| {
            let mut trainer = toy_trainer(TimingMode::Untimed, 0.1).with_reset_policy(policy);
            trainer.train(5).unwrap().final_loss.unwrap()
        };
        assert_ne!(final_loss(ResetPolicy::PerEpoch), final_loss(ResetPolicy::PerSample));
    }

    fn sequence_loss(network: &mut RnnNetwork, reset_each_sample: bool) -> f64 {
        let mut loss = 0.0;
        for (x, y) in [(1.0, 1.0), (0.5, 0.5), (0.0, 0.0)] {
            if reset_each_sample {
                network.reset_recurrent_state();
            }
            let out = network.evaluate(&[x]).unwrap();
            loss += MSELoss::forward(&out, &[y]).unwrap();
        }
        loss
    }

    #[test]
    fn test_never_reset_carries_state_across_epochs() {
        let mut trainer =
            toy_trainer(TimingMode::Untimed, 0.1).with_reset_policy(ResetPolicy::Never);
        trainer.run_epoch().unwrap();
        assert!(trainer.network().recurrent_state().iter().any(|h| *h != 0.0));

        let mut carried = trainer.network().clone();
        let mut fresh = trainer.network().clone();
        fresh.reset_recurrent_state();
        let expected = sequence_loss(&mut carried, false);
        let from_zero = sequence_loss(&mut fresh, false);

        let loss = trainer.run_epoch().unwrap();
        assert!((loss - expected).abs() < 1e-12);
        assert!((loss - from_zero).abs() > 1e-12);
    }

    #[test]
    fn test_per_epoch_reset_starts_each_epoch_from_zero() {
        let mut trainer =
            toy_trainer(TimingMode::Untimed, 0.1).with_reset_policy(ResetPolicy::PerEpoch);
        trainer.run_epoch().unwrap();
        assert!(trainer.network().recurrent_state().iter().any(|h| *h != 0.0));

        let mut chained = trainer.network().clone();
        chained.reset_recurrent_state();
        let expected = sequence_loss(&mut chained, false);
        let mut isolated = trainer.network().clone();
        let per_sample = sequence_loss(&mut isolated, true);

        let loss = trainer.run_epoch().unwrap();
        assert!((loss - expected).abs() < 1e-12);
        assert!((loss - per_sample).abs() > 1e-12);
    }

    #[test]
    fn test_reinitialize_weights_restarts_each_run() {
        let weights = |trainer: &Trainer| {
            trainer
                .network()
                .neurons()
                .map(|n| (n.input_weights().to_vec(), n.recurrent_weights().to_vec(), n.bias()))
                .collect::<Vec<_>>()
        };

        let mut trainer =
            toy_trainer(TimingMode::Untimed, 0.1).with_reinitialize_weights(true);
        let first = trainer.train(5).unwrap();
        let after_first = weights(&trainer);
        let second = trainer.train(5).unwrap();
        assert_eq!(second.epochs_completed, 5);
        assert_eq!(second.epoch_losses, first.epoch_losses);
        assert_eq!(weights(&trainer), after_first);

        let mut trainer = toy_trainer(TimingMode::Untimed, 0.1);
        trainer.train(5).unwrap();
        let report = trainer.train(10).unwrap();
        assert_eq!(report.epochs_completed, 10);
        assert_eq!(report.epoch_losses[..5], first.epoch_losses[..]);
        assert_ne!(weights(&trainer), after_first);
    }

    #[test]
    fn test_cancellation_stops_at_epoch_boundary() {
        let mut trainer = toy_trainer(TimingMode::Untimed, 0.1);
        let token = trainer.cancel_token();
        trainer.run_epoch().unwrap();
        token.cancel();

        let report = trainer.train(100).unwrap();
        assert!(report.aborted);
        assert_eq!(report.epochs_completed, 1);
    }

    #[test]
    fn test_mismatched_data_is_rejected() {
        let network = RnnNetwork::new(&NetworkConfig::layered(2, 3, 1)).unwrap();
        let data = TrainingSet::new(vec![vec![1.0]], vec![vec![1.0]]).unwrap();
        assert!(matches!(
            Trainer::new(network, data, Box::new(PerNeuronSGD), 1),
            Err(RnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_config_uses_training_section() {
        let config = SimConfig {
            network: NetworkConfig::default().with_interconnects(InterconnectConfig::new(2, 10)),
            training: TrainingConfig {
                max_epochs: 3,
                learning_rate: Some(0.2),
                ..TrainingConfig::default()
            },
            ..SimConfig::default()
        };
        let mut trainer = Trainer::from_config(&config).unwrap();
        assert_eq!(trainer.max_epochs(), 3);

        let report = trainer.train(3).unwrap();
        assert_eq!(report.learning_rate, Some(0.2));
        assert_eq!(report.epoch_losses.len(), 3);
    }

    #[test]
    fn test_from_config_rejects_empty_training_set() {
        let config = SimConfig {
            training: TrainingConfig {
                training_data: vec![],
                target_outputs: vec![],
                ..TrainingConfig::default()
            },
            ..SimConfig::default()
        };
        assert!(matches!(
            Trainer::from_config(&config),
            Err(RnnError::Configuration(_))
        ));
    }

    #[test]
    fn test_simulator_drives_training_to_completion() {
        let mut trainer = toy_trainer(TimingMode::Timed, 0.1);
        trainer.max_epochs = 4;

        let mut simulator = Simulator::new(1, None).unwrap();
        let exit = simulator.run(&mut trainer).unwrap();

        assert_eq!(exit.cause, ExitCause::TrainingComplete);
        assert_eq!(trainer.epochs_completed(), 4);
        // The last epoch's transfers complete before the run ends
        assert!(exit.tick >= trainer.network().now());
    }

    #[test]
    fn test_simulator_tick_budget_interrupts_training() {
        let mut trainer = toy_trainer(TimingMode::Timed, 0.1);
        trainer.max_epochs = 1000;

        let mut simulator = Simulator::new(1, Some(50)).unwrap();
        let exit = simulator.run(&mut trainer).unwrap();

        assert_eq!(exit.cause, ExitCause::TickBudgetExhausted);
        assert!(trainer.epochs_completed() < 1000);
    }

    #[test]
    fn test_clocked_cancellation_aborts() {
        let mut trainer = toy_trainer(TimingMode::Untimed, 0.1);
        trainer.max_epochs = 1000;
        trainer.cancel_token().cancel();

        let mut simulator = Simulator::new(1, None).unwrap();
        let exit = simulator.run(&mut trainer).unwrap();
        assert_eq!(exit.cause, ExitCause::Aborted);
        assert_eq!(trainer.epochs_completed(), 0);
    }
}
