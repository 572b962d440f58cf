//! Training sequences for recurrent networks

use crate::config::TrainingConfig;
use crate::error::{Result, RnnError};
use crate::RnnNetwork;

/// An ordered sequence of (input, target) pairs.
///
/// Order matters: samples are presented one time step after another, so the
/// recurrent state carries information from each sample into the next.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    inputs: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
}

impl TrainingSet {
    /// Pair up inputs and targets, rejecting empty or ragged data
    pub fn new(inputs: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(RnnError::config("training set is empty"));
        }
        if inputs.len() != targets.len() {
            return Err(RnnError::shape("training targets", inputs.len(), targets.len()));
        }

        let input_width = inputs[0].len();
        let target_width = targets[0].len();
        for (i, (x, y)) in inputs.iter().zip(&targets).enumerate() {
            if x.len() != input_width {
                return Err(RnnError::shape(format!("training input {i}"), input_width, x.len()));
            }
            if y.len() != target_width {
                return Err(RnnError::shape(format!("training target {i}"), target_width, y.len()));
            }
        }

        Ok(TrainingSet { inputs, targets })
    }

    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        Self::new(config.training_data.clone(), config.target_outputs.clone())
    }

    /// Check the sample widths against a network's input and output layers
    pub fn validate_against(&self, network: &RnnNetwork) -> Result<()> {
        if self.input_width() != network.input_size() {
            return Err(RnnError::shape(
                "training input width",
                network.input_size(),
                self.input_width(),
            ));
        }
        if self.target_width() != network.output_size() {
            return Err(RnnError::shape(
                "training target width",
                network.output_size(),
                self.target_width(),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_width(&self) -> usize {
        self.inputs[0].len()
    }

    pub fn target_width(&self) -> usize {
        self.targets[0].len()
    }

    pub fn get(&self, index: usize) -> Option<(&[f64], &[f64])> {
        Some((self.inputs.get(index)?, self.targets.get(index)?))
    }

    /// Samples in presentation order
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], &[f64])> {
        self.inputs
            .iter()
            .zip(&self.targets)
            .map(|(x, y)| (x.as_slice(), y.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[test]
    fn test_training_set_from_default_config() {
        let set = TrainingSet::from_config(&TrainingConfig::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.input_width(), 3);
        assert_eq!(set.target_width(), 2);

        let samples: Vec<_> = set.iter().collect();
        assert_eq!(samples[1].0, &[0.4, 0.5, 0.6]);
        assert_eq!(samples[1].1, &[0.7, 0.8]);
        assert!(set.get(2).is_none());
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(matches!(
            TrainingSet::new(vec![], vec![]),
            Err(RnnError::Configuration(_))
        ));
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(matches!(
            TrainingSet::new(vec![vec![0.1]], vec![vec![0.2], vec![0.3]]),
            Err(RnnError::ShapeMismatch { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            TrainingSet::new(vec![vec![0.1], vec![0.1, 0.2]], vec![vec![0.2], vec![0.3]]),
            Err(RnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_against_network() {
        let network = RnnNetwork::new(&NetworkConfig::default()).unwrap();
        let set = TrainingSet::from_config(&TrainingConfig::default()).unwrap();
        set.validate_against(&network).unwrap();

        let narrow = TrainingSet::new(vec![vec![0.1, 0.2]], vec![vec![0.3, 0.4]]).unwrap();
        assert!(matches!(
            narrow.validate_against(&network),
            Err(RnnError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
    }
}
