use super::Loss;
use crate::error::{Result, RnnError};

/// Mean Squared Error loss
pub struct MSELoss;

fn check(predictions: &[f64], targets: &[f64]) -> Result<()> {
    if predictions.len() != targets.len() {
        return Err(RnnError::shape("loss targets", predictions.len(), targets.len()));
    }
    Ok(())
}

impl Loss for MSELoss {
    /// `Σ(o - t)² / n`
    fn forward(predictions: &[f64], targets: &[f64]) -> Result<f64> {
        check(predictions, targets)?;
        let n = predictions.len();
        if n == 0 {
            return Ok(0.0);
        }

        let sum_squared_error: f64 = predictions
            .iter()
            .zip(targets)
            .map(|(o, t)| (o - t) * (o - t))
            .sum();
        Ok(sum_squared_error / n as f64)
    }

    /// `2(o - t) / n` per output
    fn backward(predictions: &[f64], targets: &[f64]) -> Result<Vec<f64>> {
        check(predictions, targets)?;
        let n = predictions.len() as f64;
        Ok(predictions
            .iter()
            .zip(targets)
            .map(|(o, t)| 2.0 * (o - t) / n)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_loss() {
        let predictions = vec![0.5, 0.8];
        let targets = vec![0.4, 0.9];

        let loss = MSELoss::forward(&predictions, &targets).unwrap();
        let gradients = MSELoss::backward(&predictions, &targets).unwrap();

        // ((0.5-0.4)^2 + (0.8-0.9)^2) / 2 = 0.01
        assert!((loss - 0.01).abs() < 1e-12);

        // [2*(0.5-0.4)/2, 2*(0.8-0.9)/2] = [0.1, -0.1]
        assert!((gradients[0] - 0.1).abs() < 1e-12);
        assert!((gradients[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_mse_length_mismatch() {
        assert!(matches!(
            MSELoss::forward(&[0.1, 0.2], &[0.1]),
            Err(RnnError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(MSELoss::backward(&[0.1], &[]).is_err());
    }

    #[test]
    fn test_mse_perfect_prediction() {
        assert_eq!(MSELoss::forward(&[0.3, -0.7], &[0.3, -0.7]).unwrap(), 0.0);
        assert_eq!(MSELoss::backward(&[0.3], &[0.3]).unwrap(), vec![0.0]);
    }
}
