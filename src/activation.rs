use serde::{Deserialize, Serialize};

use crate::error::RnnError;

/// Activation function applied to a neuron's weighted sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    #[serde(alias = "identity")]
    Linear,
}

impl Activation {
    /// f(z)
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Tanh => z.tanh(),
            Activation::Sigmoid => sigmoid(z),
            Activation::Linear => z,
        }
    }

    /// f'(z), evaluated at the pre-activation value
    pub fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::Tanh => {
                let t = z.tanh();
                1.0 - t * t
            }
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1.0 - s)
            }
            Activation::Linear => 1.0,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl std::str::FromStr for Activation {
    type Err = RnnError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "linear" | "identity" => Ok(Activation::Linear),
            other => Err(RnnError::config(format!(
                "unknown activation function '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Linear => "linear",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tanh_derivative_matches_finite_difference() {
        let eps = 1e-6;
        for &z in &[-2.0, -0.3, 0.0, 0.7, 1.5] {
            let numeric =
                (Activation::Tanh.apply(z + eps) - Activation::Tanh.apply(z - eps)) / (2.0 * eps);
            assert!((numeric - Activation::Tanh.derivative(z)).abs() < 1e-8);
        }
    }

    #[test]
    fn test_sigmoid_values() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        assert!((Activation::Sigmoid.derivative(0.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("tanh".parse::<Activation>().unwrap(), Activation::Tanh);
        assert_eq!("Identity".parse::<Activation>().unwrap(), Activation::Linear);
        assert!(matches!(
            "relu".parse::<Activation>(),
            Err(RnnError::Configuration(_))
        ));
    }
}
