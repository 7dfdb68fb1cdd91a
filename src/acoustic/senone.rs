use std::f32::consts::PI;

use ndarray::{Array1, ArrayView1};

use crate::logmath::{linear_to_log, log_add, LOG_ZERO};

pub const VARIANCE_FLOOR: f32 = 1e-4;
pub const MIXTURE_WEIGHT_FLOOR: f64 = 1e-7;

/// One diagonal-covariance Gaussian.
#[derive(Debug, Clone)]
pub struct MixtureComponent {
    mean: Array1<f32>,
    /// `-0.5 / variance`, so the exponent is a dot product.
    precision: Array1<f32>,
    log_norm: f32,
}

impl MixtureComponent {
    pub fn new(mean: Array1<f32>, variance: Array1<f32>) -> Self {
        let variance = variance.mapv(|v| v.max(VARIANCE_FLOOR));
        let log_det: f32 = variance.iter().map(|v| v.ln()).sum();
        let dim = mean.len() as f32;
        let log_norm = -0.5 * (dim * (2.0 * PI).ln() + log_det);
        Self {
            mean,
            precision: variance.mapv(|v| -0.5 / v),
            log_norm,
        }
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Log density of `features` under this Gaussian.
    pub fn score(&self, features: ArrayView1<f32>) -> f32 {
        let mut exponent = 0.0f32;
        for ((x, m), p) in features
            .iter()
            .zip(self.mean.iter())
            .zip(self.precision.iter())
        {
            let d = x - m;
            exponent += d * d * p;
        }
        self.log_norm + exponent
    }
}

/// A tied output distribution: a weighted Gaussian mixture.
#[derive(Debug, Clone)]
pub struct Senone {
    components: Vec<MixtureComponent>,
    log_weights: Vec<f32>,
}

impl Senone {
    /// Weights are linear; they are floored before the log conversion.
    pub fn new(components: Vec<MixtureComponent>, weights: &[f64]) -> Self {
        let log_weights = weights
            .iter()
            .map(|w| linear_to_log(w.max(MIXTURE_WEIGHT_FLOOR)))
            .collect();
        Self {
            components,
            log_weights,
        }
    }

    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    pub fn dimension(&self) -> Option<usize> {
        self.components.first().map(MixtureComponent::dimension)
    }

    pub fn score(&self, features: ArrayView1<f32>) -> f32 {
        self.components
            .iter()
            .zip(self.log_weights.iter())
            .fold(LOG_ZERO, |acc, (c, w)| log_add(acc, w + c.score(features)))
    }
}
