use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::SpiError;

/// Mean of a per-plot quantity with its sampling error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
    pub confidence_level: f64,
    pub sample_size: usize,
    pub sampling_error_percent: f64,
}

impl ConfidenceInterval {
    /// Interval of `values` scaled by a constant, e.g. per hectare to per year.
    pub fn scaled(&self, factor: f64) -> Self {
        let (lower, upper) = if factor >= 0.0 {
            (self.lower * factor, self.upper * factor)
        } else {
            (self.upper * factor, self.lower * factor)
        };
        Self {
            mean: self.mean * factor,
            std_error: self.std_error * factor.abs(),
            lower,
            upper,
            ..self.clone()
        }
    }
}

/// Compute a Student-t confidence interval of the mean of `values`
/// (`confidence` e.g. 0.95).
pub fn compute_ci(values: &[f64], confidence: f64) -> Result<ConfidenceInterval, SpiError> {
    let n = values.len();
    if n < 2 {
        return Err(SpiError::InsufficientData(format!(
            "Need at least 2 observations, got {n}"
        )));
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_error = variance.sqrt() / (n as f64).sqrt();

    let df = (n - 1) as f64;
    let alpha = 1.0 - confidence;
    let t_dist = StudentsT::new(0.0, 1.0, df).map_err(|e| SpiError::ModelError(e.to_string()))?;
    let t_value = t_dist.inverse_cdf(1.0 - alpha / 2.0);

    let margin = t_value * std_error;
    let sampling_error_percent = if mean.abs() > f64::EPSILON {
        (margin / mean) * 100.0
    } else {
        0.0
    };

    Ok(ConfidenceInterval {
        mean,
        std_error,
        lower: mean - margin,
        upper: mean + margin,
        confidence_level: confidence,
        sample_size: n,
        sampling_error_percent,
    })
}
