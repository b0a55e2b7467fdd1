use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::HeightFunction;

/// Fewest observations a two-parameter curve can be fitted to.
pub const MIN_OBSERVATIONS: usize = 2;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;
const COST_TOLERANCE: f64 = 1e-10;
const STEP_TOLERANCE: f64 = 1e-10;

/// Options of the least-squares search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Budget of model evaluations over the whole sample. Exceeding it is a
    /// fit failure.
    pub max_evaluations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
        }
    }
}

/// A fitted height curve scored against its fitting sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub function: HeightFunction,
    pub a: f64,
    pub b: f64,
    /// Coefficient of determination over the fitting sample.
    pub r2: f64,
    /// Root of the mean squared residual over the fitting sample.
    pub rmse: f64,
    pub sample_size: usize,
    pub evaluations: usize,
}

impl FitResult {
    pub fn predict(&self, dbh: f64) -> f64 {
        self.function.evaluate(dbh, self.a, self.b)
    }
}

/// Why a candidate could not be fitted. Local to the candidate; the selector
/// drops it from the comparison.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    #[error("{function}: diameters ({diameters}) and heights ({heights}) differ in length")]
    LengthMismatch {
        function: HeightFunction,
        diameters: usize,
        heights: usize,
    },

    #[error("{function}: {actual} observations, at least {MIN_OBSERVATIONS} needed")]
    TooFewObservations {
        function: HeightFunction,
        actual: usize,
    },

    #[error("{function}: optimal parameters not found within {evaluations} model evaluations")]
    NotConverged {
        function: HeightFunction,
        evaluations: usize,
    },

    #[error("{function}: model produced non-finite values")]
    NonFinite { function: HeightFunction },
}

impl FitFailure {
    pub fn function(&self) -> HeightFunction {
        match self {
            FitFailure::LengthMismatch { function, .. }
            | FitFailure::TooFewObservations { function, .. }
            | FitFailure::NotConverged { function, .. }
            | FitFailure::NonFinite { function } => *function,
        }
    }
}

/// Sum of squared residuals, `None` when any prediction is not finite.
fn cost(function: HeightFunction, d: &[f64], h: &[f64], a: f64, b: f64) -> Option<f64> {
    let mut sum = 0.0;
    for (&di, &hi) in d.iter().zip(h) {
        let r = hi - function.evaluate(di, a, b);
        if !r.is_finite() {
            return None;
        }
        sum += r * r;
    }
    sum.is_finite().then_some(sum)
}

/// Fit one candidate by Levenberg-Marquardt least squares, starting from
/// the candidate's initial guess.
pub fn fit_one(
    function: HeightFunction,
    diameters: &[f64],
    heights: &[f64],
    options: &FitOptions,
) -> Result<FitResult, FitFailure> {
    if diameters.len() != heights.len() {
        return Err(FitFailure::LengthMismatch {
            function,
            diameters: diameters.len(),
            heights: heights.len(),
        });
    }
    let n = diameters.len();
    if n < MIN_OBSERVATIONS {
        return Err(FitFailure::TooFewObservations { function, actual: n });
    }

    let (mut a, mut b) = function.initial_guess();
    let mut evaluations = 1;
    let mut current = cost(function, diameters, heights, a, b).ok_or(FitFailure::NonFinite { function })?;
    let mut damping = INITIAL_DAMPING;

    'outer: while current > 0.0 {
        // Normal equations J'J and J'r at the current parameters.
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&d, &h) in diameters.iter().zip(heights) {
            let (da, db) = function.gradient(d, a, b);
            let r = h - function.evaluate(d, a, b);
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }
        if ![jaa, jab, jbb, ga, gb].iter().all(|v| v.is_finite()) {
            return Err(FitFailure::NonFinite { function });
        }

        loop {
            let maa = jaa * (1.0 + damping);
            let mbb = jbb * (1.0 + damping);
            let det = maa * mbb - jab * jab;
            let step = if det.abs() > f64::MIN_POSITIVE && det.is_finite() {
                let sa = (mbb * ga - jab * gb) / det;
                let sb = (maa * gb - jab * ga) / det;
                (sa.is_finite() && sb.is_finite()).then_some((sa, sb))
            } else {
                None
            };

            let Some((sa, sb)) = step else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break 'outer;
                }
                continue;
            };

            let step_norm = sa.hypot(sb);
            let small_step = step_norm <= STEP_TOLERANCE * (a.hypot(b) + STEP_TOLERANCE);

            evaluations += 1;
            if evaluations > options.max_evaluations {
                tracing::debug!(%function, evaluations, "evaluation budget exhausted");
                return Err(FitFailure::NotConverged {
                    function,
                    evaluations: options.max_evaluations,
                });
            }

            match cost(function, diameters, heights, a + sa, b + sb) {
                Some(trial) if trial < current => {
                    let reduction = current - trial;
                    a += sa;
                    b += sb;
                    current = trial;
                    damping = (damping / 10.0).max(MIN_DAMPING);
                    if reduction <= COST_TOLERANCE * current || small_step {
                        break 'outer;
                    }
                    break;
                }
                _ => {
                    if small_step {
                        break 'outer;
                    }
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        break 'outer;
                    }
                }
            }
        }
    }

    score(function, diameters, heights, a, b, evaluations)
}

fn score(
    function: HeightFunction,
    diameters: &[f64],
    heights: &[f64],
    a: f64,
    b: f64,
    evaluations: usize,
) -> Result<FitResult, FitFailure> {
    let n = heights.len() as f64;
    let mean = heights.iter().sum::<f64>() / n;
    let ss_res = cost(function, diameters, heights, a, b).ok_or(FitFailure::NonFinite { function })?;
    let ss_tot: f64 = heights.iter().map(|h| (h - mean).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };
    let rmse = (ss_res / n).sqrt();

    if !(a.is_finite() && b.is_finite() && r2.is_finite()) {
        return Err(FitFailure::NonFinite { function });
    }

    Ok(FitResult {
        function,
        a,
        b,
        r2,
        rmse,
        sample_size: heights.len(),
        evaluations,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Korf curve `1.3 + 5 * d^0.2` with a small deterministic disturbance.
    pub(crate) fn korf_sample() -> (Vec<f64>, Vec<f64>) {
        (0..40)
            .map(|i| {
                let d = 8.0 + 1.3 * i as f64;
                let noise = (((i * 7919) % 13) as f64 / 13.0 - 0.5) * 0.1;
                (d, 1.3 + 5.0 * d.powf(0.2) + noise)
            })
            .unzip()
    }

    #[test]
    fn test_korf_parameters_recovered() {
        let (d, h) = korf_sample();
        let fit = fit_one(HeightFunction::Korf, &d, &h, &FitOptions::default()).unwrap();
        assert_approx_eq!(fit.a, 5.0, 0.15);
        assert_approx_eq!(fit.b, 0.2, 0.01);
        assert!(fit.r2 > 0.99);
        assert!(fit.rmse < 0.05);
        assert_eq!(fit.sample_size, 40);
    }

    #[test]
    fn test_exact_curve_fits_perfectly() {
        let d: Vec<f64> = (1..=15).map(|i| 6.0 + 3.0 * i as f64).collect();
        let h: Vec<f64> = d.iter().map(|&x| HeightFunction::Petersen.evaluate(x, 32.0, 0.04)).collect();
        let fit = fit_one(HeightFunction::Petersen, &d, &h, &FitOptions::default()).unwrap();
        assert_approx_eq!(fit.a, 32.0, 1e-4);
        assert_approx_eq!(fit.b, 0.04, 1e-6);
        assert_approx_eq!(fit.r2, 1.0, 1e-9);
    }

    #[test]
    fn test_every_candidate_fits_korf_sample() {
        let (d, h) = korf_sample();
        for function in HeightFunction::ALL {
            let fit = fit_one(function, &d, &h, &FitOptions::default());
            assert!(fit.is_ok(), "{function}: {fit:?}");
        }
    }

    #[test]
    fn test_exhausted_budget_is_failure() {
        let (d, h) = korf_sample();
        let options = FitOptions { max_evaluations: 1 };
        let err = fit_one(HeightFunction::Korf, &d, &h, &options).unwrap_err();
        assert_eq!(
            err,
            FitFailure::NotConverged {
                function: HeightFunction::Korf,
                evaluations: 1
            }
        );
        assert!(err.to_string().contains("korf"));
    }

    #[test]
    fn test_too_few_observations() {
        let err = fit_one(HeightFunction::Korf, &[20.0], &[18.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitFailure::TooFewObservations { actual: 1, .. }));
    }

    #[test]
    fn test_length_mismatch() {
        let err = fit_one(HeightFunction::Naslund, &[20.0, 30.0], &[18.0], &FitOptions::default())
            .unwrap_err();
        assert_eq!(err.function(), HeightFunction::Naslund);
        assert!(matches!(err, FitFailure::LengthMismatch { .. }));
    }

    #[test]
    fn test_zero_diameter_is_non_finite() {
        let d = [0.0, 10.0, 20.0];
        let h = [1.3, 12.0, 18.0];
        let err = fit_one(HeightFunction::Michajlov, &d, &h, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitFailure::NonFinite { .. }));
    }
}
