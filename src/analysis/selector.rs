use serde::{Deserialize, Serialize};

use super::fitting::{fit_one, FitFailure, FitOptions, FitResult};
use crate::models::{HeightFunction, Occasion, SampleTree};

/// Below this many complete diameter/height pairs a fitted model is
/// considered unreliable.
pub const RECOMMENDED_SAMPLE_SIZE: usize = 10;

/// Every candidate fitted to one sample, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelComparison {
    pub fits: Vec<FitResult>,
    pub failures: Vec<FitFailure>,
}

impl ModelComparison {
    /// Candidate with the highest R². On an exact tie the candidate
    /// registered first is kept.
    pub fn best(&self) -> Option<&FitResult> {
        let mut best: Option<&FitResult> = None;
        for fit in &self.fits {
            match best {
                Some(current) if fit.r2 <= current.r2 => {}
                _ => best = Some(fit),
            }
        }
        best
    }
}

/// Fit each of `candidates` to the sample. Failed fits are collected,
/// never propagated.
pub fn compare(
    candidates: &[HeightFunction],
    diameters: &[f64],
    heights: &[f64],
    options: &FitOptions,
) -> ModelComparison {
    let mut comparison = ModelComparison::default();
    for &function in candidates {
        match fit_one(function, diameters, heights, options) {
            Ok(fit) => {
                tracing::debug!(%function, a = fit.a, b = fit.b, r2 = fit.r2, "candidate fitted");
                comparison.fits.push(fit);
            }
            Err(failure) => {
                tracing::warn!("{failure}");
                comparison.failures.push(failure);
            }
        }
    }
    comparison
}

/// Best of all registered candidates, `None` when none could be fitted.
pub fn select_best(diameters: &[f64], heights: &[f64]) -> Option<FitResult> {
    compare(&HeightFunction::ALL, diameters, heights, &FitOptions::default())
        .best()
        .cloned()
}

/// Heights predicted by a fitted model for every diameter.
pub fn apply(model: &FitResult, diameters: &[f64]) -> Vec<f64> {
    diameters.iter().map(|&d| model.predict(d)).collect()
}

/// Height model chosen for one stratification group.
#[derive(Debug, Clone)]
pub struct GroupModel {
    pub group: String,
    pub occasion: Occasion,
    pub sample_size: usize,
    pub comparison: ModelComparison,
    pub chosen: Option<FitResult>,
}

impl GroupModel {
    pub fn is_reliable(&self) -> bool {
        self.sample_size >= RECOMMENDED_SAMPLE_SIZE
    }
}

/// Persisted form of a chosen model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightModelRecord {
    pub group: String,
    pub occasion: Occasion,
    pub function: HeightFunction,
    pub a: f64,
    pub b: f64,
    pub r2: f64,
    pub rmse: f64,
    pub sample_size: usize,
}

impl HeightModelRecord {
    pub fn new(group: &str, occasion: Occasion, fit: &FitResult) -> Self {
        Self {
            group: group.to_string(),
            occasion,
            function: fit.function,
            a: fit.a,
            b: fit.b,
            r2: fit.r2,
            rmse: fit.rmse,
            sample_size: fit.sample_size,
        }
    }
}

/// Fits height models to groups of sample trees.
#[derive(Debug, Clone, Default)]
pub struct HeightModeler {
    options: FitOptions,
    forced: Option<HeightFunction>,
}

impl HeightModeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit only this function instead of comparing all candidates.
    pub fn with_function(mut self, function: Option<HeightFunction>) -> Self {
        self.forced = function;
        self
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    /// Complete `(dbh, height)` pairs of the trees on an occasion: numbered
    /// stems with a positive diameter and a positive measured height.
    pub fn fitting_sample<'a>(
        trees: impl IntoIterator<Item = &'a SampleTree>,
        occasion: Occasion,
    ) -> (Vec<f64>, Vec<f64>) {
        trees
            .into_iter()
            .filter(|t| t.in_model_sample(occasion))
            .filter_map(|t| match (t.dbh_on(occasion), t.height_on(occasion)) {
                (Some(d), Some(h)) if d > 0.0 && h > 0.0 => Some((d, h)),
                _ => None,
            })
            .unzip()
    }

    /// Fit the group's sample and choose its model.
    pub fn model_group<'a>(
        &self,
        group: &str,
        occasion: Occasion,
        trees: impl IntoIterator<Item = &'a SampleTree>,
    ) -> GroupModel {
        let (diameters, heights) = Self::fitting_sample(trees, occasion);
        if diameters.len() < RECOMMENDED_SAMPLE_SIZE {
            tracing::warn!(group, %occasion, n = diameters.len(), "small height-model sample");
        }

        let comparison = match self.forced {
            Some(function) => compare(&[function], &diameters, &heights, &self.options),
            None => compare(&HeightFunction::ALL, &diameters, &heights, &self.options),
        };
        let chosen = comparison.best().cloned();

        GroupModel {
            group: group.to_string(),
            occasion,
            sample_size: diameters.len(),
            comparison,
            chosen,
        }
    }
}

/// Write predicted heights to every tree of the occasion that has a positive
/// diameter, including trees left out of the fitting sample. Returns the
/// number of trees updated.
pub fn predict_heights<'a>(
    model: &FitResult,
    trees: impl IntoIterator<Item = &'a mut SampleTree>,
    occasion: Occasion,
) -> usize {
    let mut updated = 0;
    for tree in trees {
        if let Some(d) = tree.dbh_on(occasion).filter(|d| *d > 0.0) {
            tree.set_model_height(occasion, Some(model.predict(d)));
            updated += 1;
        }
    }
    updated
}
