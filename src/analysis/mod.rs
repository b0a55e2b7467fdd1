mod fitting;
mod indicators;
mod selector;
mod statistics;

pub use fitting::{fit_one, FitFailure, FitOptions, FitResult, MIN_OBSERVATIONS};
pub use indicators::{
    counting_radius, stem_volume, ComplianceCheck, IndicatorBasis, Indicators, PlotEstimate,
    Subplot, DEFAULT_CONFIDENCE, DEFAULT_FORM_FACTOR,
};
pub use selector::{
    apply, compare, predict_heights, select_best, GroupModel, HeightModelRecord, HeightModeler,
    ModelComparison, RECOMMENDED_SAMPLE_SIZE,
};
pub use statistics::{compute_ci, ConfidenceInterval};

#[cfg(test)]
pub(crate) use fitting::tests::korf_sample;
