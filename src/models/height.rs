use serde::{Deserialize, Serialize};

/// Breast height in metres; every height curve passes through it at zero diameter.
pub const BREAST_HEIGHT_M: f64 = 1.3;

/// Candidate height-diameter curves: `h = 1.3 + f(d; a, b)`, diameter in cm,
/// height in m.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightFunction {
    /// `h = 1.3 + a * exp(-b / d)`
    Michajlov,
    /// `h = 1.3 + a * d^b`
    Korf,
    /// `h = 1.3 + d^2 / (a + b*d)^2`
    Naslund,
    /// `h = 1.3 + a * (1 - exp(-b*d))`
    Petersen,
}

impl HeightFunction {
    /// Registration order. Model selection iterates in this order and keeps
    /// the first candidate on an exact R² tie.
    pub const ALL: [HeightFunction; 4] = [
        HeightFunction::Michajlov,
        HeightFunction::Korf,
        HeightFunction::Naslund,
        HeightFunction::Petersen,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            HeightFunction::Michajlov => "michajlov",
            HeightFunction::Korf => "korf",
            HeightFunction::Naslund => "naslund",
            HeightFunction::Petersen => "petersen",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            HeightFunction::Michajlov => "Michajlov function",
            HeightFunction::Korf => "Korf function",
            HeightFunction::Naslund => "Näslund (Prodan) function",
            HeightFunction::Petersen => "Petersen function",
        }
    }

    /// Starting point for the least-squares search.
    pub fn initial_guess(&self) -> (f64, f64) {
        match self {
            HeightFunction::Michajlov => (40.0, 10.0),
            HeightFunction::Korf => (3.0, 0.3),
            HeightFunction::Naslund => (5.0, 0.2),
            HeightFunction::Petersen => (40.0, 0.05),
        }
    }

    /// Predicted height for diameter `d`.
    pub fn evaluate(&self, d: f64, a: f64, b: f64) -> f64 {
        BREAST_HEIGHT_M
            + match self {
                HeightFunction::Michajlov => a * (-b / d).exp(),
                HeightFunction::Korf => a * d.powf(b),
                HeightFunction::Naslund => d.powi(2) / (a + b * d).powi(2),
                HeightFunction::Petersen => a * (1.0 - (-b * d).exp()),
            }
    }

    /// Partial derivatives `(dh/da, dh/db)` at diameter `d`.
    pub fn gradient(&self, d: f64, a: f64, b: f64) -> (f64, f64) {
        match self {
            HeightFunction::Michajlov => {
                let e = (-b / d).exp();
                (e, -a / d * e)
            }
            HeightFunction::Korf => {
                let p = d.powf(b);
                (p, a * p * d.ln())
            }
            HeightFunction::Naslund => {
                let q = (a + b * d).powi(3);
                (-2.0 * d.powi(2) / q, -2.0 * d.powi(3) / q)
            }
            HeightFunction::Petersen => {
                let e = (-b * d).exp();
                (1.0 - e, a * d * e)
            }
        }
    }
}

impl std::fmt::Display for HeightFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for HeightFunction {
    type Err = crate::error::SpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        HeightFunction::ALL
            .into_iter()
            .find(|f| f.id() == wanted)
            .ok_or_else(|| {
                let available: Vec<&str> = HeightFunction::ALL.iter().map(|f| f.id()).collect();
                crate::error::SpiError::ParseError(format!(
                    "Unknown height function '{s}'. Available functions: {}",
                    available.join(", ")
                ))
            })
    }
}
