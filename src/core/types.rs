use serde::Serialize;
use std::fmt;

/// Summary statistics driving one simulation run. Caller-constructed, never
/// mutated by the engine.
#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub revenue_mean: f64,
    pub revenue_stdev: f64,
    pub cost_mean: f64,
    pub cost_stdev: f64,
    /// Shape of the Lomax (Pareto II) investment draw. This is the mean
    /// investment statistic of the source data reused as a shape parameter;
    /// values <= 0 make every draw non-finite and the run degenerate.
    pub investment_shape: f64,
    /// Accepted for parity with the four-variable model; the investment draw
    /// is parameterized by shape alone.
    pub investment_stdev: f64,
    pub rate_mean: f64,
    /// Accepted but unused: discounting applies the flat expected rate.
    pub rate_stdev: f64,
    pub trials: u32,
    pub periods_per_trial: u32,
    pub seed: u64,
}

/// Kernel-density estimate evaluated over the sample's range.
#[derive(Debug, Clone, Serialize)]
pub struct DensityCurve {
    pub x: Vec<f64>,
    pub density: Vec<f64>,
}

/// Empirical CDF over a sorted copy of the sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeCurve {
    pub sorted_sample: Vec<f64>,
    pub cumulative: Vec<f64>,
    pub p_le_zero: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A structural input was out of range (zero trial or period count).
    InvalidParameter(String),
    /// Estimation was requested on a sample with too few usable values.
    EmptySample,
    /// Every trial produced a non-finite NPV, so there is no sample to
    /// estimate from.
    NumericDegenerate,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            SimError::EmptySample => write!(f, "sample has too few usable values"),
            SimError::NumericDegenerate => {
                write!(f, "all trials produced non-finite NPV values")
            }
        }
    }
}

impl std::error::Error for SimError {}
