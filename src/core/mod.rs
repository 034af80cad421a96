mod engine;
mod estimator;
mod types;

pub use engine::simulate;
pub use estimator::{estimate_cumulative, estimate_density};
pub use types::{CumulativeCurve, DensityCurve, SimError, SimulationParameters};
