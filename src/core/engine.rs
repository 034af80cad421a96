use std::f64::consts::PI;

use super::types::{SimError, SimulationParameters};

/// Runs the full Monte Carlo loop: one NPV per trial, non-finite trials
/// dropped, relative order preserved.
///
/// A non-positive investment shape is deliberately passed through rather than
/// rejected; every Pareto draw then comes back NaN and the run returns an
/// empty sample for the caller to deal with.
pub fn simulate(params: &SimulationParameters) -> Result<Vec<f64>, SimError> {
    if params.trials == 0 {
        return Err(SimError::InvalidParameter(
            "trials must be > 0".to_string(),
        ));
    }
    if params.periods_per_trial == 0 {
        return Err(SimError::InvalidParameter(
            "periods-per-trial must be > 0".to_string(),
        ));
    }

    let periods = params.periods_per_trial as usize;
    let mut npvs = Vec::with_capacity(params.trials as usize);

    for trial_id in 0..params.trials {
        let mut rng = Rng::new(derive_seed(params.seed, trial_id));

        let revenues: Vec<f64> = (0..periods)
            .map(|_| params.revenue_mean + params.revenue_stdev * rng.standard_normal())
            .collect();
        let costs: Vec<f64> = (0..periods)
            .map(|_| params.cost_mean + params.cost_stdev * rng.standard_normal())
            .collect();
        let investments: Vec<f64> = (0..periods)
            .map(|_| rng.pareto(params.investment_shape))
            .collect();

        let cash_flow: Vec<f64> = (0..periods)
            .map(|t| -investments[t] + revenues[t] - costs[t])
            .collect();

        npvs.push(net_present_value(params.rate_mean, &cash_flow));
    }

    npvs.retain(|v| v.is_finite());
    Ok(npvs)
}

/// Discounted cash-flow sum with the first period undiscounted, matching the
/// usual financial convention: `sum cf[t] / (1+rate)^t` for t = 0..n.
fn net_present_value(rate: f64, cash_flow: &[f64]) -> f64 {
    let base = 1.0 + rate;
    let mut discount = 1.0;
    let mut total = 0.0;
    for cf in cash_flow {
        total += cf / discount;
        discount *= base;
    }
    total
}

fn derive_seed(base_seed: u64, trial_id: u32) -> u64 {
    splitmix64(base_seed ^ ((trial_id as u64) << 32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    // Uniform on (0, 1), never exactly 0 or 1.
    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }

    /// Lomax (Pareto II) draw in numpy's convention: `(1-U)^(-1/shape) - 1`,
    /// supported on [0, inf). NaN for a shape that is not strictly positive.
    fn pareto(&mut self, shape: f64) -> f64 {
        if !(shape > 0.0) || !shape.is_finite() {
            return f64::NAN;
        }
        (1.0 - self.next_f64()).powf(-1.0 / shape) - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_params() -> SimulationParameters {
        SimulationParameters {
            revenue_mean: 100.0,
            revenue_stdev: 10.0,
            cost_mean: 60.0,
            cost_stdev: 5.0,
            investment_shape: 2.0,
            investment_stdev: 0.0,
            rate_mean: 0.1,
            rate_stdev: 0.0,
            trials: 1_000,
            periods_per_trial: 1_000,
            seed: 42,
        }
    }

    #[test]
    fn net_present_value_discounts_from_second_period() {
        // 100 + 110 / 1.1 = 200
        assert_approx(net_present_value(0.1, &[100.0, 110.0]), 200.0);
    }

    #[test]
    fn net_present_value_with_zero_rate_is_plain_sum() {
        assert_approx(net_present_value(0.0, &[1.0, 2.0, 3.5]), 6.5);
    }

    #[test]
    fn simulate_rejects_zero_trials() {
        let mut params = sample_params();
        params.trials = 0;
        let err = simulate(&params).expect_err("must reject zero trials");
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn simulate_rejects_zero_periods() {
        let mut params = sample_params();
        params.periods_per_trial = 0;
        let err = simulate(&params).expect_err("must reject zero periods");
        assert!(matches!(err, SimError::InvalidParameter(_)));
    }

    #[test]
    fn simulate_is_reproducible_for_a_fixed_seed() {
        let mut params = sample_params();
        params.trials = 50;
        params.periods_per_trial = 50;

        let first = simulate(&params).expect("valid params");
        let second = simulate(&params).expect("valid params");
        assert_eq!(first, second);

        params.seed = 43;
        let reseeded = simulate(&params).expect("valid params");
        assert_ne!(first, reseeded);
    }

    #[test]
    fn non_positive_shape_degenerates_to_empty_sample() {
        let mut params = sample_params();
        params.trials = 20;
        params.periods_per_trial = 20;
        params.investment_shape = 0.0;
        assert!(simulate(&params).expect("still a valid run").is_empty());

        params.investment_shape = -2.5;
        assert!(simulate(&params).expect("still a valid run").is_empty());
    }

    #[test]
    fn baseline_scenario_clusters_around_positive_npv() {
        let params = sample_params();
        let sample = simulate(&params).expect("valid params");

        assert_eq!(sample.len(), 1_000);
        assert!(sample.iter().all(|v| v.is_finite()));

        let mean = sample.iter().sum::<f64>() / sample.len() as f64;
        // Per-period expected net flow is 100 - 60 - E[Lomax(2)] = 39, so the
        // discounted total sits far above zero.
        assert!(mean > 0.0, "expected positive mean NPV, got {mean}");
    }

    #[test]
    fn near_zero_margin_scenario_produces_mixed_signs() {
        let mut params = sample_params();
        params.cost_mean = 100.0;
        params.investment_shape = 3.0;
        params.trials = 500;
        params.periods_per_trial = 500;

        let sample = simulate(&params).expect("valid params");
        assert!(sample.iter().any(|v| *v < 0.0));
        assert!(sample.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn pareto_draws_are_non_negative_for_positive_shape() {
        let mut rng = Rng::new(7);
        for _ in 0..1_000 {
            let v = rng.pareto(1.5);
            assert!(v.is_finite());
            assert!(v >= 0.0);
        }
    }

    #[test]
    fn derive_seed_separates_trials() {
        assert_ne!(derive_seed(42, 0), derive_seed(42, 1));
        assert_ne!(derive_seed(42, 0), derive_seed(43, 0));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_simulate_output_is_bounded_and_finite(
            seed in any::<u64>(),
            trials in 1u32..40,
            periods in 1u32..40,
            revenue_mean in -500i32..500,
            revenue_stdev in 0u32..100,
            cost_mean in -500i32..500,
            cost_stdev in 0u32..100,
            shape_centi in 1u32..800,
            rate_bp in 0u32..3_000
        ) {
            let params = SimulationParameters {
                revenue_mean: revenue_mean as f64,
                revenue_stdev: revenue_stdev as f64,
                cost_mean: cost_mean as f64,
                cost_stdev: cost_stdev as f64,
                investment_shape: shape_centi as f64 / 100.0,
                investment_stdev: 0.0,
                rate_mean: rate_bp as f64 / 10_000.0,
                rate_stdev: 0.0,
                trials,
                periods_per_trial: periods,
                seed,
            };

            let sample = simulate(&params).expect("positive trials and periods");
            prop_assert!(sample.len() <= trials as usize);
            prop_assert!(sample.iter().all(|v| v.is_finite()));
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(16))]

        #[test]
        fn prop_same_seed_same_sample(seed in any::<u64>()) {
            let mut params = sample_params();
            params.seed = seed;
            params.trials = 12;
            params.periods_per_trial = 12;

            let first = simulate(&params).expect("valid params");
            let second = simulate(&params).expect("valid params");
            prop_assert!(first == second);
        }
    }
}
