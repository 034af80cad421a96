use std::f64::consts::PI;

use super::types::{CumulativeCurve, DensityCurve, SimError};

/// Gaussian-kernel density estimate evaluated at `sample.len()` evenly spaced
/// points spanning `[min(sample), max(sample)]` inclusive.
///
/// Needs at least two distinct finite values; anything less has no defined
/// density and fails with `EmptySample`.
pub fn estimate_density(sample: &[f64]) -> Result<DensityCurve, SimError> {
    let n = sample.len();
    if n < 2 {
        return Err(SimError::EmptySample);
    }

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in sample {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return Err(SimError::EmptySample);
    }

    let bandwidth = silverman_bandwidth(sample);

    let step = (hi - lo) / (n - 1) as f64;
    let x: Vec<f64> = (0..n)
        .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
        .collect();

    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * PI).sqrt());
    let density = x
        .iter()
        .map(|&xi| {
            let kernel_sum: f64 = sample
                .iter()
                .map(|&s| {
                    let z = (xi - s) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum();
            kernel_sum * norm
        })
        .collect();

    Ok(DensityCurve { x, density })
}

/// Empirical CDF: cumulative probability `k/N` at the k-th smallest value.
/// Operates on a sorted copy; the input sample is never touched.
pub fn estimate_cumulative(sample: &[f64]) -> Result<CumulativeCurve, SimError> {
    if sample.is_empty() {
        return Err(SimError::EmptySample);
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let cumulative: Vec<f64> = (1..=sorted.len()).map(|k| k as f64 / n).collect();

    // Cumulative probability at the rightmost value <= 0, or 0 when the whole
    // sample is positive.
    let at_or_below_zero = sorted.partition_point(|&v| v <= 0.0);
    let p_le_zero = at_or_below_zero as f64 / n;

    Ok(CumulativeCurve {
        sorted_sample: sorted,
        cumulative,
        p_le_zero,
    })
}

/// Silverman's rule of thumb: `0.9 * min(sd, iqr/1.34) * n^(-1/5)`. Falls
/// back to the standard deviation when the IQR collapses to zero, which
/// happens for heavily tied samples.
fn silverman_bandwidth(sample: &[f64]) -> f64 {
    let n = sample.len() as f64;
    let sd = standard_deviation(sample);

    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let iqr = percentile_sorted(&sorted, 75.0) - percentile_sorted(&sorted, 25.0);

    let spread = if iqr > 0.0 {
        sd.min(iqr / 1.34)
    } else {
        sd
    };
    0.9 * spread * n.powf(-0.2)
}

fn standard_deviation(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}
