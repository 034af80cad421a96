use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    CumulativeCurve, DensityCurve, SimError, SimulationParameters, estimate_cumulative,
    estimate_density, simulate,
};

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><title>NPV Monte Carlo simulator</title></head>
<body>
<h1>NPV Monte Carlo simulator</h1>
<p>POST JSON (or GET with query parameters) to <code>/api/simulate</code>.</p>
<p>Scalar keys: <code>revenueMean</code>, <code>revenueStdev</code>, <code>costMean</code>,
<code>costStdev</code>, <code>investmentShape</code>, <code>investmentStdev</code>,
<code>discountRate</code> (percent), <code>discountRateStdev</code> (percent),
<code>iterations</code>, <code>trials</code>, <code>periodsPerTrial</code>, <code>seed</code>.</p>
<p>Raw data columns (JSON arrays, reduced to mean/stdev server-side):
<code>revenues</code>, <code>costs</code>, <code>investments</code>, <code>rates</code>
(rates as fractions, e.g. 0.1).</p>
</body>
</html>
"#;

/// Default parameter set for both direct invocation and the HTTP API.
/// Discount rates arrive in percent and are converted to fractions in
/// `build_params`.
#[derive(Parser, Debug)]
#[command(
    name = "npv-sim",
    about = "Monte Carlo NPV estimator (normal revenues/costs, Pareto investments, flat discounting)"
)]
struct Cli {
    #[arg(long, default_value_t = 100.0, help = "Mean per-period revenue")]
    revenue_mean: f64,
    #[arg(long, default_value_t = 10.0, help = "Revenue standard deviation")]
    revenue_stdev: f64,
    #[arg(long, default_value_t = 60.0, help = "Mean per-period cost")]
    cost_mean: f64,
    #[arg(long, default_value_t = 5.0, help = "Cost standard deviation")]
    cost_stdev: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Pareto shape for investment draws (the mean investment statistic)"
    )]
    investment_shape: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Investment standard deviation; accepted but not used by the Pareto draw"
    )]
    investment_stdev: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Expected discount rate in percent, e.g. 10"
    )]
    discount_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Discount rate standard deviation in percent; accepted but discounting stays flat"
    )]
    discount_rate_stdev: f64,
    #[arg(long, default_value_t = 1000, help = "Number of Monte Carlo trials")]
    trials: u32,
    #[arg(
        long,
        help = "Cash-flow periods per trial; defaults to the trial count"
    )]
    periods_per_trial: Option<u32>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// JSON/query overrides merged onto the CLI defaults. `iterations` is the
/// legacy single-knob interface and sets the trial count; `trials` and
/// `periodsPerTrial` take precedence when also present. Raw data columns, if
/// given, are reduced to summary statistics and override the matching
/// scalars.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    revenue_mean: Option<f64>,
    revenue_stdev: Option<f64>,
    cost_mean: Option<f64>,
    cost_stdev: Option<f64>,
    investment_shape: Option<f64>,
    investment_stdev: Option<f64>,
    discount_rate: Option<f64>,
    discount_rate_stdev: Option<f64>,
    iterations: Option<u32>,
    trials: Option<u32>,
    periods_per_trial: Option<u32>,
    seed: Option<u64>,

    revenues: Option<Vec<f64>>,
    costs: Option<Vec<f64>>,
    investments: Option<Vec<f64>>,
    rates: Option<Vec<f64>>,
}

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    trials: u32,
    periods_per_trial: u32,
    seed: u64,
    sample_size: usize,
    sample_mean: f64,
    sample: Vec<f64>,
    density: DensityCurve,
    cumulative: CumulativeCurve,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Clone, Copy)]
struct ColumnStats {
    mean: f64,
    stdev: f64,
}

fn build_params(cli: Cli) -> Result<SimulationParameters, String> {
    if cli.trials == 0 {
        return Err("--trials must be > 0".to_string());
    }

    let periods_per_trial = cli.periods_per_trial.unwrap_or(cli.trials);
    if periods_per_trial == 0 {
        return Err("--periods-per-trial must be > 0".to_string());
    }

    for (name, value) in [
        ("--revenue-mean", cli.revenue_mean),
        ("--cost-mean", cli.cost_mean),
        ("--investment-shape", cli.investment_shape),
        ("--discount-rate", cli.discount_rate),
    ] {
        if !value.is_finite() {
            return Err(format!("{name} must be finite"));
        }
    }

    for (name, stdev) in [
        ("--revenue-stdev", cli.revenue_stdev),
        ("--cost-stdev", cli.cost_stdev),
        ("--investment-stdev", cli.investment_stdev),
        ("--discount-rate-stdev", cli.discount_rate_stdev),
    ] {
        if !stdev.is_finite() || stdev < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if cli.discount_rate <= -100.0 {
        return Err("--discount-rate must be > -100".to_string());
    }

    Ok(SimulationParameters {
        revenue_mean: cli.revenue_mean,
        revenue_stdev: cli.revenue_stdev,
        cost_mean: cli.cost_mean,
        cost_stdev: cli.cost_stdev,
        investment_shape: cli.investment_shape,
        investment_stdev: cli.investment_stdev,
        rate_mean: cli.discount_rate / 100.0,
        rate_stdev: cli.discount_rate_stdev / 100.0,
        trials: cli.trials,
        periods_per_trial,
        seed: cli.seed,
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/", get(index_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("NPV simulator HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let sample = match simulate(&request.params) {
        Ok(sample) => sample,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if sample.is_empty() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &SimError::NumericDegenerate.to_string(),
        );
    }

    let density = match estimate_density(&sample) {
        Ok(curve) => curve,
        Err(err) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    };
    let cumulative = match estimate_cumulative(&sample) {
        Ok(curve) => curve,
        Err(err) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    };

    let response = build_simulate_response(&request.params, sample, density, cumulative);
    json_response(StatusCode::OK, response)
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.revenue_mean {
        cli.revenue_mean = v;
    }
    if let Some(v) = payload.revenue_stdev {
        cli.revenue_stdev = v;
    }
    if let Some(v) = payload.cost_mean {
        cli.cost_mean = v;
    }
    if let Some(v) = payload.cost_stdev {
        cli.cost_stdev = v;
    }
    if let Some(v) = payload.investment_shape {
        cli.investment_shape = v;
    }
    if let Some(v) = payload.investment_stdev {
        cli.investment_stdev = v;
    }
    if let Some(v) = payload.discount_rate {
        cli.discount_rate = v;
    }
    if let Some(v) = payload.discount_rate_stdev {
        cli.discount_rate_stdev = v;
    }
    if let Some(v) = payload.iterations {
        cli.trials = v;
    }
    if let Some(v) = payload.trials {
        cli.trials = v;
    }
    if let Some(v) = payload.periods_per_trial {
        cli.periods_per_trial = Some(v);
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    let mut params = build_params(cli)?;

    // Raw columns win over scalar statistics. Rates arrive as fractions.
    if let Some(column) = payload.revenues.as_deref() {
        let stats = column_stats("revenues", column)?;
        params.revenue_mean = stats.mean;
        params.revenue_stdev = stats.stdev;
    }
    if let Some(column) = payload.costs.as_deref() {
        let stats = column_stats("costs", column)?;
        params.cost_mean = stats.mean;
        params.cost_stdev = stats.stdev;
    }
    if let Some(column) = payload.investments.as_deref() {
        let stats = column_stats("investments", column)?;
        params.investment_shape = stats.mean;
        params.investment_stdev = stats.stdev;
    }
    if let Some(column) = payload.rates.as_deref() {
        let stats = column_stats("rates", column)?;
        params.rate_mean = stats.mean;
        params.rate_stdev = stats.stdev;
    }

    Ok(ApiRequest { params })
}

/// Mean and sample standard deviation (n-1 denominator, as pandas computes
/// them) of one uploaded data column.
fn column_stats(name: &str, column: &[f64]) -> Result<ColumnStats, String> {
    if column.is_empty() {
        return Err(format!("{name} column must not be empty"));
    }
    if column.iter().any(|v| !v.is_finite()) {
        return Err(format!("{name} column must contain only finite values"));
    }

    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let stdev = if column.len() < 2 {
        0.0
    } else {
        let ss = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
        (ss / (n - 1.0)).sqrt()
    };

    Ok(ColumnStats { mean, stdev })
}

fn default_cli_for_api() -> Cli {
    Cli {
        revenue_mean: 100.0,
        revenue_stdev: 10.0,
        cost_mean: 60.0,
        cost_stdev: 5.0,
        investment_shape: 2.0,
        investment_stdev: 0.0,
        discount_rate: 10.0,
        discount_rate_stdev: 0.0,
        trials: 1_000,
        periods_per_trial: None,
        seed: 42,
    }
}

fn build_simulate_response(
    params: &SimulationParameters,
    sample: Vec<f64>,
    density: DensityCurve,
    cumulative: CumulativeCurve,
) -> SimulateResponse {
    let sample_mean = sample.iter().sum::<f64>() / sample.len() as f64;
    SimulateResponse {
        trials: params.trials,
        periods_per_trial: params.periods_per_trial,
        seed: params.seed,
        sample_size: sample.len(),
        sample_mean,
        sample,
        density,
        cumulative,
    }
}
