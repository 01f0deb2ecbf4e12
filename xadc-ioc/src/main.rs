// XADC IOC - sensor IOC with HTTP metric egress
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # XADC IOC
//!
//! Scans the Zynq XADC channels, serves their current values and forwards
//! every update to the configured collectors.
//!
//! ## Usage
//!
//! ```bash
//! # Run with the default config (/etc/xadc-ioc.toml)
//! xadc-ioc
//!
//! # Custom PV prefix and status port
//! xadc-ioc --config ioc.toml --prefix '$hostname:XADC:' --port 9100
//! ```

mod metrics;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use metrics::{encode_metrics, update_pipeline_metrics, update_pv_values, update_uptime};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use xadc::config::DEFAULT_CONFIG_PATH;
use xadc::{
    local_hostname, Config, PipelineStatus, PipelineSupervisor, PvReading, ScanLoop, SensorRegistry,
    ValueSource,
};

/// XADC sensor IOC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// PV prefix, may contain $hostname (overrides the config file)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Status server port
    #[arg(long, default_value = "9100")]
    port: u16,

    /// Do not start the status server
    #[arg(long)]
    no_http: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Application state shared across handlers.
struct AppState {
    scan: Arc<ScanLoop>,
    supervisor: Mutex<PipelineSupervisor>,
    start_time: Instant,
}

impl AppState {
    fn pipelines(&self) -> Vec<PipelineStatus> {
        self.supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("XADC IOC v{}", env!("CARGO_PKG_VERSION"));

    let (config, load_error) = Config::load_or_default(&args.config);
    if let Some(e) = load_error {
        warn!(path = %args.config, error = %e, "Using default configuration");
    }

    let prefix_template = args.prefix.clone().unwrap_or_else(|| config.ioc.prefix.clone());
    let mut supervisor = PipelineSupervisor::new(local_hostname(), &prefix_template);

    let registry = SensorRegistry::xadc(&config.ioc.iio_device);
    let scan = Arc::new(ScanLoop::new(
        registry,
        supervisor.prefix(),
        config.ioc.scan_period(),
    ));

    let metric_names = scan.names();
    match supervisor.start(&config.destinations, scan.as_ref(), &metric_names) {
        Ok(0) => warn!("No egress destination enabled, values are served locally only"),
        Ok(n) => info!(destinations = n, "Egress pipelines running"),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    info!(
        prefix = %supervisor.prefix(),
        host = %supervisor.hostname(),
        pvs = metric_names.len(),
        "Serving XADC channels"
    );
    tokio::spawn(Arc::clone(&scan).run());

    let state = Arc::new(AppState {
        scan,
        supervisor: Mutex::new(supervisor),
        start_time: Instant::now(),
    });

    if !args.no_http {
        let app = build_router(Arc::clone(&state));
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("Status server on http://{}", addr);
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("Status server failed: {}", e);
                    }
                });
            }
            // The status surface is optional, egress keeps running without it
            Err(e) => warn!("Cannot bind status server on {}: {}", addr, e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    state
        .supervisor
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .shutdown();
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Root handler - lists the endpoints.
async fn root_handler() -> &'static str {
    "XADC IOC\n\n/metrics  Prometheus metrics\n/health   Health check\n/status   PV values and pipeline status (JSON)\n"
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_pv_values(&state.scan.pv_values());
    update_pipeline_metrics(&state.pipelines());
    update_uptime(state.start_time.elapsed().as_secs_f64());

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

/// Health check handler.
///
/// Degraded pipelines are still retrying, so the process reports OK.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    prefix: String,
    pvs: Vec<PvReading>,
    pipelines: Vec<PipelineStatus>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        prefix: state.scan.prefix().to_string(),
        pvs: state.scan.pv_values(),
        pipelines: state.pipelines(),
    })
}
