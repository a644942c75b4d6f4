//! HTTP surface for the transceiver telemetry engine.
//!
//! Two scrape endpoints over the same collection pass:
//! `/metrics` (Prometheus text exposition) and `/influx` (line
//! protocol), plus a landing page. Each scrape runs a full hardware
//! pass in a blocking task — there is no background collection loop and
//! no staleness, at the price of scrape latency on slow modules.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};

use nethw_core::{Collector, InfluxSink, MetricSink, discover_interfaces};

/// Shared server state.
pub struct AppState {
    pub collector: Collector,
    pub device_globs: Vec<String>,
}

/// Run one pass over `ifaces` and render Prometheus text exposition.
///
/// The registry is built per scrape: gone interfaces disappear instead
/// of lingering with stale values.
pub fn scrape_prometheus(collector: &Collector, ifaces: &[String]) -> anyhow::Result<String> {
    let registry = Registry::new();
    let sink = MetricSink::register(&registry)?;

    let build_info = GaugeVec::new(
        Opts::new(
            format!("{}_build_info", nethw_core::NAMESPACE),
            "Build information of the exporter",
        ),
        &["version"],
    )?;
    registry.register(Box::new(build_info.clone()))?;
    build_info.with_label_values(&[nethw_core::VERSION]).set(1.0);

    collector.collect(ifaces, &sink);

    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("encoding metrics")
}

/// Run one pass over `ifaces` and render influx line protocol, one line
/// per interface, stamped with `timestamp_ns`.
pub fn scrape_influx(
    collector: &Collector,
    ifaces: &[String],
    timestamp_ns: i64,
) -> String {
    let sink = InfluxSink::new(timestamp_ns);
    collector.collect(ifaces, &sink);
    let mut out = sink.into_lines().join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let ifaces = discover_interfaces(&state.device_globs)?;
        scrape_prometheus(&state.collector, &ifaces)
    })
    .await;

    match result {
        Ok(Ok(body)) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            log::error!("scrape failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}\n")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response(),
    }
}

async fn handle_influx(State(state): State<Arc<AppState>>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let ifaces = discover_interfaces(&state.device_globs)?;
        anyhow::Ok(scrape_influx(&state.collector, &ifaces, now_ns()))
    })
    .await;

    match result {
        Ok(Ok(body)) => body.into_response(),
        Ok(Err(e)) => {
            log::error!("influx scrape failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}\n")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response(),
    }
}

async fn handle_index() -> Html<&'static str> {
    Html(
        r#"<html>
  <head><title>NetHW Exporter</title></head>
  <body><h1>NetHW Exporter</h1>
  <p><a href="/metrics">Metrics</a></p>
  <p><a href="/influx">Metrics in influxdb format</a></p>
</html>
"#,
    )
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics))
        .route("/influx", get(handle_influx))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn run_server(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app).await.context("serving HTTP")
}
