//! Telemetry Sink — spec.md §4.10. A pure effect: `emit(series, tags,
//! fields)`. Grounded in the original's `influxdb_streamer.py`
//! line-protocol writer; transport is `reqwest` since the teacher has
//! no metrics crate of its own (it ships logs, not points).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A field value in a telemetry point. InfluxDB line protocol
/// distinguishes integers (`42i`), floats, booleans, and strings.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(n) => write!(f, "{n}i"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Opaque point emitter — the main loop never knows whether points
/// reach a real backend. Implementations must never block the loop
/// beyond a short timeout (spec.md §4.10).
pub trait TelemetrySink: Send + Sync {
    fn emit<'a>(
        &'a self,
        series: &'a str,
        tags: &'a BTreeMap<String, String>,
        fields: &'a BTreeMap<String, FieldValue>,
    ) -> BoxFuture<'a>;
}

/// Used when no `telemetry_url` is configured (spec.md §4.10: "the
/// sink is a no-op").
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit<'a>(
        &'a self,
        _series: &'a str,
        _tags: &'a BTreeMap<String, String>,
        _fields: &'a BTreeMap<String, FieldValue>,
    ) -> BoxFuture<'a> {
        Box::pin(async {})
    }
}

/// Posts InfluxDB line-protocol text to `telemetry_url`. Failures are
/// logged at debug and dropped — telemetry never blocks or fails the
/// tick (spec.md §7's `TelemetryError`).
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url }
    }
}

impl TelemetrySink for HttpSink {
    fn emit<'a>(
        &'a self,
        series: &'a str,
        tags: &'a BTreeMap<String, String>,
        fields: &'a BTreeMap<String, FieldValue>,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let line = line_protocol(series, tags, fields);
            match self.client.post(&self.url).body(line).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::debug!(status = %resp.status(), series, "telemetry post rejected");
                }
                Err(e) => {
                    tracing::debug!(error = %e, series, "telemetry post failed");
                }
                Ok(_) => {}
            }
        })
    }
}

fn line_protocol(
    series: &str,
    tags: &BTreeMap<String, String>,
    fields: &BTreeMap<String, FieldValue>,
) -> String {
    let mut line = series.to_string();
    for (k, v) in tags {
        line.push_str(&format!(",{k}={v}"));
    }
    line.push(' ');
    let fields_str: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    line.push_str(&fields_str.join(","));
    line
}

/// Builds the sink named by `telemetry_url`, matching §4.10: absent
/// URL yields a no-op sink.
pub fn build_sink(telemetry_url: Option<&str>) -> Box<dyn TelemetrySink> {
    match telemetry_url {
        Some(url) if !url.is_empty() => Box::new(HttpSink::new(url.to_string())),
        _ => Box::new(NoopSink),
    }
}
