use std::time::Duration;

use super::{Probe, SampleError};
use crate::event::EventKind;
use crate::metrics::PluginMetrics;

/// Port of the GPU metrics exporter on the metric host.
pub const GPU_METRIC_PORT: u16 = 9101;

/// Exposition line holding the GPU load averaged over one second, as a fraction in [0, 1].
pub const GPU_METRIC_KEY: &str = "gpu_average_load1s";

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to scrape `{url}`: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` responded with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("metric `{key}` not found in exposition")]
    MissingMetric { key: &'static str },
    #[error("invalid value `{value}` for metric `{key}`")]
    InvalidValue { key: &'static str, value: String },
}

/// Scrapes a Prometheus text exposition endpoint for the GPU load.
#[derive(Debug, Clone)]
pub struct GpuReader {
    client: reqwest::Client,
    url: String,
}

impl GpuReader {
    /// Creates a reader for `url`. Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Client`] if the HTTP client cannot be initialized.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GpuError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GpuError::Client)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Creates a reader for the exporter's `/metrics` path on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Client`] if the HTTP client cannot be initialized.
    pub fn for_host(host: &str, timeout: Duration) -> Result<Self, GpuError> {
        Self::new(format!("http://{host}:{GPU_METRIC_PORT}/metrics"), timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the exposition and returns the GPU load fraction.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, timeouts, non-success statuses, and a missing or
    /// malformed metric line.
    pub async fn read_load_fraction(&self) -> Result<f64, GpuError> {
        let request_error = |source| GpuError::Request {
            url: self.url.clone(),
            source,
        };
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(GpuError::Status {
                url: self.url.clone(),
                status,
            });
        }
        let body = response.text().await.map_err(request_error)?;
        parse_exposition_value(&body, GPU_METRIC_KEY)
    }
}

/// Extracts the value of the first sample named `key` from a text exposition.
///
/// Comment lines are skipped, and a sample with labels (`key{...} value`) matches too.
fn parse_exposition_value(body: &str, key: &'static str) -> Result<f64, GpuError> {
    for line in body.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let metric = name.split_once('{').map_or(name, |(metric, _)| metric);
        if metric != key {
            continue;
        }
        return value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| GpuError::InvalidValue {
                key,
                value: value.to_string(),
            });
    }
    Err(GpuError::MissingMetric { key })
}

/// Samples the GPU load in percent.
#[derive(Debug)]
pub struct GpuProbe {
    reader: GpuReader,
    metrics: PluginMetrics,
}

impl GpuProbe {
    pub fn new(reader: GpuReader, metrics: PluginMetrics) -> Self {
        Self { reader, metrics }
    }
}

impl Probe for GpuProbe {
    fn name(&self) -> &'static str {
        "gpu"
    }

    async fn sample(&mut self) -> Result<EventKind, SampleError> {
        let percent = self.reader.read_load_fraction().await? * 100.0;
        self.metrics.observe_gpu_load(percent);
        Ok(EventKind::PerfGpu(percent))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    const EXPOSITION: &str = "\
# HELP gpu_average_load1s GPU load averaged over 1s
# TYPE gpu_average_load1s gauge
gpu_average_load1s 0.25
# HELP gpu_frequency GPU frequency
gpu_frequency 1.3e+09
";

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/metrics")
    }

    #[test]
    fn test_parse_exposition() {
        assert_eq!(
            parse_exposition_value(EXPOSITION, GPU_METRIC_KEY).unwrap(),
            0.25
        );
    }

    #[test]
    fn test_parse_labelled_sample() {
        let body = "gpu_average_load1s{gpu=\"0\"} 0.5\n";
        assert_eq!(parse_exposition_value(body, GPU_METRIC_KEY).unwrap(), 0.5);
    }

    #[test]
    fn test_parse_missing_metric() {
        let err = parse_exposition_value("gpu_frequency 1\n", GPU_METRIC_KEY).unwrap_err();
        assert!(matches!(err, GpuError::MissingMetric { .. }));
    }

    #[test]
    fn test_parse_malformed_value() {
        let err = parse_exposition_value("gpu_average_load1s busy\n", GPU_METRIC_KEY).unwrap_err();
        match err {
            GpuError::InvalidValue { value, .. } => assert_eq!(value, "busy"),
            _ => panic!("Expected InvalidValue error"),
        }
        let err = parse_exposition_value("gpu_average_load1s NaN\n", GPU_METRIC_KEY).unwrap_err();
        assert!(matches!(err, GpuError::InvalidValue { .. }));
    }

    #[test]
    fn test_for_host_url() {
        let reader = GpuReader::for_host("10.31.81.1", Duration::from_secs(1)).unwrap();
        assert_eq!(reader.url(), "http://10.31.81.1:9101/metrics");
    }

    #[tokio::test]
    async fn test_gpu_load_reported_as_percent() {
        let url = serve(axum::Router::new().route("/metrics", get(|| async { EXPOSITION }))).await;
        let reader = GpuReader::new(url, Duration::from_secs(5)).unwrap();
        let mut probe = GpuProbe::new(reader, PluginMetrics::default());

        let kind = probe.sample().await.unwrap();
        assert_eq!(kind, EventKind::PerfGpu(25.0));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let url = serve(axum::Router::new().route(
            "/metrics",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "exporter down") }),
        ))
        .await;
        let reader = GpuReader::new(url, Duration::from_secs(5)).unwrap();

        let err = reader.read_load_fraction().await.unwrap_err();
        match err {
            GpuError::Status { status, .. } => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => panic!("Expected Status error"),
        }
    }

    #[tokio::test]
    async fn test_slow_exporter_times_out() {
        let url = serve(axum::Router::new().route(
            "/metrics",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                EXPOSITION
            }),
        ))
        .await;
        let reader = GpuReader::new(url, Duration::from_millis(100)).unwrap();

        let err = reader.read_load_fraction().await.unwrap_err();
        match err {
            GpuError::Request { source, .. } => assert!(source.is_timeout()),
            _ => panic!("Expected Request error"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let reader = GpuReader::new(format!("http://{addr}/metrics"), Duration::from_secs(1)).unwrap();

        let err = reader.read_load_fraction().await.unwrap_err();
        assert!(matches!(err, GpuError::Request { .. }));
    }
}
