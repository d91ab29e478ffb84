use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

pub struct MetricsService {
    handle: PrometheusHandle,
}

impl MetricsService {
    /// Installs the global Prometheus recorder. Call once per process.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self { handle })
    }

    /// A service whose recorder is not installed globally, for tests and tools
    /// that build several apps in one process.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn record_upload(&self, bytes: u64) {
        counter!("portrait_uploads_total").increment(1);
        counter!("portrait_upload_bytes_total").increment(bytes);
    }

    /// `outcome` is `success` or a generation failure kind.
    pub fn record_generation(&self, outcome: &'static str) {
        counter!("portrait_generations_total", "outcome" => outcome).increment(1);
    }

    pub fn record_error(&self, class: &'static str) {
        counter!("http_errors_total", "class" => class).increment(1);
    }
}

/// Measures one HTTP request. The histogram sample is taken when the timer is
/// dropped, labelled with the status set by [`RouteTimer::finish`] or
/// `aborted` if the request never produced a response.
pub struct RouteTimer {
    start: Instant,
    method: String,
    route: String,
    status: Option<u16>,
}

impl RouteTimer {
    pub fn start(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            method: method.into(),
            route: route.into(),
            status: None,
        }
    }

    pub fn finish(&mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for RouteTimer {
    fn drop(&mut self) {
        let status = match self.status {
            Some(code) => code.to_string(),
            None => "aborted".to_string(),
        };
        histogram!(
            "http_request_duration_seconds",
            "method" => self.method.clone(),
            "route" => self.route.clone(),
            "status" => status
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
