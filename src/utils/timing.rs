use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "persona.timing";

/// Tracks one upload from receipt to the rendered response.
#[derive(Debug)]
pub struct UploadTimer {
    route: String,
    file_name: Option<String>,
    bytes: usize,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl UploadTimer {
    pub fn new(route: &str, file_name: Option<&str>, bytes: usize) -> Self {
        UploadTimer {
            route: route.to_string(),
            file_name: file_name.map(|name| name.chars().take(200).collect()),
            bytes,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "persona.timing",
            "event=upload_received route={} file_name={:?} bytes={} received_at={}",
            self.route,
            self.file_name,
            self.bytes,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "persona.timing",
            "event=upload_completed route={} file_name={:?} started_at={} response_sent_at={} duration_s={:.3} status={} detail={}",
            self.route,
            self.file_name,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for UploadTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_upload_timer(route: &str, file_name: Option<&str>, bytes: usize) -> UploadTimer {
    let timer = UploadTimer::new(route, file_name, bytes);
    timer.log_received();
    timer
}

pub fn complete_upload_timer(timer: &mut UploadTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "persona.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "persona.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_logged_once_and_keeps_status() {
        let mut timer = start_upload_timer("/analyze", Some("me.png"), 42);
        complete_upload_timer(&mut timer, "error", Some("bad upload".to_string()));
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
        assert_eq!(timer.detail.as_deref(), Some("bad upload"));
    }

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok = log_llm_timing("gemini", "m", "op", None, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), _> =
            log_llm_timing("gemini", "m", "op", None, || async { Err(anyhow::anyhow!("boom")) })
                .await;
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }
}
