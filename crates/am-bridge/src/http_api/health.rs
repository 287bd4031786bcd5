use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, Json};
use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::api_response::ApiResponse;

use super::state::{ApiState, HEALTH_CACHE_KEY, HEALTH_CACHE_TTL};
use super::types::{HealthReport, ToolVersion};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// `(program, reported name, prefix/suffix noise to strip)`
const PROBES: [(&str, &str, &str); 7] = [
    ("node", "node", ""),
    ("npm", "npm", ""),
    ("npx", "npx", ""),
    ("git", "git", "git version "),
    ("claude", "claude-code", " (Claude Code)"),
    ("qwen", "qwen-code", ""),
    ("gemini", "gemini", ""),
];

/// GET /api/v1/health -- versions of the external tools on PATH.
pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<ApiResponse<HealthReport>> {
    match state.cache.get(HEALTH_CACHE_KEY).await {
        Ok(Some(raw)) => match serde_json::from_str::<HealthReport>(&raw) {
            Ok(report) => {
                debug!("health report served from cache");
                return ApiResponse::success("agents service is running (cached)", report);
            }
            Err(e) => warn!(error = %e, "discarding undecodable cached health report"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "health cache unavailable"),
    }

    let started = Instant::now();
    let report = HealthReport {
        status: "running".into(),
        version: state.version.clone(),
        tools: probe_tools(&state).await,
        checked_at: Utc::now(),
    };
    info!(
        tools = report.tools.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "health check finished"
    );

    match serde_json::to_string(&report) {
        Ok(raw) => {
            if let Err(e) = state.cache.set(HEALTH_CACHE_KEY, raw, HEALTH_CACHE_TTL).await {
                warn!(error = %e, "failed to cache health report");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode health report"),
    }
    ApiResponse::success("agents service is running", report)
}

/// Tools that are missing or fail `--version` are left out.
async fn probe_tools(state: &ApiState) -> Vec<ToolVersion> {
    let args = vec!["--version".to_string()];
    let probes = PROBES.iter().map(|(program, name, noise)| {
        let args = &args;
        async move {
            let out = state
                .executor
                .simple_execute("", program, args, PROBE_TIMEOUT)
                .await;
            if !out.success {
                debug!(program, reason = %out.failure_message(), "tool not available");
                return None;
            }
            let mut version = out.stdout.trim().to_string();
            if !noise.is_empty() {
                version = version.replace(noise, "");
            }
            Some(ToolVersion {
                name: name.to_string(),
                version: version.trim().to_string(),
            })
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}
