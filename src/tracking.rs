use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::TrackingConfig;
use crate::error::{PipelineError, Result};

/// Experiment-tracking collaborator. Calls are fire-and-forget from the
/// orchestrator's point of view: once the model artifact is on disk,
/// tracker failures must not lose it.
pub trait ExperimentTracker {
    fn log_artifact(&self, path: &Path) -> Result<()>;
    fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()>;
    fn log_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<()>;
}

/// Tracker used when no tracking_uri is configured and in tests.
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn log_artifact(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "tracking disabled, artifact not logged");
        Ok(())
    }

    fn log_params(&self, _params: &BTreeMap<String, String>) -> Result<()> {
        Ok(())
    }

    fn log_metrics(&self, _metrics: &BTreeMap<String, f64>) -> Result<()> {
        Ok(())
    }
}

/// MLflow client: params and metrics go to the REST API, artifacts are
/// copied into the run's local artifact directory.
pub struct MlflowTracker {
    base_url: String,
    run_id: String,
    artifact_dir: PathBuf,
}

impl MlflowTracker {
    /// Create a new MLflow run. Fails with a tracking error if the server
    /// is unreachable or answers with a non-2xx status.
    pub fn start_run(config: &TrackingConfig) -> Result<Self> {
        let base_url = config
            .tracking_uri
            .as_deref()
            .ok_or_else(|| PipelineError::Tracking("no tracking_uri configured".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let response = post_json(
            &format!("{base_url}/api/2.0/mlflow/runs/create"),
            &json!({
                "experiment_id": config.experiment_id,
                "start_time": now_millis(),
            }),
        )?;
        let run_id = response["run"]["info"]["run_id"]
            .as_str()
            .ok_or_else(|| {
                PipelineError::Tracking("runs/create response missing run_id".to_string())
            })?
            .to_string();
        info!(run_id = %run_id, "mlflow run started");

        Ok(Self {
            base_url,
            run_id,
            artifact_dir: config.artifact_dir.clone(),
        })
    }

    /// Mark the run FINISHED.
    pub fn end_run(&self) -> Result<()> {
        post_json(
            &format!("{}/api/2.0/mlflow/runs/update", self.base_url),
            &json!({
                "run_id": self.run_id,
                "status": "FINISHED",
                "end_time": now_millis(),
            }),
        )?;
        info!(run_id = %self.run_id, "mlflow run finished");
        Ok(())
    }
}

impl ExperimentTracker for MlflowTracker {
    fn log_artifact(&self, path: &Path) -> Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            PipelineError::Tracking(format!("artifact path has no file name: {}", path.display()))
        })?;
        let dest_dir = self.artifact_dir.join(&self.run_id).join("artifacts");
        fs::create_dir_all(&dest_dir).map_err(|e| PipelineError::io(&dest_dir, e))?;
        let dest = dest_dir.join(file_name);
        fs::copy(path, &dest).map_err(|e| PipelineError::io(path, e))?;
        debug!(from = %path.display(), to = %dest.display(), "artifact logged");
        Ok(())
    }

    fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        let payload: Vec<Value> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        post_json(
            &format!("{}/api/2.0/mlflow/runs/log-batch", self.base_url),
            &json!({ "run_id": self.run_id, "params": payload }),
        )?;
        Ok(())
    }

    fn log_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let timestamp = now_millis();
        let payload: Vec<Value> = metrics
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": timestamp, "step": 0 }))
            .collect();
        post_json(
            &format!("{}/api/2.0/mlflow/runs/log-batch", self.base_url),
            &json!({ "run_id": self.run_id, "metrics": payload }),
        )?;
        Ok(())
    }
}

fn post_json(url: &str, body: &Value) -> Result<Value> {
    let response = ureq::post(url)
        .set("Content-Type", "application/json")
        .send_json(body)
        .map_err(|e| PipelineError::Tracking(format!("POST {url}: {e}")))?;
    response
        .into_json::<Value>()
        .map_err(|e| PipelineError::Tracking(format!("malformed response from {url}: {e}")))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
