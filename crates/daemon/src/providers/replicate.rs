use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::http::HttpClient;
use super::VideoProvider;
use crate::config::ReplicateConfig;
use crate::error::{PipelineError, PipelineResult};

const PROVIDER: &str = "replicate";

#[derive(Debug, Default, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    urls: PredictionUrls,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Observed state of a remote prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionState {
    Running,
    Succeeded { output_url: String },
    Failed(String),
}

/// Output is either a URL or a list whose first element is the URL.
fn output_url(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first()?.as_str().map(str::to_string),
        _ => None,
    }
}

impl Prediction {
    fn state(&self) -> PredictionState {
        match self.status.as_deref() {
            Some("succeeded") => match output_url(self.output.as_ref()) {
                Some(output_url) => PredictionState::Succeeded { output_url },
                None => PredictionState::Failed("prediction succeeded without output".to_string()),
            },
            Some(status @ ("failed" | "canceled")) => {
                let detail = self
                    .error
                    .as_ref()
                    .map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| status.to_string());
                PredictionState::Failed(detail)
            }
            _ => PredictionState::Running,
        }
    }
}

/// Asynchronous remote text-to-video: create, poll, download.
pub struct ReplicateVideo {
    http: HttpClient,
    config: ReplicateConfig,
}

impl ReplicateVideo {
    pub fn new(http: HttpClient, config: ReplicateConfig) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_token.is_some() && self.config.model_version.is_some()
    }

    fn credentials(&self) -> PipelineResult<(&str, &str)> {
        match (&self.config.api_token, &self.config.model_version) {
            (Some(token), Some(version)) => Ok((token.as_str(), version.as_str())),
            _ => Err(PipelineError::provider(PROVIDER, "api token or model version not configured")),
        }
    }

    /// Starts a prediction and returns its polling URL.
    pub async fn create_prediction(&self, prompt: &str, duration_seconds: u32) -> PipelineResult<String> {
        let (token, version) = self.credentials()?;
        let url = format!("{}/v1/predictions", self.config.api_base.trim_end_matches('/'));
        let body = json!({
            "version": version,
            "input": {"prompt": prompt, "duration": duration_seconds},
        });

        let response = self
            .http
            .send("replicate.create", |c| {
                c.post(&url)
                    .header("Authorization", format!("Token {token}"))
                    .timeout(self.config.request_timeout)
                    .json(&body)
            })
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::provider(
                PROVIDER,
                format!("create prediction returned {status}: {text}"),
            ));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;
        prediction
            .urls
            .get
            .ok_or_else(|| PipelineError::provider(PROVIDER, "prediction response has no polling URL"))
    }

    pub async fn poll_prediction(&self, poll_url: &str) -> PipelineResult<PredictionState> {
        let (token, _) = self.credentials()?;
        let response = self
            .http
            .send("replicate.poll", |c| {
                c.get(poll_url)
                    .header("Authorization", format!("Token {token}"))
                    .timeout(self.config.request_timeout)
            })
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;
        Ok(prediction.state())
    }

    /// Polls until a terminal state or until `max_wait` elapses.
    pub async fn wait_for_output(&self, poll_url: &str) -> PipelineResult<String> {
        let deadline = Instant::now() + self.config.max_wait;
        loop {
            match self.poll_prediction(poll_url).await? {
                PredictionState::Succeeded { output_url } => return Ok(output_url),
                PredictionState::Failed(detail) => {
                    return Err(PipelineError::provider(PROVIDER, format!("prediction failed: {detail}")))
                }
                PredictionState::Running => debug!(poll_url, "prediction still running"),
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::timeout("remote video prediction"));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Streams the result to `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> PipelineResult<()> {
        let mut response = self
            .http
            .send("replicate.download", |c| c.get(url).timeout(self.config.download_timeout))
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl VideoProvider for ReplicateVideo {
    async fn generate_video(
        &self,
        prompt: &str,
        duration_seconds: u32,
        job_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        let poll_url = self.create_prediction(prompt, duration_seconds).await?;
        info!(poll_url = %poll_url, "remote video prediction created");

        let output_url = self.wait_for_output(&poll_url).await?;
        let dest = job_dir.join("video_remote.mp4");
        self.download(&output_url, &dest).await?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::RetryPolicy;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> ReplicateVideo {
        let http = HttpClient::new(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
        .unwrap();
        ReplicateVideo::new(
            http,
            ReplicateConfig {
                api_token: Some("tok".to_string()),
                model_version: Some("v1".to_string()),
                api_base: server.uri(),
                poll_interval: Duration::from_millis(5),
                max_wait: Duration::from_millis(200),
                ..ReplicateConfig::default()
            },
        )
    }

    #[test]
    fn output_may_be_a_list() {
        let list = json!(["https://cdn/x.mp4", "https://cdn/y.mp4"]);
        assert_eq!(output_url(Some(&list)).as_deref(), Some("https://cdn/x.mp4"));
        assert_eq!(output_url(Some(&json!("https://cdn/z.mp4"))).as_deref(), Some("https://cdn/z.mp4"));
        assert_eq!(output_url(Some(&json!(42))), None);
    }

    #[tokio::test]
    async fn create_poll_download() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/v1/predictions/p1", server.uri());
        let file_url = format!("{}/files/out.mp4", server.uri());

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(header("Authorization", "Token tok"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "starting",
                "urls": {"get": poll_url},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "succeeded",
                "output": [file_url],
            })))
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/out.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp4".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output = provider(&server)
            .generate_video("a lighthouse", 6, dir.path())
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("video_remote.mp4"));
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"fake-mp4");
    }

    #[tokio::test]
    async fn failed_prediction_is_a_provider_error() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/v1/predictions/p2", server.uri());
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"urls": {"get": poll_url}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": "NSFW content detected",
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = provider(&server)
            .generate_video("x", 6, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Provider { provider: "replicate", .. }));
        assert!(err.to_string().contains("NSFW"));
    }

    #[tokio::test]
    async fn polling_is_bounded() {
        let server = MockServer::start().await;
        let poll_url = format!("{}/v1/predictions/p3", server.uri());
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"urls": {"get": poll_url}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = provider(&server)
            .generate_video("x", 6, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_a_request() {
        let server = MockServer::start().await;
        let mut provider = provider(&server);
        provider.config.api_token = None;

        assert!(!provider.is_configured());
        let err = provider.create_prediction("x", 6).await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
