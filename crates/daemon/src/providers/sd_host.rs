use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::http::HttpClient;
use super::ImageProvider;
use crate::config::SdHostConfig;
use crate::error::{PipelineError, PipelineResult};

const PROVIDER: &str = "sd-host";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    image_base64: Option<String>,
}

/// Client for the local image host, which loads its model on demand.
pub struct SdHostClient {
    http: HttpClient,
    config: SdHostConfig,
    /// One inference at a time.
    inference: Mutex<()>,
}

impl SdHostClient {
    pub fn new(http: HttpClient, config: SdHostConfig) -> Self {
        Self {
            http,
            config,
            inference: Mutex::new(()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ImageProvider for SdHostClient {
    async fn is_ready(&self) -> bool {
        let response = self
            .http
            .client()
            .get(self.url("/health"))
            .timeout(self.config.health_timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|h| h.status.as_deref() == Some("ok"))
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "image host not ready");
                false
            }
            Err(err) => {
                debug!(error = %err, "image host unreachable");
                false
            }
        }
    }

    async fn wait_until_ready(&self) -> PipelineResult<()> {
        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.is_ready().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::timeout("local image provider startup"));
            }
            sleep(self.config.health_poll_interval).await;
        }
    }

    async fn generate_image(&self, prompt: &str) -> PipelineResult<Bytes> {
        let _guard = self.inference.lock().await;
        info!(host = %self.config.base_url, "generating image");

        let url = self.url("/generate");
        let body = json!({ "prompt": prompt });
        let response = self
            .http
            .send("sd_host.generate", |c| {
                c.post(&url).timeout(self.config.generate_timeout).json(&body)
            })
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::provider(PROVIDER, e))?;
        let encoded = payload
            .image_base64
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::provider(PROVIDER, "response carried no image data"))?;

        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| PipelineError::provider(PROVIDER, format!("invalid image data: {e}")))?;
        Ok(Bytes::from(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SdHostClient {
        let http = HttpClient::new(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        })
        .unwrap();
        SdHostClient::new(
            http,
            SdHostConfig {
                base_url: server.uri(),
                startup_timeout: Duration::from_millis(60),
                health_timeout: Duration::from_millis(200),
                health_poll_interval: Duration::from_millis(10),
                generate_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn ready_only_when_status_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "loading"})))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.is_ready().await);
        assert!(client.is_ready().await);
    }

    #[tokio::test]
    async fn readiness_gate_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).wait_until_ready().await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
        assert!(err.to_string().contains("local image provider startup"));
    }

    #[tokio::test]
    async fn decodes_generated_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_json(json!({"prompt": "a red fox"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "image_base64": STANDARD.encode(b"\x89PNG-bytes"),
            })))
            .mount(&server)
            .await;

        let bytes = client(&server).generate_image("a red fox").await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG-bytes");
    }

    #[tokio::test]
    async fn empty_image_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"image_base64": ""})))
            .mount(&server)
            .await;

        let err = client(&server).generate_image("x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider { provider: "sd-host", .. }));
    }
}
