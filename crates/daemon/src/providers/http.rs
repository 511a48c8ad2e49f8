//! Shared HTTP client with transport-level retry.
//!
//! Retries here cover connect/read failures and a fixed set of transient
//! status codes. They are independent of stage-level provider fallback.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each retry).
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            retry_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(policy: RetryPolicy) -> reqwest::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, policy })
    }

    /// Underlying client for single-shot requests such as health probes.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request built by `build`, rebuilding it for each retry.
    ///
    /// A response with a retryable status is returned as-is once retries are
    /// exhausted; callers decide what a non-success status means.
    pub async fn send<F>(&self, operation: &str, build: F) -> reqwest::Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retry = 0;
        loop {
            match build(&self.client).send().await {
                Ok(response)
                    if retry < self.policy.max_retries
                        && self.policy.is_retryable_status(response.status()) =>
                {
                    debug!(operation, status = %response.status(), retry, "retrying after transient status");
                }
                Ok(response) => return Ok(response),
                Err(err) if retry < self.policy.max_retries && RetryPolicy::is_retryable_error(&err) => {
                    debug!(operation, error = %err, retry, "retrying after transport error");
                }
                Err(err) => return Err(err),
            }
            retry += 1;
            tokio::time::sleep(self.policy.delay_for_retry(retry)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn retries_transient_statuses_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        let http = HttpClient::new(fast_policy()).unwrap();
        let url = format!("{}/flaky", server.uri());
        let response = http.send("flaky", |c| c.get(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = HttpClient::new(fast_policy()).unwrap();
        let url = format!("{}/missing", server.uri());
        let response = http.send("missing", |c| c.post(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let http = HttpClient::new(fast_policy()).unwrap();
        let url = format!("{}/down", server.uri());
        let response = http.send("down", |c| c.get(&url)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }
}
