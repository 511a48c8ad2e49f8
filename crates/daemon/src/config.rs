//! Daemon configuration, read from the environment.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::providers::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub job_output_dir: PathBuf,
    pub editor_runtime_dir: PathBuf,
    pub sd_host: SdHostConfig,
    pub replicate: ReplicateConfig,
    pub elevenlabs: ElevenLabsConfig,
    /// Local text-to-speech binary, looked up on `PATH`.
    pub espeak_binary: String,
    pub retry: RetryPolicy,
}

/// Local on-demand image provider.
#[derive(Debug, Clone)]
pub struct SdHostConfig {
    pub base_url: String,
    /// Bound on the readiness gate.
    pub startup_timeout: Duration,
    /// Per-request timeout for health probes.
    pub health_timeout: Duration,
    pub health_poll_interval: Duration,
    pub generate_timeout: Duration,
}

impl Default for SdHostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://sd-host:9000".to_string(),
            startup_timeout: Duration::from_secs(300),
            health_timeout: Duration::from_secs(2),
            health_poll_interval: Duration::from_secs(2),
            generate_timeout: Duration::from_secs(600),
        }
    }
}

/// Remote video generation provider.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: Option<String>,
    pub model_version: Option<String>,
    pub api_base: String,
    pub poll_interval: Duration,
    /// Total bound on polling, distinct from per-request timeouts.
    pub max_wait: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            model_version: None,
            api_base: "https://api.replicate.com".to_string(),
            poll_interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(900),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(180),
        }
    }
}

/// Remote narration provider.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: None,
            model_id: "eleven_multilingual_v2".to_string(),
            api_base: "https://api.elevenlabs.io".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            job_output_dir: PathBuf::from("runtime/jobs"),
            editor_runtime_dir: PathBuf::from("runtime/editor"),
            sd_host: SdHostConfig::default(),
            replicate: ReplicateConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
            espeak_binary: "espeak-ng".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env_value(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let bind_addr = match env_value("BIND_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("BIND_ADDR {addr:?} is not a socket address"))?,
            None => defaults.bind_addr,
        };

        let sd_defaults = SdHostConfig::default();
        let sd_host = SdHostConfig {
            base_url: env_value("SD_HOST")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(sd_defaults.base_url),
            startup_timeout: env_secs("SD_STARTUP_TIMEOUT_SECONDS", sd_defaults.startup_timeout),
            health_timeout: env_secs("SD_HEALTH_TIMEOUT_SECONDS", sd_defaults.health_timeout),
            health_poll_interval: sd_defaults.health_poll_interval,
            generate_timeout: env_secs("SD_GENERATE_TIMEOUT_SECONDS", sd_defaults.generate_timeout),
        };

        let replicate_defaults = ReplicateConfig::default();
        let replicate = ReplicateConfig {
            api_token: env_value("REPLICATE_API_TOKEN"),
            model_version: env_value("REPLICATE_MODEL_VERSION"),
            api_base: env_value("REPLICATE_API_BASE").unwrap_or(replicate_defaults.api_base),
            poll_interval: env_secs("REPLICATE_POLL_INTERVAL_SECONDS", replicate_defaults.poll_interval),
            max_wait: env_secs("REPLICATE_MAX_WAIT_SECONDS", replicate_defaults.max_wait),
            ..replicate_defaults
        };

        let eleven_defaults = ElevenLabsConfig::default();
        let elevenlabs = ElevenLabsConfig {
            api_key: env_value("ELEVENLABS_API_KEY"),
            voice_id: env_value("ELEVENLABS_VOICE_ID"),
            model_id: env_value("ELEVENLABS_MODEL_ID").unwrap_or(eleven_defaults.model_id),
            api_base: env_value("ELEVENLABS_API_BASE").unwrap_or(eleven_defaults.api_base),
            ..eleven_defaults
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: env_value("HTTP_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(retry_defaults.max_retries),
            base_delay: env_value("HTTP_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
            ..retry_defaults
        };

        Ok(Self {
            bind_addr,
            job_output_dir: env_value("JOB_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.job_output_dir),
            editor_runtime_dir: env_value("EDITOR_RUNTIME_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.editor_runtime_dir),
            sd_host,
            replicate,
            elevenlabs,
            espeak_binary: env_value("ESPEAK_BINARY").unwrap_or(defaults.espeak_binary),
            retry,
        })
    }
}
