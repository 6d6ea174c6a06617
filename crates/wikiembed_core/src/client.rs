use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

use crate::config::EmbedConfig;
use crate::wiki::WikiReference;

/// Why a round trip to a wiki produced no usable payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("no wiki at {url}")]
    WikiNotFound { url: String },
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },
    #[error("unexpected response from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Anonymous read access to any MediaWiki action API.
///
/// Methods take `&self` so one client can serve concurrent secondary fetches.
pub trait WikiApi: Send + Sync {
    fn get_json(&self, wiki: &WikiReference, params: &[(&str, String)])
    -> Result<Value, FetchError>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &EmbedConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            max_retries: config.retries(),
            retry_delay_ms: config.retry_delay_ms(),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    request_count: AtomicUsize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: AtomicUsize::new(0),
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl WikiApi for MediaWikiClient {
    fn get_json(
        &self,
        wiki: &WikiReference,
        params: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let api_url = wiki.api_url();
        let base_url = Url::parse(&api_url).map_err(|error| FetchError::Malformed {
            url: api_url.clone(),
            message: format!("invalid API URL: {error}"),
        })?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }
        let action = params
            .iter()
            .find(|(key, _)| *key == "action")
            .map(|(_, value)| value.as_str())
            .unwrap_or("query");

        for attempt in 0..=self.config.max_retries {
            self.request_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(wiki = %wiki.key(), action, attempt, "api request");
            let response = self.client.get(base_url.clone()).query(&pairs).send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE)
                        || is_missing_wiki_redirect(response.url())
                    {
                        return Err(FetchError::WikiNotFound { url: api_url });
                    }
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        return Err(FetchError::Transport {
                            url: api_url,
                            message: format!("HTTP {status}"),
                        });
                    }

                    let payload: Value =
                        response.json().map_err(|error| FetchError::Malformed {
                            url: api_url.clone(),
                            message: format!("failed to decode JSON: {error}"),
                        })?;
                    return check_api_error(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: api_url,
                        message: error.to_string(),
                    });
                }
            }
        }

        Err(FetchError::Transport {
            url: api_url,
            message: "retry budget exhausted".to_string(),
        })
    }
}

/// Lift a MediaWiki `error` object into [`FetchError::Api`].
pub fn check_api_error(payload: Value) -> Result<Value, FetchError> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(FetchError::Api {
            code: code.to_string(),
            info: info.to_string(),
        });
    }
    Ok(payload)
}

/// Farms answer requests for unknown member wikis by redirecting to a
/// "not a valid community" landing page.
fn is_missing_wiki_redirect(url: &Url) -> bool {
    let path = url.path();
    path.contains("Special:NotAValidWiki") || path.contains("not-a-valid-community")
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_api_error_maps_error_object() {
        let error = check_api_error(json!({
            "error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}
        }))
        .expect_err("must fail");
        assert_eq!(
            error,
            FetchError::Api {
                code: "missingtitle".to_string(),
                info: "The page you specified doesn't exist.".to_string(),
            }
        );
        assert!(error.to_string().contains("missingtitle"));
    }

    #[test]
    fn check_api_error_passes_payloads_through() {
        let payload = check_api_error(json!({"query": {"pages": []}})).expect("payload");
        assert!(payload.get("query").is_some());
    }

    #[test]
    fn missing_wiki_redirects_are_recognized() {
        let url = Url::parse("https://community.fandom.com/wiki/Special:NotAValidWiki?from=nope")
            .expect("url");
        assert!(is_missing_wiki_redirect(&url));
        let url = Url::parse("https://nope.fandom.com/api.php").expect("url");
        assert!(!is_missing_wiki_redirect(&url));
    }

    #[test]
    fn retryable_statuses_match_transient_failures() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn client_config_reads_http_section() {
        let config: EmbedConfig =
            toml::from_str("[http]\ntimeout_ms = 2500\nretries = 3\n").expect("config");
        let client_config = MediaWikiClientConfig::from_config(&config);
        assert_eq!(client_config.timeout_ms, 2_500);
        assert_eq!(client_config.max_retries, 3);
        assert!(MediaWikiClient::new(client_config).is_ok());
    }
}
