//! HTTP model backends.
//!
//! Each backend owns its own `reqwest::Client`; nothing is process-global.
//! HTTP failures are mapped onto [`BackendError`] so the session layer can
//! tell what is worth retrying:
//!
//! | Response                               | Error         | Retried |
//! |----------------------------------------|---------------|---------|
//! | 429                                    | `RateLimited` | yes     |
//! | 500, 502, 503, 504, 529                | `Unavailable` | yes     |
//! | timeout, connect, dropped body         | `Unavailable` | yes     |
//! | anything else (401, 400, 404, ...)     | `Fatal`       | no      |

pub mod gemini;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use coordination::{Backend, BackendError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::{Provider, ProviderEnv, RoundtableConfig};

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

/// Backends keyed by provider.
pub type BackendSet = HashMap<Provider, Arc<dyn Backend>>;

const HTTP_TIMEOUT_SECS: u64 = 300;

/// Build one backend per provider the config uses.
///
/// Fails if a provider in use has no API key in the environment.
pub fn build_backends(config: &RoundtableConfig, env: &ProviderEnv) -> Result<BackendSet> {
    let mut backends: BackendSet = HashMap::new();
    for provider in config.providers() {
        let backend: Arc<dyn Backend> = match provider {
            Provider::OpenAi => {
                let Some(key) = env.openai_api_key.clone() else {
                    bail!("OPENAI_API_KEY is not set but an openai participant is configured");
                };
                Arc::new(OpenAiBackend::new(http_client()?, &env.openai_base_url, key))
            }
            Provider::Gemini => {
                let Some(key) = env.gemini_api_key.clone() else {
                    bail!("GEMINI_API_KEY is not set but a gemini participant is configured");
                };
                Arc::new(GeminiBackend::new(http_client()?, &env.gemini_base_url, key))
            }
        };
        backends.insert(provider, backend);
    }
    Ok(backends)
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Map a non-success HTTP status onto a backend error.
pub(crate) fn classify_status(
    backend: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> BackendError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 500));
    match status.as_u16() {
        429 => BackendError::RateLimited {
            backend: backend.to_string(),
            message,
            retry_after: retry_after(headers),
        },
        500 | 502 | 503 | 504 | 529 => BackendError::unavailable(backend, message),
        _ => BackendError::fatal(backend, message),
    }
}

/// Map a transport-level `reqwest` failure onto a backend error.
pub(crate) fn classify_transport(backend: &str, err: &reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        BackendError::unavailable(backend, err.to_string())
    } else {
        BackendError::fatal(backend, err.to_string())
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        let headers = HeaderMap::new();
        let err = classify_status("openai", StatusCode::TOO_MANY_REQUESTS, &headers, "slow");
        assert!(matches!(err, BackendError::RateLimited { .. }));
        for code in [500u16, 502, 503, 504, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status("gemini", status, &headers, "");
            assert!(matches!(err, BackendError::Unavailable { .. }), "{code}");
        }
        for code in [400u16, 401, 403, 404, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!classify_status("openai", status, &headers, "").is_transient());
        }
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = classify_status("openai", StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 50), "short");
    }

    #[test]
    fn test_missing_key_is_reported() {
        let config = RoundtableConfig::from_toml(
            "[[participants]]\nprovider = \"gemini\"\nmodel = \"gemini-2.0-flash\"\n",
        )
        .unwrap();
        let err = build_backends(&config, &ProviderEnv::default()).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let env = ProviderEnv {
            gemini_api_key: Some("k".into()),
            ..ProviderEnv::default()
        };
        let backends = build_backends(&config, &env).unwrap();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[&Provider::Gemini].provider(), "gemini");
    }
}
