use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::decode::decode_html;
use crate::proxy::{NoProxy, ProxyProvider};
use crate::{FailureKind, FetchError, FetchRequest, FetchResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    #[serde(with = "crate::config::duration_ms")]
    pub connect_timeout: Duration,
    /// Hard per-request ceiling; bounds a wedged connection.
    #[serde(with = "crate::config::duration_ms")]
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Lightweight fetch capability: `fetch(url, headers) -> {status, body}`.
///
/// Non-2xx answers are returned as results; only transport problems are errors.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError>;
}

/// reqwest-backed fetcher with one pooled client per proxy.
pub struct ReqwestFetcher {
    settings: FetchSettings,
    proxies: Arc<dyn ProxyProvider>,
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self::with_proxies(settings, Arc::new(NoProxy))
    }

    pub fn with_proxies(settings: FetchSettings, proxies: Arc<dyn ProxyProvider>) -> Self {
        Self {
            settings,
            proxies,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<String>) -> Result<reqwest::Client, FetchError> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&proxy) {
            return Ok(client.clone());
        }
        let client = build_client(&self.settings, proxy.as_deref())?;
        clients.insert(proxy, client.clone());
        Ok(client)
    }
}

pub(crate) fn build_client(
    settings: &FetchSettings,
    proxy: Option<&str>,
) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit));
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
}

pub(crate) fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => engine_warn!("Dropping unrepresentable header {}", name),
        }
    }
    map
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let parsed = reqwest::Url::parse(&request.url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = self.client_for(self.proxies.next_proxy())?;
        let started = Instant::now();

        let response = client
            .get(parsed)
            .headers(header_map(&request.headers))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let bytes = read_capped(response, self.settings.max_bytes).await?;
        let decoded = decode_html(&bytes, content_type.as_deref());
        if decoded.lossy {
            engine_debug!(
                "Decoded {} as {} with replacement characters",
                final_url,
                decoded.encoding_label
            );
        }

        Ok(FetchResult {
            requested_url: request.url.clone(),
            final_url,
            status,
            content_type,
            body: decoded.html,
            elapsed: started.elapsed(),
        })
    }
}

pub(crate) async fn read_capped(
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        let next_len = bytes.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(FetchError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(next_len),
                },
                "response too large",
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
