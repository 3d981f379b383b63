//! Session identity and the bootstrap that acquires it.
//!
//! A full render is expensive, so it happens once per run (plus once per
//! recovery). The resulting cookies and user agent are then replayed by every
//! lightweight fetch through the shared [`SessionSlot`].

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::stealth::jitter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Host the cookie is scoped to; a leading dot is ignored.
    pub domain: String,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }

    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    }
}

/// Trusted client identity: cookie set plus the user agent that earned it.
///
/// Never mutated after installation; recovery installs a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    cookies: Vec<Cookie>,
    user_agent: String,
    acquired_at: DateTime<Utc>,
    generation: u64,
}

impl SessionIdentity {
    pub fn new(
        cookies: Vec<Cookie>,
        user_agent: impl Into<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cookies,
            user_agent: user_agent.into(),
            acquired_at,
            generation: 0,
        }
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Install counter assigned by the [`SessionSlot`]; 0 before installation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|cookie| cookie.matches_host(host))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

/// The single live session shared by all workers.
///
/// Readers take a cheap `Arc` snapshot; installs swap the whole identity
/// under a short write lock. Serializing the bootstraps themselves is the
/// recovery coordinator's job.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: RwLock<Option<Arc<SessionIdentity>>>,
    generation: AtomicU64,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<SessionIdentity>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Generation of the installed session, 0 when none was ever installed.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn install(&self, mut identity: SessionIdentity) -> u64 {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let generation = self.generation.load(Ordering::Acquire) + 1;
        identity.generation = generation;
        *current = Some(Arc::new(identity));
        self.generation.store(generation, Ordering::Release);
        generation
    }
}

/// What a full render hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub cookies: Vec<Cookie>,
    pub user_agent: String,
}

/// Organic-browsing knobs passed to the renderer. Not needed for correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOptions {
    pub settle: Duration,
    pub scroll_steps: u32,
}

/// Full-render capability (a headless browser in production).
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Navigate, wait for a stable loaded state, settle, scroll, then read
    /// back the cookie jar and effective user agent.
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<RenderedPage, BootstrapError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("no cookies obtained from {url}")]
    NoCookies { url: String },
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("render failed: {0}")]
    Render(String),
}

/// What the run does when the initial bootstrap is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapFailurePolicy {
    /// Keep going without a session.
    #[default]
    Continue,
    /// Fail the run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub attempts: u32,
    /// Never shorter than the slowest legitimate full render.
    #[serde(with = "crate::config::duration_ms")]
    pub render_timeout: Duration,
    pub settle_ms: RangeInclusive<u64>,
    pub scroll_steps: u32,
    #[serde(with = "crate::config::duration_ms")]
    pub retry_backoff: Duration,
    pub max_rebootstraps: u32,
    pub on_failure: BootstrapFailurePolicy,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            render_timeout: Duration::from_secs(60),
            settle_ms: 800..=2_500,
            scroll_steps: 3,
            retry_backoff: Duration::from_secs(2),
            max_rebootstraps: 3,
            on_failure: BootstrapFailurePolicy::Continue,
        }
    }
}

/// Drives full-render navigations to obtain a [`SessionIdentity`].
pub struct SessionBootstrapper {
    renderer: Arc<dyn Renderer>,
    settings: BootstrapSettings,
}

impl SessionBootstrapper {
    pub fn new(renderer: Arc<dyn Renderer>, settings: BootstrapSettings) -> Self {
        Self { renderer, settings }
    }

    pub fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    /// One render of `seed_url`.
    pub async fn bootstrap(&self, seed_url: &str) -> Result<SessionIdentity, BootstrapError> {
        let options = NavigateOptions {
            settle: jitter(&self.settings.settle_ms),
            scroll_steps: self.settings.scroll_steps,
        };
        engine_debug!("Bootstrapping session from {} (settle {:?})", seed_url, options.settle);

        let page = tokio::time::timeout(
            self.settings.render_timeout,
            self.renderer.navigate(seed_url, &options),
        )
        .await
        .map_err(|_| BootstrapError::Timeout(self.settings.render_timeout))??;

        if page.cookies.is_empty() {
            return Err(BootstrapError::NoCookies {
                url: seed_url.to_string(),
            });
        }

        engine_info!(
            "Session bootstrapped from {} with {} cookies",
            seed_url,
            page.cookies.len()
        );
        Ok(SessionIdentity::new(page.cookies, page.user_agent, Utc::now()))
    }

    /// Bootstrap with up to `attempts` tries and linear backoff in between.
    pub async fn bootstrap_with_retries(
        &self,
        seed_url: &str,
    ) -> Result<SessionIdentity, BootstrapError> {
        let attempts = self.settings.attempts.max(1);
        let mut last_error = BootstrapError::Render("no attempt made".to_string());
        for attempt in 1..=attempts {
            match self.bootstrap(seed_url).await {
                Ok(identity) => return Ok(identity),
                Err(err) => {
                    engine_warn!("Bootstrap attempt {}/{} failed: {}", attempt, attempts, err);
                    last_error = err;
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                    }
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_are_domain_scoped() {
        let identity = SessionIdentity::new(
            vec![
                Cookie::new("sid", "1", ".example.com"),
                Cookie::new("other", "2", "tracker.net"),
            ],
            "UA",
            Utc::now(),
        );
        let url = Url::parse("https://jobs.example.com/offer/1").unwrap();
        assert_eq!(identity.cookie_header(&url).as_deref(), Some("sid=1"));

        let foreign = Url::parse("https://elsewhere.org/").unwrap();
        assert_eq!(identity.cookie_header(&foreign), None);
    }

    #[test]
    fn suffix_match_requires_dot_boundary() {
        let cookie = Cookie::new("a", "b", "example.com");
        assert!(cookie.matches_host("example.com"));
        assert!(cookie.matches_host("www.example.com"));
        assert!(!cookie.matches_host("badexample.com"));
    }

    #[test]
    fn install_bumps_generation() {
        let slot = SessionSlot::new();
        assert!(slot.snapshot().is_none());
        assert_eq!(slot.generation(), 0);

        let first = slot.install(SessionIdentity::new(vec![], "UA1", Utc::now()));
        let second = slot.install(SessionIdentity::new(vec![], "UA2", Utc::now()));
        assert_eq!((first, second), (1, 2));

        let current = slot.snapshot().unwrap();
        assert_eq!(current.user_agent(), "UA2");
        assert_eq!(current.generation(), 2);
    }
}
