use std::sync::Arc;

use engine_logging::{engine_debug, engine_trace};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE, USER_AGENT};
use url::Url;

use crate::decode::decode_html;
use crate::fetch::{header_map, map_reqwest_error, read_capped, FetchSettings};
use crate::proxy::{NoProxy, ProxyProvider};
use crate::session::{BootstrapError, Cookie, NavigateOptions, RenderedPage, Renderer};
use crate::stealth::{browser_headers, FALLBACK_USER_AGENT};

/// Renderer that performs a plain GET and collects `Set-Cookie` headers
/// across the redirect chain.
///
/// It executes no javascript, so it only earns a session from sites that
/// hand out cookies on first contact. Swap in a headless browser behind
/// [`Renderer`] for sites that need a real render.
pub struct PlainHttpRenderer {
    settings: FetchSettings,
    user_agent: String,
    accept_language: String,
    proxies: Arc<dyn ProxyProvider>,
}

impl PlainHttpRenderer {
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            settings,
            user_agent: FALLBACK_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            proxies: Arc::new(NoProxy),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    pub fn with_proxies(mut self, proxies: Arc<dyn ProxyProvider>) -> Self {
        self.proxies = proxies;
        self
    }

    fn client(&self) -> Result<reqwest::Client, BootstrapError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy) = self.proxies.next_proxy() {
            let proxy = reqwest::Proxy::all(&proxy)
                .map_err(|err| BootstrapError::Render(err.to_string()))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|err| BootstrapError::Render(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Renderer for PlainHttpRenderer {
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<RenderedPage, BootstrapError> {
        let client = self.client()?;
        let mut current = Url::parse(url).map_err(|err| BootstrapError::Render(err.to_string()))?;
        let mut cookies: Vec<Cookie> = Vec::new();
        let mut hops = 0;

        let response = loop {
            let mut request = client
                .get(current.clone())
                .headers(header_map(&browser_headers(&self.accept_language, None)))
                .header(USER_AGENT, self.user_agent.as_str());
            if let Some(header) = cookie_header(&cookies, &current) {
                request = request.header(COOKIE, header);
            }
            let response = request
                .send()
                .await
                .map_err(|err| BootstrapError::Render(map_reqwest_error(err).to_string()))?;

            for value in response.headers().get_all(SET_COOKIE) {
                let parsed = value
                    .to_str()
                    .ok()
                    .and_then(|raw| parse_set_cookie(raw, &current));
                if let Some(cookie) = parsed {
                    engine_trace!("Render received cookie {} for {}", cookie.name, cookie.domain);
                    cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
                    cookies.push(cookie);
                }
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| current.join(location).ok());
            match location {
                Some(next) if response.status().is_redirection() => {
                    hops += 1;
                    if hops > self.settings.redirect_limit {
                        return Err(BootstrapError::Render("redirect limit exceeded".to_string()));
                    }
                    current = next;
                }
                _ => break response,
            }
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = read_capped(response, self.settings.max_bytes)
            .await
            .map_err(|err| BootstrapError::Render(err.to_string()))?;
        let html = decode_html(&bytes, content_type.as_deref()).html;

        // Nothing to scroll without a layout engine; settling still spaces
        // the bootstrap away from the first lightweight fetch.
        engine_debug!(
            "Plain render of {} settled for {:?} ({} scroll steps skipped)",
            url,
            options.settle,
            options.scroll_steps
        );
        tokio::time::sleep(options.settle).await;

        Ok(RenderedPage {
            html,
            cookies,
            user_agent: self.user_agent.clone(),
        })
    }
}

fn cookie_header(cookies: &[Cookie], url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let pairs: Vec<String> = cookies
        .iter()
        .filter(|cookie| cookie.matches_host(host))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("; "))
}

/// Parses a `Set-Cookie` value; host-only cookies are scoped to `origin`.
pub(crate) fn parse_set_cookie(raw: &str, origin: &Url) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let domain = parts
        .filter_map(|attr| attr.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("domain"))
        .map(|(_, domain)| domain.trim().to_string())
        .or_else(|| origin.host_str().map(str::to_string))?;
    Some(Cookie::new(name, value.trim(), domain))
}
