use std::sync::atomic::{AtomicUsize, Ordering};

/// Supplies the proxy for the next outgoing connection, if any.
///
/// Both the lightweight fetcher and the renderer consult the same provider.
pub trait ProxyProvider: Send + Sync {
    fn next_proxy(&self) -> Option<String>;
}

/// Direct connections only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProxy;

impl ProxyProvider for NoProxy {
    fn next_proxy(&self) -> Option<String> {
        None
    }
}

/// Cycles through a fixed list of proxy URLs.
#[derive(Debug, Default)]
pub struct RoundRobinProxies {
    proxies: Vec<String>,
    cursor: AtomicUsize,
}

impl RoundRobinProxies {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl ProxyProvider for RoundRobinProxies {
    fn next_proxy(&self) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_around() {
        let proxies = RoundRobinProxies::new(vec!["http://a:1".into(), "http://b:2".into()]);
        let picked: Vec<_> = (0..3).filter_map(|_| proxies.next_proxy()).collect();
        assert_eq!(picked, vec!["http://a:1", "http://b:2", "http://a:1"]);
        assert_eq!(RoundRobinProxies::default().next_proxy(), None);
    }
}
