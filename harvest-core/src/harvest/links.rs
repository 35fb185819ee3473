use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::browser::{BrowserError, BrowserResult};
use crate::config::LinksSection;

use super::error::HarvestError;
use super::metrics::HarvestMetrics;
use super::pacing::Pacer;

/// Follows redirects of a shortened link to its final location.
#[async_trait(?Send)]
pub trait LinkResolver {
    async fn resolve(&self, short_url: &str) -> BrowserResult<String>;
}

pub struct HttpLinkResolver {
    client: reqwest::Client,
}

impl HttpLinkResolver {
    pub fn new(config: &LinksSection) -> BrowserResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait(?Send)]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(&self, short_url: &str) -> BrowserResult<String> {
        let response = self.client.get(short_url).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(BrowserError::Network(format!(
                "{short_url} answered {status}"
            )));
        }
        Ok(response.url().to_string())
    }
}

/// Per-run link cache. Failures are cached too so a broken link costs one
/// request per run.
#[derive(Debug, Default)]
pub struct LinkCache {
    entries: HashMap<String, Option<String>>,
}

impl LinkCache {
    pub fn get(&self, short_url: &str) -> Option<&Option<String>> {
        self.entries.get(short_url)
    }

    pub fn insert(&mut self, short_url: String, resolved: Option<String>) {
        self.entries.insert(short_url, resolved);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves shortened links through a [`LinkResolver`], spaced and cached.
pub struct LinkExpander {
    resolver: Option<Box<dyn LinkResolver>>,
    pacer: Pacer,
}

impl LinkExpander {
    pub fn new(resolver: Option<Box<dyn LinkResolver>>, min_spacing: Duration) -> Self {
        Self {
            resolver,
            pacer: Pacer::new(min_spacing),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.resolver.is_some()
    }

    /// Returns the resolved targets in input order. Links that failed to
    /// resolve are left out.
    pub async fn expand(
        &mut self,
        short_urls: &[String],
        cache: &mut LinkCache,
        metrics: &mut HarvestMetrics,
    ) -> Vec<String> {
        let Some(resolver) = self.resolver.as_deref() else {
            return Vec::new();
        };

        let mut resolved = Vec::new();
        for short_url in short_urls {
            if let Some(cached) = cache.get(short_url) {
                debug!(url = %short_url, "link cache hit");
                resolved.extend(cached.clone());
                continue;
            }

            self.pacer.wait().await;
            metrics.record_link_resolution();
            let outcome = match resolver.resolve(short_url).await {
                Ok(target) => Some(target),
                Err(err) => {
                    let err = HarvestError::transient(short_url.as_str(), err);
                    warn!(error = %err, "link resolution failed");
                    metrics.record_link_failure();
                    None
                }
            };
            resolved.extend(outcome.clone());
            cache.insert(short_url.clone(), outcome);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct ScriptedResolver {
        calls: RefCell<Vec<String>>,
    }

    #[async_trait(?Send)]
    impl LinkResolver for ScriptedResolver {
        async fn resolve(&self, short_url: &str) -> BrowserResult<String> {
            self.calls.borrow_mut().push(short_url.to_string());
            if short_url.ends_with("broken") {
                Err(BrowserError::Network("connection reset".into()))
            } else {
                Ok(format!("https://example.com/{}", short_url.rsplit('/').next().unwrap()))
            }
        }
    }

    struct SharedResolver(std::rc::Rc<ScriptedResolver>);

    #[async_trait(?Send)]
    impl LinkResolver for SharedResolver {
        async fn resolve(&self, short_url: &str) -> BrowserResult<String> {
            self.0.resolve(short_url).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_links_cost_one_request() {
        let inner = std::rc::Rc::new(ScriptedResolver::default());
        let mut expander = LinkExpander::new(
            Some(Box::new(SharedResolver(inner.clone()))),
            Duration::from_millis(100),
        );
        let mut cache = LinkCache::default();
        let mut metrics = HarvestMetrics::default();

        let links = vec!["https://t.co/abc".to_string(), "https://t.co/broken".to_string()];
        let first = expander.expand(&links, &mut cache, &mut metrics).await;
        let second = expander.expand(&links, &mut cache, &mut metrics).await;

        assert_eq!(first, vec!["https://example.com/abc"]);
        assert_eq!(second, first);
        assert_eq!(inner.calls.borrow().len(), 2);
        assert_eq!(metrics.link_resolutions, 2);
        assert_eq!(metrics.link_failures, 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn disabled_expander_resolves_nothing() {
        let mut expander = LinkExpander::disabled();
        let mut cache = LinkCache::default();
        let mut metrics = HarvestMetrics::default();
        let resolved = expander
            .expand(&["https://t.co/x".to_string()], &mut cache, &mut metrics)
            .await;
        assert!(resolved.is_empty());
        assert!(cache.is_empty());
    }
}
