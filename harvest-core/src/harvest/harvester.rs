use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use url::form_urlencoded::byte_serialize;
use uuid::Uuid;

use crate::browser::{BrowserDriver, ResponseReceiver};
use crate::config::{HarvesterConfig, HydrationSection, LinksSection, SessionSection};
use crate::error::ConfigError;
use crate::session::SessionCookies;

use super::classifier::ResponseClassifier;
use super::error::HarvestResult;
use super::filter::PostFilter;
use super::hydration::HydrationService;
use super::links::{HttpLinkResolver, LinkExpander, LinkResolver};
use super::metrics::HarvestMetrics;
use super::normalizer::PostNormalizer;
use super::options::{HarvestConfig, Target};
use super::pagination::{PaginationController, PaginationSettings, StopReason};
use super::pipeline::HarvestPipeline;
use super::post::Post;
use super::state::HarvestSession;

const LATEST_TAB_LABEL: &str = "Latest";

/// Everything handed to the output sink once the run completes.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub target: Target,
    pub posts: Vec<Post>,
    pub stop_reason: StopReason,
    pub iterations: usize,
    pub metrics: HarvestMetrics,
}

/// One bounded harvest of a single target.
pub struct Harvester {
    config: HarvestConfig,
    base_url: String,
    session: SessionSection,
    hydration: HydrationSection,
    links: LinksSection,
    resolver: Option<Box<dyn LinkResolver>>,
}

impl Harvester {
    pub fn new(config: HarvestConfig, settings: &HarvesterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            base_url: settings.harvest.base_url.trim_end_matches('/').to_string(),
            session: settings.session.clone(),
            hydration: settings.hydration.clone(),
            links: settings.links.clone(),
            resolver: None,
        })
    }

    pub fn with_link_resolver(mut self, resolver: Box<dyn LinkResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Profile page, or the live search page when the target is a query or
    /// a date bound is set.
    pub fn start_url(&self) -> String {
        if !self.config.uses_search() {
            if let Target::Account(handle) = &self.config.target {
                return format!("{}/{handle}", self.base_url);
            }
        }
        let encoded: String = byte_serialize(self.search_query().as_bytes()).collect();
        format!(
            "{}/search?q={encoded}&src=typed_query&f=live",
            self.base_url
        )
    }

    pub fn search_query(&self) -> String {
        let mut terms = vec![match &self.config.target {
            Target::Account(handle) => format!("from:{handle}"),
            Target::Query(query) => query.clone(),
        }];
        if let Some(since) = self.config.since {
            terms.push(format!("since:{}", since.format("%Y-%m-%d")));
        }
        if let Some(before) = self.config.before {
            terms.push(format!("until:{}", before.format("%Y-%m-%d")));
        }
        terms.join(" ")
    }

    pub fn verify_session(&self, cookies: &SessionCookies) -> HarvestResult<()> {
        cookies.validate(&self.session.cookie_domain, &self.session.required_cookies)?;
        Ok(())
    }

    /// Runs the harvest to completion. Only a missing session aborts, and it
    /// does so before any navigation.
    pub async fn run(
        mut self,
        cookies: &SessionCookies,
        driver: &dyn BrowserDriver,
        mut events: ResponseReceiver,
    ) -> HarvestResult<HarvestReport> {
        self.verify_session(cookies)?;

        let start_url = self.start_url();
        let mut session = HarvestSession::new();
        let links = self.link_expander();
        let cap = self.config.max_post_count;
        let fallback_handle = self.config.target.handle().map(str::to_string);
        let mut pipeline = HarvestPipeline::new(
            ResponseClassifier::default(),
            PostNormalizer::new(self.base_url.clone(), fallback_handle),
            HydrationService::new(&self.hydration),
            links,
            PostFilter::from_config(&self.config),
            cap,
        );

        info!(
            run_id = %session.run_id,
            target = %self.config.target,
            content = %self.config.content_type,
            url = %start_url,
            cap,
            "starting harvest"
        );
        if let Err(err) = driver.navigate(&start_url).await {
            warn!(url = %start_url, error = %err, "navigation failed");
        }
        if self.config.uses_search() {
            match driver.click_text(LATEST_TAB_LABEL).await {
                Ok(true) => debug!("switched to latest tab"),
                Ok(false) => debug!("latest tab not found"),
                Err(err) => warn!(error = %err, "could not switch to latest tab"),
            }
        }

        let mut controller =
            PaginationController::new(PaginationSettings::from_config(&self.config));
        controller
            .prime(driver, &mut events, &mut pipeline, &mut session)
            .await;
        let outcome = controller
            .run(driver, &mut events, &mut pipeline, &mut session)
            .await;

        let HarvestSession {
            run_id,
            collector,
            metrics,
            ..
        } = session;
        let posts = collector.finish(cap);
        info!(
            run_id = %run_id,
            posts = posts.len(),
            reason = %outcome.stop_reason,
            iterations = outcome.iterations,
            hydrations = metrics.hydration_attempts,
            hydration_success_rate = metrics.hydration_success_rate(),
            "harvest finished"
        );
        Ok(HarvestReport {
            run_id,
            target: self.config.target,
            posts,
            stop_reason: outcome.stop_reason,
            iterations: outcome.iterations,
            metrics,
        })
    }

    fn link_expander(&mut self) -> LinkExpander {
        let spacing = Duration::from_millis(self.links.min_spacing_ms);
        if !self.links.enabled {
            return LinkExpander::disabled();
        }
        if let Some(resolver) = self.resolver.take() {
            return LinkExpander::new(Some(resolver), spacing);
        }
        match HttpLinkResolver::new(&self.links) {
            Ok(resolver) => LinkExpander::new(Some(Box::new(resolver)), spacing),
            Err(err) => {
                warn!(error = %err, "link resolution disabled");
                LinkExpander::disabled()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::load_harvester_config;
    use crate::harvest::error::HarvestError;
    use crate::session::CookieRecord;

    fn settings() -> HarvesterConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/harvester.toml");
        load_harvester_config(path).unwrap()
    }

    fn harvester(target: &str) -> Harvester {
        let settings = settings();
        Harvester::new(HarvestConfig::new(Target::parse(target), &settings.harvest), &settings)
            .unwrap()
    }

    #[test]
    fn profile_targets_navigate_to_profile() {
        assert_eq!(harvester("@rustlang").start_url(), "https://x.com/rustlang");
    }

    #[test]
    fn date_bounds_switch_to_live_search() {
        let settings = settings();
        let mut config = HarvestConfig::new(Target::parse("rustlang"), &settings.harvest);
        config.since = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        config.before = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        let harvester = Harvester::new(config, &settings).unwrap();
        assert_eq!(
            harvester.search_query(),
            "from:rustlang since:2024-01-01 until:2024-02-01"
        );
        assert_eq!(
            harvester.start_url(),
            "https://x.com/search?q=from%3Arustlang+since%3A2024-01-01+until%3A2024-02-01&src=typed_query&f=live"
        );
    }

    #[test]
    fn raw_queries_are_searched_verbatim() {
        assert_eq!(harvester("rust release notes").search_query(), "rust release notes");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let settings = settings();
        let mut config = HarvestConfig::new(Target::parse("a"), &settings.harvest);
        config.max_post_count = 0;
        assert!(Harvester::new(config, &settings).is_err());
    }

    #[test]
    fn missing_auth_cookies_are_fatal() {
        let cookies = SessionCookies::new(vec![CookieRecord {
            name: "ct0".into(),
            value: "token".into(),
            domain: ".x.com".into(),
            path: "/".into(),
            expires: None,
            http_only: false,
            secure: true,
            same_site: None,
        }]);
        let err = harvester("a").verify_session(&cookies).unwrap_err();
        assert!(matches!(err, HarvestError::FatalAuth(_)));
        assert!(err.is_fatal());
    }
}
