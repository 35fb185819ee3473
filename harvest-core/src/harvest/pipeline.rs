use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::browser::{BrowserDriver, ResponseEvent};

use super::classifier::{Classification, ResponseClassifier};
use super::error::HarvestError;
use super::filter::{PostFilter, Verdict};
use super::hydration::HydrationService;
use super::links::LinkExpander;
use super::normalizer::PostNormalizer;
use super::record::LegacyPostRecord;
use super::state::HarvestSession;
use super::walker::walk;

const RETWEET_MARKER: &str = "RT @";

/// Turns one intercepted response into collected posts: classify, walk,
/// dedup, hydrate, normalize, filter, expand links, collect.
pub struct HarvestPipeline {
    classifier: ResponseClassifier,
    normalizer: PostNormalizer,
    hydration: HydrationService,
    links: LinkExpander,
    filter: PostFilter,
    cap: usize,
}

impl HarvestPipeline {
    pub fn new(
        classifier: ResponseClassifier,
        normalizer: PostNormalizer,
        hydration: HydrationService,
        links: LinkExpander,
        filter: PostFilter,
        cap: usize,
    ) -> Self {
        Self {
            classifier,
            normalizer,
            hydration,
            links,
            filter,
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Handles one response event to completion. Returns how many posts it
    /// added to the collector.
    pub async fn handle(
        &mut self,
        driver: &dyn BrowserDriver,
        session: &mut HarvestSession,
        event: ResponseEvent,
    ) -> usize {
        session.metrics.record_response();
        let (family, body) = match self.classifier.classify(&event) {
            Classification::Ignored => {
                trace!(url = %event.url, "ignoring response");
                session.metrics.record_ignored_response();
                return 0;
            }
            Classification::Malformed(err) => {
                warn!(url = %event.url, error = %err, "skipping malformed response body");
                session.metrics.record_malformed_response();
                return 0;
            }
            Classification::Timeline { descriptor, body } => (descriptor, body),
        };

        let page = walk(&body, family.paths);
        if !page.schema_matched {
            let err = HarvestError::MalformedSchema {
                url: event.url.clone(),
            };
            warn!(family = %family.family, error = %err, "treating response as empty");
            session.metrics.record_schema_miss();
            return 0;
        }
        if let Some(cursor) = page.cursor {
            session.observe_cursor(cursor);
        }
        session.metrics.record_entries(page.tweets.len() as u64);
        debug!(
            family = %family.family,
            entries = page.tweets.len(),
            "walked timeline response"
        );

        let mut added = 0;
        for raw in &page.tweets {
            if self.process_entry(driver, session, raw).await {
                added += 1;
            }
        }
        added
    }

    async fn process_entry(
        &mut self,
        driver: &dyn BrowserDriver,
        session: &mut HarvestSession,
        raw: &Value,
    ) -> bool {
        if session.collected() >= self.cap {
            session.metrics.record_skipped_at_cap();
            return false;
        }

        let Some(mut record) = LegacyPostRecord::from_result(raw) else {
            session.metrics.record_missing_id();
            return false;
        };
        let Some(id) = record.id() else {
            debug!("dropping entry without id");
            session.metrics.record_missing_id();
            return false;
        };
        if !session.mark_seen(&id) {
            trace!(post_id = %id, "duplicate post");
            session.metrics.record_duplicate();
            return false;
        }

        if self.hydration.should_hydrate(&record) {
            let hydrated = self.hydration.hydrate(driver, &id, &mut record).await;
            session.metrics.record_hydration(hydrated);
        }

        let retweeted = self.retweeted_original(driver, session, &record).await;
        let draft = self.normalizer.normalize(&id, &record, retweeted.as_ref());
        match self.filter.verdict(&draft.post) {
            Verdict::Keep => {}
            verdict => {
                debug!(post_id = %id, ?verdict, "post filtered out");
                session.metrics.record_filtered();
                return false;
            }
        }

        let resolved = if draft.short_links.is_empty() {
            Vec::new()
        } else {
            self.links
                .expand(
                    &draft.short_links,
                    &mut session.link_cache,
                    &mut session.metrics,
                )
                .await
        };
        let post = draft.finish(resolved);
        if session.collector.push(post) {
            session.metrics.record_collected();
            true
        } else {
            false
        }
    }

    /// The nested original of a retweet. A truncated or partial original is
    /// re-fetched by its own id; an `RT @` record that only names the
    /// original's id gets it fetched outright.
    async fn retweeted_original(
        &mut self,
        driver: &dyn BrowserDriver,
        session: &mut HarvestSession,
        record: &LegacyPostRecord,
    ) -> Option<LegacyPostRecord> {
        let nested = record.retweeted();
        if !self.hydration.is_enabled() {
            return nested;
        }
        match nested {
            Some(mut nested) => {
                if nested.is_incomplete() {
                    if let Some(nested_id) = nested.id().or_else(|| record.retweeted_id()) {
                        let hydrated = self
                            .hydration
                            .hydrate(driver, &nested_id, &mut nested)
                            .await;
                        session.metrics.record_hydration(hydrated);
                    }
                }
                Some(nested)
            }
            None => {
                if !record.full_text().starts_with(RETWEET_MARKER) {
                    return None;
                }
                let nested_id = record.retweeted_id()?;
                match self.hydration.fetch(driver, &nested_id).await {
                    Ok(original) => {
                        session.metrics.record_hydration(true);
                        Some(original)
                    }
                    Err(err) => {
                        warn!(
                            post_id = %nested_id,
                            error = %err,
                            "retweeted original unavailable"
                        );
                        session.metrics.record_hydration(false);
                        None
                    }
                }
            }
        }
    }
}
