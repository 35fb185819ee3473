use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use url::form_urlencoded::byte_serialize;

use crate::browser::BrowserDriver;
use crate::config::HydrationSection;

use super::error::{HarvestError, HarvestResult};
use super::pacing::Pacer;
use super::record::LegacyPostRecord;
use super::walker::{walk, DETAIL_PATHS};

/// Secondary single-post lookups for records the timeline delivered as stubs.
#[derive(Debug)]
pub struct HydrationService {
    enabled: bool,
    endpoint: String,
    timeout: Duration,
    pacer: Pacer,
    fetched: HashMap<String, Option<LegacyPostRecord>>,
}

impl HydrationService {
    pub fn new(config: &HydrationSection) -> Self {
        Self {
            enabled: config.enabled,
            endpoint: config.detail_endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            pacer: Pacer::new(Duration::from_millis(config.min_spacing_ms)),
            fetched: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// All three primary counters at zero, or a truncated text.
    pub fn should_hydrate(&self, record: &LegacyPostRecord) -> bool {
        self.enabled
            && !record.is_hydrated()
            && (record.has_zero_engagement() || record.is_truncated())
    }

    pub fn detail_url(&self, post_id: &str) -> String {
        let variables = json!({
            "focalTweetId": post_id,
            "with_rux_injections": false,
            "includePromotedContent": false,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": true,
            "withBirdwatchNotes": false,
            "withVoice": true,
            "withV2Timeline": true
        });
        let encoded: String = byte_serialize(variables.to_string().as_bytes()).collect();
        format!("{}?variables={encoded}", self.endpoint)
    }

    /// Issues at most one detail query per id and run, bounded by the
    /// configured timeout. Repeated ids get the remembered outcome.
    pub async fn fetch(
        &mut self,
        driver: &dyn BrowserDriver,
        post_id: &str,
    ) -> HarvestResult<LegacyPostRecord> {
        if let Some(previous) = self.fetched.get(post_id) {
            return previous.clone().ok_or_else(|| {
                HarvestError::transient(self.detail_url(post_id), "detail query already failed")
            });
        }
        let outcome = self.query(driver, post_id).await;
        self.fetched
            .insert(post_id.to_string(), outcome.as_ref().ok().cloned());
        outcome
    }

    async fn query(
        &mut self,
        driver: &dyn BrowserDriver,
        post_id: &str,
    ) -> HarvestResult<LegacyPostRecord> {
        let url = self.detail_url(post_id);
        self.pacer.wait().await;
        debug!(post_id, "hydrating post");

        let response = tokio::time::timeout(self.timeout, driver.get(&url))
            .await
            .map_err(|_| HarvestError::transient(&url, "detail query timed out"))?
            .map_err(|err| HarvestError::transient(&url, err))?;
        if !response.is_success() {
            return Err(HarvestError::transient(
                &url,
                format!("HTTP {}", response.status),
            ));
        }
        let body = response
            .json()
            .map_err(|err| HarvestError::transient(&url, err))?;
        find_focal(&body, post_id).ok_or_else(|| {
            HarvestError::transient(&url, "detail response did not include the requested post")
        })
    }

    /// Merges the detail payload into `record`. On failure the record is left
    /// untouched. Returns whether hydration succeeded.
    pub async fn hydrate(
        &mut self,
        driver: &dyn BrowserDriver,
        post_id: &str,
        record: &mut LegacyPostRecord,
    ) -> bool {
        match self.fetch(driver, post_id).await {
            Ok(detail) => record.merge_hydrated(&detail),
            Err(err) => {
                warn!(post_id, error = %err, "hydration failed");
                false
            }
        }
    }
}

/// The entry whose id matches `post_id`. Threads also carry parents and
/// replies, which never stand in for the requested post.
fn find_focal(body: &Value, post_id: &str) -> Option<LegacyPostRecord> {
    walk(body, DETAIL_PATHS)
        .tweets
        .iter()
        .filter_map(LegacyPostRecord::from_result)
        .find(|record| record.id().as_deref() == Some(post_id))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::browser::{BrowserResult, FetchedResponse};

    struct ThreadDriver {
        body: Value,
        gets: RefCell<Vec<String>>,
    }

    #[async_trait(?Send)]
    impl BrowserDriver for ThreadDriver {
        async fn navigate(&self, _url: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn scroll_to_bottom(&self) -> BrowserResult<()> {
            Ok(())
        }

        async fn click_text(&self, _label: &str) -> BrowserResult<bool> {
            Ok(false)
        }

        async fn get(&self, url: &str) -> BrowserResult<FetchedResponse> {
            self.gets.borrow_mut().push(url.to_string());
            Ok(FetchedResponse {
                status: 200,
                url: url.to_string(),
                body: self.body.to_string(),
            })
        }
    }

    fn thread(entries: Vec<Value>) -> Value {
        json!({"data": {"threaded_conversation_with_injections_v2": {"instructions": [
            {"type": "TimelineAddEntries", "entries": entries}
        ]}}})
    }

    fn thread_entry(id: &str, text: &str, likes: u64) -> Value {
        json!({
            "entryId": format!("tweet-{id}"),
            "content": {"itemContent": {"tweet_results": {"result": {
                "rest_id": id,
                "legacy": {"full_text": text, "favorite_count": likes}
            }}}}
        })
    }

    fn config() -> HydrationSection {
        HydrationSection {
            enabled: true,
            detail_endpoint: "https://x.com/i/api/graphql/abc/TweetDetail".into(),
            timeout_seconds: 15,
            min_spacing_ms: 500,
            bearer_token: None,
        }
    }

    fn record(value: Value) -> LegacyPostRecord {
        LegacyPostRecord::from_result(&value).unwrap()
    }

    #[test]
    fn triggers_on_zero_counters_or_truncation() {
        let service = HydrationService::new(&config());
        let stub = record(json!({"rest_id": "1", "legacy": {"full_text": "hi"}}));
        let engaged = record(json!({
            "rest_id": "2",
            "legacy": {"full_text": "hi", "reply_count": 1}
        }));
        let truncated = record(json!({
            "rest_id": "3",
            "legacy": {"full_text": "cut short…", "favorite_count": 4}
        }));
        assert!(service.should_hydrate(&stub));
        assert!(!service.should_hydrate(&engaged));
        assert!(service.should_hydrate(&truncated));

        let disabled = HydrationService::new(&HydrationSection {
            enabled: false,
            ..config()
        });
        assert!(!disabled.should_hydrate(&stub));
    }

    #[test]
    fn detail_url_encodes_variables() {
        let service = HydrationService::new(&config());
        let url = service.detail_url("12345");
        assert!(url.starts_with("https://x.com/i/api/graphql/abc/TweetDetail?variables=%7B"));
        assert!(url.contains("12345"));
        assert!(!url.contains('"'));
    }

    #[test]
    fn focal_entry_must_match_requested_id() {
        let body = json!({"data": {"threaded_conversation_with_injections_v2": {"instructions": [
            {"type": "TimelineAddEntries", "entries": [
                {"entryId": "tweet-1", "content": {"itemContent": {"tweet_results": {"result": {"rest_id": "1"}}}}},
                {"entryId": "tweet-2", "content": {"itemContent": {"tweet_results": {"result": {"rest_id": "2"}}}}}
            ]}
        ]}}});
        assert_eq!(find_focal(&body, "2").and_then(|r| r.id()).as_deref(), Some("2"));
        assert!(find_focal(&body, "9").is_none());
        assert!(find_focal(&json!({"data": {}}), "1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn detail_without_requested_post_leaves_record_untouched() {
        let driver = ThreadDriver {
            body: thread(vec![thread_entry("999", "someone else's parent post", 77)]),
            gets: RefCell::new(Vec::new()),
        };
        let mut service = HydrationService::new(&config());
        let mut stub = record(json!({"rest_id": "5", "legacy": {"full_text": "my stub"}}));
        let before = stub.clone();

        assert!(!service.hydrate(&driver, "5", &mut stub).await);
        assert_eq!(stub, before);
        assert_eq!(stub.full_text(), "my stub");
        assert_eq!(stub.counter("favorite_count"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn each_id_is_queried_once_per_run() {
        let driver = ThreadDriver {
            body: thread(vec![
                thread_entry("1", "parent", 4),
                thread_entry("2", "the full original", 9),
            ]),
            gets: RefCell::new(Vec::new()),
        };
        let mut service = HydrationService::new(&config());

        let first = service.fetch(&driver, "2").await.unwrap();
        let second = service.fetch(&driver, "2").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.full_text(), "the full original");
        assert!(service.fetch(&driver, "3").await.is_err());
        assert!(service.fetch(&driver, "3").await.is_err());
        assert_eq!(driver.gets.borrow().len(), 2);
    }
}
