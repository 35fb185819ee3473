use serde_json::{Map, Value};

/// Marker the upstream appends when it cut a text short.
pub const TRUNCATION_MARKER: char = '…';

/// Pre-normalization payload of one post: the `tweet_results.result` object
/// as delivered upstream. Hydration may merge into it once; after that it is
/// read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPostRecord {
    raw: Value,
    hydrated: bool,
}

impl LegacyPostRecord {
    /// Unwraps visibility wrappers. Returns `None` for anything that is not
    /// a JSON object.
    pub fn from_result(result: &Value) -> Option<Self> {
        let inner = match result.get("__typename").and_then(Value::as_str) {
            Some("TweetWithVisibilityResults") => result.get("tweet")?,
            _ => result,
        };
        inner.is_object().then(|| Self {
            raw: inner.clone(),
            hydrated: false,
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn legacy(&self) -> &Value {
        self.raw.get("legacy").unwrap_or(&Value::Null)
    }

    pub fn id(&self) -> Option<String> {
        self.raw
            .get("rest_id")
            .or_else(|| self.legacy().get("id_str"))
            .and_then(value_as_string)
            .filter(|id| !id.is_empty())
    }

    pub fn counter(&self, field: &str) -> u64 {
        self.legacy().get(field).map(value_as_u64).unwrap_or(0)
    }

    pub fn views(&self) -> u64 {
        self.raw
            .pointer("/views/count")
            .map(value_as_u64)
            .unwrap_or(0)
    }

    /// Extended note text when present, otherwise the primary text, with
    /// whitespace collapsed.
    pub fn full_text(&self) -> String {
        let note = self
            .raw
            .pointer("/note_tweet/note_tweet_results/result/text")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty());
        let primary = self.legacy().get("full_text").and_then(Value::as_str);
        collapse_whitespace(note.or(primary).unwrap_or_default())
    }

    pub fn is_truncated(&self) -> bool {
        self.full_text().ends_with(TRUNCATION_MARKER)
    }

    pub fn has_zero_engagement(&self) -> bool {
        ["favorite_count", "retweet_count", "reply_count"]
            .iter()
            .all(|field| self.counter(field) == 0)
    }

    pub fn is_incomplete(&self) -> bool {
        self.id().is_none() || self.full_text().is_empty() || self.is_truncated()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.legacy()
            .get("created_at")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn screen_name(&self) -> Option<&str> {
        self.raw
            .pointer("/core/user_results/result/legacy/screen_name")
            .or_else(|| {
                self.raw
                    .pointer("/core/user_results/result/core/screen_name")
            })
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn retweeted(&self) -> Option<LegacyPostRecord> {
        self.legacy()
            .pointer("/retweeted_status_result/result")
            .or_else(|| self.raw.pointer("/retweeted_status_result/result"))
            .and_then(LegacyPostRecord::from_result)
    }

    pub fn retweeted_id(&self) -> Option<String> {
        self.retweeted().and_then(|nested| nested.id()).or_else(|| {
            self.legacy()
                .get("retweeted_status_id_str")
                .and_then(value_as_string)
                .filter(|id| !id.is_empty())
        })
    }

    pub fn in_reply_to_status_id(&self) -> Option<String> {
        self.legacy()
            .get("in_reply_to_status_id_str")
            .and_then(value_as_string)
            .filter(|id| !id.is_empty())
    }

    pub fn in_reply_to_screen_name(&self) -> Option<&str> {
        self.legacy()
            .get("in_reply_to_screen_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Entities of `kind` (`media`, `urls`, ...) from the named container of
    /// the legacy payload.
    pub fn entities(&self, container: &str, kind: &str) -> &[Value] {
        self.legacy()
            .get(container)
            .and_then(|entities| entities.get(kind))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Entities attached to the extended note, which carry their own set.
    pub fn note_entities(&self, kind: &str) -> &[Value] {
        self.raw
            .pointer("/note_tweet/note_tweet_results/result/entity_set")
            .and_then(|set| set.get(kind))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Overlays the detail payload: legacy fields are replaced key by key,
    /// note text and author are taken when the detail has them. Applies at
    /// most once.
    pub fn merge_hydrated(&mut self, detail: &LegacyPostRecord) -> bool {
        if self.hydrated {
            return false;
        }
        self.hydrated = true;

        let Some(target) = self.raw.as_object_mut() else {
            return false;
        };
        if let Some(fields) = detail.legacy().as_object() {
            let legacy = target
                .entry("legacy")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(legacy) = legacy.as_object_mut() {
                for (key, value) in fields {
                    legacy.insert(key.clone(), value.clone());
                }
            }
        }
        for key in ["note_tweet", "core", "views"] {
            if let Some(value) = detail.raw.get(key) {
                target.insert(key.to_string(), value.clone());
            }
        }
        true
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn value_as_u64(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or(0),
        Value::String(text) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> LegacyPostRecord {
        LegacyPostRecord::from_result(&value).unwrap()
    }

    #[test]
    fn unwraps_visibility_wrapper() {
        let rec = record(json!({
            "__typename": "TweetWithVisibilityResults",
            "tweet": {"rest_id": "42", "legacy": {"full_text": "hi"}}
        }));
        assert_eq!(rec.id().as_deref(), Some("42"));
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(LegacyPostRecord::from_result(&json!("nope")).is_none());
        let wrapper_only = json!({"__typename": "TweetWithVisibilityResults"});
        assert!(LegacyPostRecord::from_result(&wrapper_only).is_none());
    }

    #[test]
    fn prefers_note_text_and_collapses_whitespace() {
        let rec = record(json!({
            "rest_id": "1",
            "legacy": {"full_text": "short…"},
            "note_tweet": {"note_tweet_results": {"result": {"text": "  long\n\n text   here "}}}
        }));
        assert_eq!(rec.full_text(), "long text here");
        assert!(!rec.is_truncated());
    }

    #[test]
    fn empty_id_counts_as_missing() {
        let rec = record(json!({"rest_id": "", "legacy": {"id_str": ""}}));
        assert!(rec.id().is_none());
        let fallback = record(json!({"legacy": {"id_str": "9"}}));
        assert_eq!(fallback.id().as_deref(), Some("9"));
    }

    #[test]
    fn counters_accept_numbers_and_strings() {
        let rec = record(json!({
            "rest_id": "1",
            "legacy": {"favorite_count": 3, "retweet_count": "2"},
            "views": {"count": "1500"}
        }));
        assert_eq!(rec.counter("favorite_count"), 3);
        assert_eq!(rec.counter("retweet_count"), 2);
        assert_eq!(rec.counter("reply_count"), 0);
        assert_eq!(rec.views(), 1500);
        assert!(!rec.has_zero_engagement());
    }

    #[test]
    fn merge_applies_only_once() {
        let mut rec = record(json!({
            "rest_id": "1",
            "legacy": {"full_text": "stub", "favorite_count": 0, "lang": "en"}
        }));
        let detail = record(json!({
            "rest_id": "1",
            "legacy": {"full_text": "complete", "favorite_count": 12},
            "note_tweet": {"note_tweet_results": {"result": {"text": "complete note"}}}
        }));
        assert!(rec.merge_hydrated(&detail));
        assert_eq!(rec.counter("favorite_count"), 12);
        assert_eq!(rec.full_text(), "complete note");
        assert_eq!(rec.legacy()["lang"], "en");

        let second = record(json!({"rest_id": "1", "legacy": {"favorite_count": 99}}));
        assert!(!rec.merge_hydrated(&second));
        assert_eq!(rec.counter("favorite_count"), 12);
    }

    #[test]
    fn retweet_id_falls_back_to_legacy_field() {
        let rec = record(json!({
            "rest_id": "1",
            "legacy": {"full_text": "RT @a: x", "retweeted_status_id_str": "77"}
        }));
        assert!(rec.retweeted().is_none());
        assert_eq!(rec.retweeted_id().as_deref(), Some("77"));
    }
}
