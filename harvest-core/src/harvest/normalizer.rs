use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::error::HarvestError;
use super::post::{Engagement, MediaItem, MediaKind, Post, PostKind, ReplyParent};
use super::record::LegacyPostRecord;

pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";
const MEDIA_CONTAINERS: [&str; 2] = ["extended_entities", "entities"];

fn retweet_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^RT @[^:]+:\s*").expect("valid retweet prefix pattern"))
}

fn reply_handle() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^@(\w{1,15})").expect("valid handle pattern"))
}

fn short_link() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https://t\.co/[a-zA-Z0-9]+").expect("valid link pattern"))
}

/// Insertion-ordered set of strings.
#[derive(Debug, Default)]
struct OrderedSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl OrderedSet {
    fn insert(&mut self, value: &str) {
        if !value.is_empty() && self.seen.insert(value.to_string()) {
            self.items.push(value.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

/// A post whose shortened links still need resolving before it is final.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub post: Post,
    pub short_links: Vec<String>,
}

impl PostDraft {
    pub fn finish(mut self, resolved: Vec<String>) -> Post {
        if self.post.expanded_urls.is_empty() {
            let mut urls = OrderedSet::default();
            for url in &resolved {
                urls.insert(url);
            }
            self.post.expanded_urls = urls.into_vec();
        }
        self.post
    }
}

pub fn parse_created_at(value: &str) -> Result<DateTime<Utc>, HarvestError> {
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| HarvestError::MalformedTimestamp(value.to_string()))
}

pub fn classify(text: &str, explicit_reply: bool, has_nested_retweet: bool) -> PostKind {
    if text.starts_with("RT @") {
        PostKind::Retweet
    } else if explicit_reply || (text.starts_with('@') && !has_nested_retweet) {
        PostKind::Reply
    } else {
        PostKind::Original
    }
}

pub fn strip_retweet_prefix(text: &str) -> String {
    retweet_prefix().replace(text, "").trim().to_string()
}

/// Converts legacy records into [`Post`]s.
#[derive(Debug, Clone)]
pub struct PostNormalizer {
    base_url: String,
    fallback_handle: Option<String>,
}

impl PostNormalizer {
    pub fn new(base_url: impl Into<String>, fallback_handle: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_handle,
        }
    }

    fn status_url(&self, handle: Option<&str>, id: &str) -> String {
        match handle {
            Some(handle) => format!("{}/{handle}/status/{id}", self.base_url),
            None => format!("{}/i/web/status/{id}", self.base_url),
        }
    }

    /// `retweeted` is the nested original of a retweet, possibly re-hydrated.
    pub fn normalize(
        &self,
        id: &str,
        record: &LegacyPostRecord,
        retweeted: Option<&LegacyPostRecord>,
    ) -> PostDraft {
        let full_text = record.full_text();
        let explicit_parent = record.in_reply_to_status_id();
        let kind = classify(&full_text, explicit_parent.is_some(), retweeted.is_some());

        let (text, retweet_full_text) = match (kind, retweeted) {
            (PostKind::Retweet, Some(original)) => {
                let original_text = original.full_text();
                let reference = strip_retweet_prefix(&full_text);
                if original_text.chars().count() > reference.chars().count() {
                    (None, Some(original_text))
                } else {
                    (Some(full_text.clone()), None)
                }
            }
            _ => (Some(full_text.clone()), None),
        };

        let author = record
            .screen_name()
            .map(str::to_string)
            .or_else(|| self.fallback_handle.clone());

        let created_at = record.created_at().map(str::to_string);
        let timestamp = created_at
            .as_deref()
            .and_then(|value| parse_created_at(value).ok());

        let (parent, in_reply_to_handle) = self.reply_linkage(record, kind, &full_text);

        let media_source = match (kind, retweeted) {
            (PostKind::Retweet, Some(original)) => original,
            _ => record,
        };
        let media = extract_media(media_source);

        let mut sources = vec![record];
        if let (PostKind::Retweet, Some(original)) = (kind, retweeted) {
            sources.push(original);
        }
        let expanded_urls = collect_strings(&sources, "urls", "expanded_url");
        let mentions = collect_strings(&sources, "user_mentions", "screen_name");
        let hashtags = collect_strings(&sources, "hashtags", "text");

        let short_links = if expanded_urls.is_empty() {
            let mut links = OrderedSet::default();
            for body in text.iter().chain(retweet_full_text.iter()) {
                for found in short_link().find_iter(body) {
                    links.insert(found.as_str());
                }
            }
            links.into_vec()
        } else {
            Vec::new()
        };

        let engagement = Engagement {
            likes: Engagement::nonzero(record.counter("favorite_count")),
            retweets: Engagement::nonzero(record.counter("retweet_count")),
            replies: Engagement::nonzero(record.counter("reply_count")),
            quotes: Engagement::nonzero(record.counter("quote_count")),
            bookmarks: Engagement::nonzero(record.counter("bookmark_count")),
            views: Engagement::nonzero(record.views()),
        };

        let post = Post {
            id: id.to_string(),
            url: self.status_url(author.as_deref(), id),
            kind,
            author,
            text,
            retweet_full_text,
            created_at,
            timestamp,
            engagement,
            parent,
            in_reply_to_handle,
            media,
            expanded_urls,
            mentions,
            hashtags,
        };
        PostDraft { post, short_links }
    }

    fn reply_linkage(
        &self,
        record: &LegacyPostRecord,
        kind: PostKind,
        full_text: &str,
    ) -> (Option<ReplyParent>, Option<String>) {
        let explicit_handle = record.in_reply_to_screen_name().map(str::to_string);
        if let Some(parent_id) = record.in_reply_to_status_id() {
            let url = self.status_url(explicit_handle.as_deref(), &parent_id);
            return (Some(ReplyParent { id: parent_id, url }), explicit_handle);
        }
        if explicit_handle.is_some() {
            return (None, explicit_handle);
        }
        // Text-derived handles carry no ids.
        let handle = (kind == PostKind::Reply)
            .then(|| reply_handle().captures(full_text))
            .flatten()
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str().to_string());
        (None, handle)
    }
}

fn extract_media(record: &LegacyPostRecord) -> Vec<MediaItem> {
    let mut media = Vec::new();
    let mut seen = HashSet::new();
    for container in MEDIA_CONTAINERS {
        for entry in record.entities(container, "media") {
            let Some(item) = media_item(entry) else {
                continue;
            };
            if seen.insert(item.url.clone()) {
                media.push(item);
            }
        }
    }
    media
}

fn media_item(entry: &Value) -> Option<MediaItem> {
    match entry.get("type").and_then(Value::as_str)? {
        "photo" => entry
            .get("media_url_https")
            .or_else(|| entry.get("media_url"))
            .and_then(Value::as_str)
            .map(|url| MediaItem {
                kind: MediaKind::Image,
                url: url.to_string(),
            }),
        "video" | "animated_gif" => {
            let variants = entry.pointer("/video_info/variants")?.as_array()?;
            variants
                .iter()
                .filter(|variant| variant.get("url").and_then(Value::as_str).is_some())
                .max_by_key(|variant| {
                    variant
                        .get("bitrate")
                        .and_then(Value::as_u64)
                        .unwrap_or(0)
                })
                .and_then(|best| best.get("url").and_then(Value::as_str))
                .map(|url| MediaItem {
                    kind: MediaKind::Video,
                    url: url.to_string(),
                })
        }
        _ => None,
    }
}

fn collect_strings(sources: &[&LegacyPostRecord], kind: &str, field: &str) -> Vec<String> {
    let mut values = OrderedSet::default();
    for record in sources {
        let legacy = MEDIA_CONTAINERS
            .iter()
            .flat_map(|container| record.entities(container, kind).iter());
        for entity in legacy.chain(record.note_entities(kind).iter()) {
            if let Some(value) = entity.get(field).and_then(Value::as_str) {
                values.insert(value);
            }
        }
    }
    values.into_vec()
}
