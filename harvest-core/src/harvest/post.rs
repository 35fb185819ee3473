use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Original,
    Retweet,
    Reply,
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PostKind::Original => "Original",
            PostKind::Retweet => "Retweet",
            PostKind::Reply => "Reply",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

/// Parent of a reply. Id and url always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyParent {
    pub id: String,
    pub url: String,
}

/// Engagement counters. A counter is only present when the source reported a
/// nonzero value, so a missing counter may mean either zero or unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Engagement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
}

impl Engagement {
    pub fn nonzero(value: u64) -> Option<u64> {
        (value > 0).then_some(value)
    }
}

/// A normalized post. Exactly one of `text` / `retweet_full_text` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub url: String,
    pub kind: PostKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweet_full_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub engagement: Engagement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ReplyParent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_handle: Option<String>,
    pub media: Vec<MediaItem>,
    pub expanded_urls: Vec<String>,
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
}

impl Post {
    /// Whichever text field is populated.
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.retweet_full_text.as_deref())
            .unwrap_or_default()
    }
}
