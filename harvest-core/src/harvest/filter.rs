use chrono::{DateTime, Utc};

use super::options::{ContentType, HarvestConfig};
use super::post::{Post, PostKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    WrongType,
    OutsideWindow,
}

/// Caller-supplied type and date predicates applied after normalization.
#[derive(Debug, Clone, Copy)]
pub struct PostFilter {
    content: ContentType,
    since: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
}

impl PostFilter {
    pub fn new(
        content: ContentType,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            content,
            since,
            before,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.content_type, config.since, config.before)
    }

    pub fn verdict(&self, post: &Post) -> Verdict {
        let type_matches = match self.content {
            ContentType::All => true,
            ContentType::Originals => post.kind == PostKind::Original,
            ContentType::Retweets => post.kind == PostKind::Retweet,
        };
        if !type_matches {
            return Verdict::WrongType;
        }

        // Posts without a parseable timestamp pass the window.
        let Some(timestamp) = post.timestamp else {
            return Verdict::Keep;
        };
        let after_since = self.since.map_or(true, |since| timestamp >= since);
        let before_end = self.before.map_or(true, |before| timestamp < before);
        if after_since && before_end {
            Verdict::Keep
        } else {
            Verdict::OutsideWindow
        }
    }

    pub fn accepts(&self, post: &Post) -> bool {
        self.verdict(post) == Verdict::Keep
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::harvest::post::Engagement;

    fn post(id: &str, kind: PostKind, timestamp: Option<DateTime<Utc>>) -> Post {
        Post {
            id: id.into(),
            url: format!("https://x.com/a/status/{id}"),
            kind,
            author: None,
            text: Some(String::new()),
            retweet_full_text: None,
            created_at: None,
            timestamp,
            engagement: Engagement::default(),
            parent: None,
            in_reply_to_handle: None,
            media: Vec::new(),
            expanded_urls: Vec::new(),
            mentions: Vec::new(),
            hashtags: Vec::new(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn window_is_inclusive_then_exclusive() {
        let filter = PostFilter::new(
            ContentType::All,
            Some(day(2024, 1, 1)),
            Some(day(2024, 2, 1)),
        );
        let posts = [
            post("a", PostKind::Original, Some(day(2023, 12, 31))),
            post("b", PostKind::Original, Some(day(2024, 1, 15))),
            post("c", PostKind::Original, Some(day(2024, 2, 1))),
            post("d", PostKind::Original, Some(day(2024, 1, 1))),
        ];
        let kept: Vec<_> = posts
            .iter()
            .filter(|p| filter.accepts(p))
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(kept, vec!["b", "d"]);
        assert_eq!(filter.verdict(&posts[0]), Verdict::OutsideWindow);
    }

    #[test]
    fn missing_timestamp_fails_open_but_type_still_applies() {
        let filter = PostFilter::new(ContentType::Originals, Some(day(2024, 1, 1)), None);
        assert!(filter.accepts(&post("a", PostKind::Original, None)));
        assert_eq!(
            filter.verdict(&post("b", PostKind::Retweet, None)),
            Verdict::WrongType
        );
    }

    #[test]
    fn content_type_selection() {
        let originals = PostFilter::new(ContentType::Originals, None, None);
        let retweets = PostFilter::new(ContentType::Retweets, None, None);
        let reply = post("r", PostKind::Reply, None);
        let retweet = post("t", PostKind::Retweet, None);
        assert!(!originals.accepts(&reply));
        assert!(!originals.accepts(&retweet));
        assert!(retweets.accepts(&retweet));
        assert!(!retweets.accepts(&reply));
        assert!(PostFilter::new(ContentType::All, None, None).accepts(&reply));
    }
}
