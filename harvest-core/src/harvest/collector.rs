use std::collections::HashSet;

use super::post::Post;

/// Accumulates posts in arrival order. An id is accepted at most once.
#[derive(Debug, Default)]
pub struct Collector {
    posts: Vec<Post>,
    ids: HashSet<String>,
}

impl Collector {
    pub fn push(&mut self, post: Post) -> bool {
        if !self.ids.insert(post.id.clone()) {
            return false;
        }
        self.posts.push(post);
        true
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Newest first. Posts without a parsed timestamp keep their arrival
    /// order and follow the dated ones. Truncates to `cap`.
    pub fn finish(self, cap: usize) -> Vec<Post> {
        let (mut dated, undated): (Vec<Post>, Vec<Post>) = self
            .posts
            .into_iter()
            .partition(|post| post.timestamp.is_some());
        dated.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        dated.extend(undated);
        dated.truncate(cap);
        dated
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::harvest::post::{Engagement, PostKind};

    fn post(id: &str, day: Option<u32>) -> Post {
        Post {
            id: id.into(),
            url: String::new(),
            kind: PostKind::Original,
            author: None,
            text: Some(id.into()),
            retweet_full_text: None,
            created_at: None,
            timestamp: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
            engagement: Engagement::default(),
            parent: None,
            in_reply_to_handle: None,
            media: Vec::new(),
            expanded_urls: Vec::new(),
            mentions: Vec::new(),
            hashtags: Vec::new(),
        }
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut collector = Collector::default();
        assert!(collector.push(post("1", Some(1))));
        assert!(!collector.push(post("1", Some(2))));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn sorts_newest_first_and_appends_undated() {
        let mut collector = Collector::default();
        let arrivals = [
            ("u1", None),
            ("a", Some(3)),
            ("b", Some(9)),
            ("u2", None),
            ("c", Some(5)),
        ];
        for (id, day) in arrivals {
            collector.push(post(id, day));
        }
        assert_eq!(ids(&collector.finish(10)), vec!["b", "c", "a", "u1", "u2"]);
    }

    #[test]
    fn truncates_to_cap() {
        let mut collector = Collector::default();
        for (id, day) in [("a", Some(1)), ("b", Some(2)), ("c", None)] {
            collector.push(post(id, day));
        }
        assert_eq!(ids(&collector.finish(2)), vec!["b", "a"]);
    }
}
