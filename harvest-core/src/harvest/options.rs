use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::config::HarvestSection;
use crate::error::ConfigError;

/// Lower bound applied to the settle delay after every scroll.
pub const MIN_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Target {
    Account(String),
    Query(String),
}

impl Target {
    /// `@handle` and bare handles become accounts, anything with whitespace or
    /// search operators is a raw query.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let handle = trimmed.trim_start_matches('@');
        let is_handle = !handle.is_empty()
            && handle.len() <= 15
            && handle
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if is_handle {
            Target::Account(handle.to_string())
        } else {
            Target::Query(trimmed.to_string())
        }
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            Target::Account(handle) => Some(handle),
            Target::Query(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Account(handle) => write!(f, "@{handle}"),
            Target::Query(query) => f.write_str(query),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    All,
    Originals,
    Retweets,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContentType::All => "all",
            ContentType::Originals => "originals",
            ContentType::Retweets => "retweets",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for ContentType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "all" => Ok(ContentType::All),
            "originals" | "tweets" => Ok(ContentType::Originals),
            "retweets" => Ok(ContentType::Retweets),
            other => Err(ConfigError::Invalid(format!("invalid content type: {other}"))),
        }
    }
}

/// Caller-owned options for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub target: Target,
    pub content_type: ContentType,
    pub since: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub max_scroll_iterations: usize,
    pub max_post_count: usize,
    pub inter_scroll_delay: Duration,
    pub stagnation_limit: usize,
}

impl HarvestConfig {
    pub fn new(target: Target, defaults: &HarvestSection) -> Self {
        Self {
            target,
            content_type: ContentType::All,
            since: None,
            before: None,
            max_scroll_iterations: defaults.max_scroll_iterations,
            max_post_count: defaults.max_post_count,
            inter_scroll_delay: defaults.scroll_delay().unwrap_or_default(),
            stagnation_limit: defaults.stagnation_limit,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.inter_scroll_delay.max(MIN_SETTLE_DELAY)
    }

    /// Date bounds force the search endpoint, which is the only one that
    /// honours them server-side.
    pub fn uses_search(&self) -> bool {
        matches!(self.target, Target::Query(_)) || self.since.is_some() || self.before.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_post_count == 0 {
            return Err(ConfigError::Invalid("max_post_count must be at least 1".into()));
        }
        if self.max_scroll_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_scroll_iterations must be at least 1".into(),
            ));
        }
        if self.stagnation_limit == 0 {
            return Err(ConfigError::Invalid("stagnation_limit must be at least 1".into()));
        }
        let (Target::Account(handle) | Target::Query(handle)) = &self.target;
        if handle.is_empty() {
            return Err(ConfigError::Invalid("target must not be empty".into()));
        }
        if let (Some(since), Some(before)) = (self.since, self.before) {
            if since >= before {
                return Err(ConfigError::Invalid(format!(
                    "since ({since}) must be earlier than before ({before})"
                )));
            }
        }
        Ok(())
    }
}

/// Parses a date bound given either as `YYYY-MM-DD`, a naive ISO timestamp or
/// RFC 3339. Naive values are taken as UTC.
pub fn parse_date_bound(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConfigError::Invalid(format!("invalid date: {value}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn defaults() -> HarvestSection {
        HarvestSection {
            base_url: "https://x.com".into(),
            max_scroll_iterations: 30,
            max_post_count: 50,
            scroll_delay_seconds: 0.5,
            stagnation_limit: 3,
        }
    }

    #[test]
    fn target_parsing_distinguishes_handles_from_queries() {
        assert_eq!(Target::parse("@rustlang"), Target::Account("rustlang".into()));
        assert_eq!(Target::parse("rust_lang"), Target::Account("rust_lang".into()));
        assert_eq!(
            Target::parse("from:rustlang release"),
            Target::Query("from:rustlang release".into())
        );
    }

    #[test]
    fn settle_delay_has_floor() {
        let config = HarvestConfig::new(Target::Account("a".into()), &defaults());
        assert_eq!(config.settle_delay(), MIN_SETTLE_DELAY);
        let mut slow = config.clone();
        slow.inter_scroll_delay = Duration::from_secs(5);
        assert_eq!(slow.settle_delay(), Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let mut config = HarvestConfig::new(Target::Account("a".into()), &defaults());
        config.since = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        config.before = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(config.validate().is_err());
        config.before = None;
        assert!(config.validate().is_ok());
        assert!(config.uses_search());
    }

    #[test]
    fn validate_rejects_zero_cap() {
        let mut config = HarvestConfig::new(Target::Account("a".into()), &defaults());
        config.max_post_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_scroll_budget() {
        let mut config = HarvestConfig::new(Target::Account("a".into()), &defaults());
        config.max_scroll_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.max_scroll_iterations = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn content_type_accepts_legacy_alias() {
        assert_eq!("tweets".parse::<ContentType>().unwrap(), ContentType::Originals);
        assert_eq!("Retweets".parse::<ContentType>().unwrap(), ContentType::Retweets);
        assert!("replies".parse::<ContentType>().is_err());
    }

    #[test]
    fn date_bounds_parse_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date_bound("2024-01-01").unwrap(), expected);
        assert_eq!(parse_date_bound("2024-01-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_date_bound("2024-01-01T00:00:00Z").unwrap(), expected);
        assert!(parse_date_bound("yesterday").is_err());
    }
}
