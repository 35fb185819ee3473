use std::fmt;

use serde_json::Value;

use crate::browser::ResponseEvent;

use super::walker::{InstructionPath, PROFILE_PATHS, SEARCH_PATHS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointFamily {
    ProfileTimeline,
    SearchTimeline,
}

impl fmt::Display for EndpointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndpointFamily::ProfileTimeline => "profile-timeline",
            EndpointFamily::SearchTimeline => "search-timeline",
        };
        f.write_str(label)
    }
}

#[derive(Clone)]
pub struct FamilyDescriptor {
    pub family: EndpointFamily,
    pub url_markers: &'static [&'static str],
    pub paths: &'static [InstructionPath],
}

impl fmt::Debug for FamilyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyDescriptor")
            .field("family", &self.family)
            .field("url_markers", &self.url_markers)
            .field("paths", &self.paths.len())
            .finish()
    }
}

impl FamilyDescriptor {
    fn matches(&self, url: &str) -> bool {
        self.url_markers.iter().any(|marker| url.contains(marker))
    }
}

pub enum Classification<'a> {
    /// URL belongs to no registered family.
    Ignored,
    Malformed(serde_json::Error),
    Timeline {
        descriptor: &'a FamilyDescriptor,
        body: Value,
    },
}

/// Routes intercepted responses to the instruction paths of their endpoint
/// family. The body is only parsed once the URL matched.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    families: Vec<FamilyDescriptor>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self {
            families: vec![
                FamilyDescriptor {
                    family: EndpointFamily::ProfileTimeline,
                    url_markers: &["UserTweets"],
                    paths: PROFILE_PATHS,
                },
                FamilyDescriptor {
                    family: EndpointFamily::SearchTimeline,
                    url_markers: &["SearchTimeline"],
                    paths: SEARCH_PATHS,
                },
            ],
        }
    }
}

impl ResponseClassifier {
    pub fn empty() -> Self {
        Self {
            families: Vec::new(),
        }
    }

    pub fn register(&mut self, descriptor: FamilyDescriptor) {
        self.families.push(descriptor);
    }

    pub fn families(&self) -> &[FamilyDescriptor] {
        &self.families
    }

    pub fn family_for(&self, url: &str) -> Option<&FamilyDescriptor> {
        self.families.iter().find(|descriptor| descriptor.matches(url))
    }

    pub fn classify(&self, event: &ResponseEvent) -> Classification<'_> {
        let Some(descriptor) = self.family_for(&event.url) else {
            return Classification::Ignored;
        };
        match serde_json::from_str(&event.body) {
            Ok(body) => Classification::Timeline { descriptor, body },
            Err(err) => Classification::Malformed(err),
        }
    }
}
