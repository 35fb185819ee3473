use serde_json::Value;
use tracing::trace;

pub const TWEET_ENTRY_PREFIX: &str = "tweet-";
pub const CURSOR_ENTRY_PREFIX: &str = "cursor-bottom";
const MODULE_ENTRY_PREFIXES: &[&str] = &[
    "profile-conversation-",
    "conversationthread-",
    "home-conversation-",
];

/// Extracts the instruction list from a response root, or `None` when this
/// schema variant does not apply.
pub type InstructionPath = for<'a> fn(&'a Value) -> Option<&'a Vec<Value>>;

fn instructions_at<'a>(root: &'a Value, pointer: &str) -> Option<&'a Vec<Value>> {
    root.pointer(pointer)?.as_array()
}

pub fn profile_timeline_v2(root: &Value) -> Option<&Vec<Value>> {
    instructions_at(root, "/data/user/result/timeline_v2/timeline/instructions")
}

pub fn profile_timeline(root: &Value) -> Option<&Vec<Value>> {
    instructions_at(root, "/data/user/result/timeline/timeline/instructions")
}

pub fn profile_legacy_timeline_v2(root: &Value) -> Option<&Vec<Value>> {
    instructions_at(
        root,
        "/data/user/result/legacy/timeline_v2/timeline/instructions",
    )
}

pub fn search_timeline(root: &Value) -> Option<&Vec<Value>> {
    instructions_at(
        root,
        "/data/search_by_raw_query/search_timeline/timeline/instructions",
    )
}

pub fn tweet_detail(root: &Value) -> Option<&Vec<Value>> {
    instructions_at(
        root,
        "/data/threaded_conversation_with_injections_v2/instructions",
    )
}

pub const PROFILE_PATHS: &[InstructionPath] = &[
    profile_timeline_v2,
    profile_timeline,
    profile_legacy_timeline_v2,
];
pub const SEARCH_PATHS: &[InstructionPath] = &[search_timeline];
pub const DETAIL_PATHS: &[InstructionPath] = &[tweet_detail];

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionEntry {
    TweetContent(Value),
    Cursor(String),
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct TimelinePage {
    /// Raw tweet results in server order.
    pub tweets: Vec<Value>,
    pub cursor: Option<String>,
    /// False when no candidate path produced instructions.
    pub schema_matched: bool,
}

/// First candidate path yielding a non-empty instruction list wins.
pub fn select_instructions<'a>(
    root: &'a Value,
    paths: &[InstructionPath],
) -> Option<&'a Vec<Value>> {
    paths
        .iter()
        .filter_map(|path| path(root))
        .find(|instructions| !instructions.is_empty())
}

pub fn walk(root: &Value, paths: &[InstructionPath]) -> TimelinePage {
    let Some(instructions) = select_instructions(root, paths) else {
        return TimelinePage::default();
    };

    let mut page = TimelinePage {
        schema_matched: true,
        ..Default::default()
    };
    for instruction in instructions {
        let singles = instruction.get("entry").into_iter();
        let many = instruction
            .get("entries")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for entry in many.chain(singles) {
            for classified in classify_entry(entry) {
                match classified {
                    InstructionEntry::TweetContent(result) => page.tweets.push(result),
                    InstructionEntry::Cursor(token) => page.cursor = Some(token),
                    InstructionEntry::Unknown => {}
                }
            }
        }
    }
    page
}

/// Classifies one timeline entry. Conversation modules expand into their
/// nested items, everything else yields exactly one variant.
pub fn classify_entry(entry: &Value) -> Vec<InstructionEntry> {
    let entry_id = entry
        .get("entryId")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if entry_id.starts_with(TWEET_ENTRY_PREFIX) {
        let content = entry.pointer("/content/itemContent");
        return vec![tweet_content(content)];
    }
    if entry_id.starts_with(CURSOR_ENTRY_PREFIX) {
        let token = entry
            .pointer("/content/value")
            .or_else(|| entry.pointer("/content/itemContent/value"))
            .and_then(Value::as_str);
        return vec![match token {
            Some(token) if !token.is_empty() => InstructionEntry::Cursor(token.to_string()),
            _ => InstructionEntry::Unknown,
        }];
    }
    if MODULE_ENTRY_PREFIXES
        .iter()
        .any(|prefix| entry_id.starts_with(prefix))
    {
        return entry
            .pointer("/content/items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| tweet_content(item.pointer("/item/itemContent")))
                    .collect()
            })
            .unwrap_or_default();
    }

    trace!(entry_id, "ignoring timeline entry");
    vec![InstructionEntry::Unknown]
}

fn tweet_content(item_content: Option<&Value>) -> InstructionEntry {
    match item_content.and_then(|content| content.pointer("/tweet_results/result")) {
        Some(result) if result.is_object() => InstructionEntry::TweetContent(result.clone()),
        _ => InstructionEntry::Unknown,
    }
}
