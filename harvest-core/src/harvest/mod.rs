mod classifier;
mod collector;
mod error;
mod filter;
mod harvester;
mod hydration;
mod links;
mod metrics;
mod normalizer;
mod options;
mod pacing;
mod pagination;
mod pipeline;
mod post;
mod record;
mod state;
mod walker;

pub use classifier::{Classification, EndpointFamily, FamilyDescriptor, ResponseClassifier};
pub use collector::Collector;
pub use error::{HarvestError, HarvestResult};
pub use filter::{PostFilter, Verdict};
pub use harvester::{HarvestReport, Harvester};
pub use hydration::HydrationService;
pub use links::{HttpLinkResolver, LinkCache, LinkExpander, LinkResolver};
pub use metrics::HarvestMetrics;
pub use normalizer::{
    classify, parse_created_at, strip_retweet_prefix, PostDraft, PostNormalizer,
    CREATED_AT_FORMAT,
};
pub use options::{parse_date_bound, ContentType, HarvestConfig, Target, MIN_SETTLE_DELAY};
pub use pacing::Pacer;
pub use pagination::{
    PaginationController, PaginationOutcome, PaginationSettings, PaginationState, StopReason,
};
pub use pipeline::HarvestPipeline;
pub use post::{Engagement, MediaItem, MediaKind, Post, PostKind, ReplyParent};
pub use record::{collapse_whitespace, LegacyPostRecord, TRUNCATION_MARKER};
pub use state::HarvestSession;
pub use walker::{
    classify_entry, select_instructions, walk, InstructionEntry, InstructionPath, TimelinePage,
    CURSOR_ENTRY_PREFIX, DETAIL_PATHS, PROFILE_PATHS, SEARCH_PATHS, TWEET_ENTRY_PREFIX,
};
