pub mod browser;
pub mod config;
pub mod error;
pub mod harvest;
pub mod session;

pub use browser::{
    response_channel, BrowserDriver, BrowserError, BrowserResult, ChromiumDriver, DriverLauncher,
    FetchedResponse, LaunchOverrides, ResponseEvent, ResponseReceiver, ResponseSender,
};
pub use config::{
    duration_from_secs, load_harvester_config, BrowserSection, HarvestSection, HarvesterConfig,
    HydrationSection, LinksSection, SessionSection,
};
pub use error::{ConfigError, Result};
pub use harvest::{
    parse_date_bound, ContentType, Engagement, HarvestConfig, HarvestError, HarvestMetrics,
    HarvestReport, HarvestResult, HarvestSession, Harvester, LinkResolver, MediaItem, MediaKind,
    Post, PostKind, ReplyParent, StopReason, Target,
};
pub use session::{CookieRecord, SessionCookies, SessionError, SessionResult};
