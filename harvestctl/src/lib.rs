use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use harvest_core::{
    duration_from_secs, load_harvester_config, parse_date_bound, BrowserError, ContentType,
    DriverLauncher, HarvestConfig, HarvestError, HarvestReport, Harvester, HarvesterConfig,
    LaunchOverrides, Post, PostKind, SessionCookies, SessionError, Target,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

const POST_SEPARATOR: &str = "----------------------------------------";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] harvest_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("harvest aborted: {0}")]
    Harvest(#[from] HarvestError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Timeline harvester control interface", long_about = None)]
pub struct Cli {
    /// Path to harvester.toml
    #[arg(long, default_value = "configs/harvester.toml")]
    pub config: PathBuf,
    /// Alternative cookie file (overrides session.cookie_file)
    #[arg(long)]
    pub cookies: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
    /// Write output to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Raise the default log level to debug
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest posts of an account or a search query
    Harvest(HarvestArgs),
    /// Session cookie operations
    #[command(subcommand)]
    Cookies(CookiesCommands),
}

#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    /// Account handle (with or without @) or a raw search query
    pub target: String,
    /// Content type: all | originals | retweets
    #[arg(long = "type", default_value = "all")]
    pub content_type: ContentType,
    /// Inclusive lower date bound (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,
    /// Exclusive upper date bound (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub before: Option<String>,
    /// Maximum number of scroll iterations
    #[arg(long)]
    pub scrolls: Option<usize>,
    /// Maximum number of posts returned
    #[arg(long)]
    pub max: Option<usize>,
    /// Delay between scrolls in seconds (never below 2)
    #[arg(long)]
    pub delay: Option<f64>,
    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,
}

#[derive(Subcommand, Debug)]
pub enum CookiesCommands {
    /// Validate the cookie file without launching a browser
    Check,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Harvest(args) => {
            let config = context.harvest_config(args)?;
            let headless = args.no_headless.then_some(false);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(context.harvest(config, headless))?;
            emit(&report, cli.format, cli.output.as_deref())?;
        }
        Commands::Cookies(CookiesCommands::Check) => {
            let check = context.check_cookies()?;
            emit(&check, cli.format, cli.output.as_deref())?;
        }
    }

    Ok(())
}

fn emit<T>(value: &T, format: OutputFormat, output: Option<&Path>) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    let rendered = render(value, format)?;
    match output {
        Some(path) => {
            fs::write(path, rendered)?;
            info!(path = %path.display(), "output written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<String>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => Ok(value.display()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for HarvestReport {
    fn display(&self) -> String {
        let mut out = format!(
            "# {}: {} posts ({} after {} iterations)\n\n",
            self.target,
            self.posts.len(),
            self.stop_reason,
            self.iterations
        );
        out.push_str(&format_posts_as_text(&self.posts));
        out
    }
}

#[derive(Debug, Serialize)]
pub struct CookieCheck {
    pub path: PathBuf,
    pub cookies: usize,
    pub domain: String,
    pub valid: bool,
    pub missing: Vec<String>,
    /// Earliest expiry among the required cookies, when they carry one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl DisplayFallback for CookieCheck {
    fn display(&self) -> String {
        if self.valid {
            let expiry = self
                .expires_at
                .map(|at| format!(" until {}", at.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default();
            format!(
                "{}: {} cookies, session usable for {}{expiry}",
                self.path.display(),
                self.cookies,
                self.domain
            )
        } else {
            format!(
                "{}: missing required cookies for {}: {}",
                self.path.display(),
                self.domain,
                self.missing.join(", ")
            )
        }
    }
}

/// Human-readable rendering, one tagged block per post.
pub fn format_posts_as_text(posts: &[Post]) -> String {
    let mut out = String::new();
    for post in posts {
        let tag = match post.kind {
            PostKind::Original => "[Original]",
            PostKind::Retweet => "[Retweet]",
            PostKind::Reply => "[Reply]",
        };
        let _ = writeln!(out, "{tag}");
        let _ = writeln!(out, "ID: {}", post.id);
        let _ = writeln!(out, "URL: {}", post.url);
        if let Some(text) = &post.text {
            let _ = writeln!(out, "Text: {text}");
        } else if let Some(text) = &post.retweet_full_text {
            let _ = writeln!(out, "Retweet Full Text: {text}");
        }
        let _ = writeln!(out, "Created: {}", post.created_at.as_deref().unwrap_or("?"));
        match &post.parent {
            Some(parent) => {
                let _ = writeln!(out, "Parent: {}", parent.id);
                let _ = writeln!(out, "Parent URL: {}", parent.url);
            }
            None => {
                if let Some(handle) = &post.in_reply_to_handle {
                    let _ = writeln!(out, "In reply to: @{handle}");
                }
            }
        }
        let counters = [
            ("Likes", post.engagement.likes),
            ("Retweets", post.engagement.retweets),
            ("Replies", post.engagement.replies),
            ("Quotes", post.engagement.quotes),
            ("Bookmarks", post.engagement.bookmarks),
            ("Views", post.engagement.views),
        ];
        for (label, value) in counters {
            let value = value.map_or_else(|| "-".to_string(), |count| count.to_string());
            let _ = writeln!(out, "{label}: {value}");
        }
        let _ = writeln!(out, "Media:");
        if post.media.is_empty() {
            let _ = writeln!(out, "None");
        }
        for item in &post.media {
            let label = match item.kind {
                harvest_core::MediaKind::Image => "Image",
                harvest_core::MediaKind::Video => "Video",
            };
            let _ = writeln!(out, "{label}: {}", item.url);
        }
        let _ = writeln!(out, "Expanded URLs:");
        if post.expanded_urls.is_empty() {
            let _ = writeln!(out, "None");
        }
        for url in &post.expanded_urls {
            let _ = writeln!(out, "{url}");
        }
        let _ = writeln!(out, "{POST_SEPARATOR}");
    }
    out
}

#[derive(Debug)]
struct AppContext {
    settings: HarvesterConfig,
    base_dir: PathBuf,
    cookie_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let settings = load_harvester_config(&cli.config)?;
        let base_dir = cli
            .config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let cookie_path = match &cli.cookies {
            Some(path) => path.clone(),
            None => settings.resolve_path(&base_dir, &settings.session.cookie_file),
        };
        Ok(Self {
            settings,
            base_dir,
            cookie_path,
        })
    }

    fn harvest_config(&self, args: &HarvestArgs) -> Result<HarvestConfig> {
        let mut config = HarvestConfig::new(Target::parse(&args.target), &self.settings.harvest);
        config.content_type = args.content_type;
        config.since = args.since.as_deref().map(parse_date_bound).transpose()?;
        config.before = args.before.as_deref().map(parse_date_bound).transpose()?;
        if let Some(scrolls) = args.scrolls {
            config.max_scroll_iterations = scrolls;
        }
        if let Some(max) = args.max {
            config.max_post_count = max;
        }
        if let Some(delay) = args.delay {
            config.inter_scroll_delay = duration_from_secs("--delay", delay)?;
        }
        config.validate()?;
        Ok(config)
    }

    async fn harvest(
        &self,
        config: HarvestConfig,
        headless: Option<bool>,
    ) -> Result<HarvestReport> {
        let cookies = SessionCookies::load(&self.cookie_path)?;
        let harvester = Harvester::new(config, &self.settings)?;
        harvester.verify_session(&cookies)?;

        let profile_root = self
            .settings
            .resolve_path(&self.base_dir, &self.settings.browser.profile_dir);
        let launcher = DriverLauncher::new(
            self.settings.browser.clone(),
            &self.settings.hydration,
            profile_root,
        );
        let (driver, events) = launcher
            .launch(
                &cookies,
                &self.settings.session.cookie_domain,
                LaunchOverrides { headless },
            )
            .await?;

        let outcome = harvester.run(&cookies, &driver, events).await;
        if let Err(err) = driver.shutdown().await {
            warn!(error = %err, "browser shutdown failed");
        }
        Ok(outcome?)
    }

    fn check_cookies(&self) -> Result<CookieCheck> {
        let cookies = SessionCookies::load(&self.cookie_path)?;
        let domain = self.settings.session.cookie_domain.clone();
        let (valid, missing) =
            match cookies.validate(&domain, &self.settings.session.required_cookies) {
                Ok(()) => (true, Vec::new()),
                Err(SessionError::MissingCookies(missing)) => (false, missing),
                Err(err) => return Err(err.into()),
            };
        let expires_at = self
            .settings
            .session
            .required_cookies
            .iter()
            .filter_map(|name| cookies.get(name))
            .filter_map(|cookie| cookie.expires)
            .filter(|seconds| *seconds > 0.0)
            .filter_map(|seconds| Utc.timestamp_opt(seconds as i64, 0).single())
            .min();
        Ok(CookieCheck {
            path: self.cookie_path.clone(),
            cookies: cookies.cookies().len(),
            domain,
            valid,
            missing,
            expires_at,
        })
    }
}
