use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HarvesterConfig {
    pub browser: BrowserSection,
    pub session: SessionSection,
    pub harvest: HarvestSection,
    pub hydration: HydrationSection,
    pub links: LinksSection,
}

impl HarvesterConfig {
    /// Resolves relative paths (cookie file, profile dir) against the directory
    /// holding the config file.
    pub fn resolve_path<P: AsRef<Path>>(&self, base_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub profile_dir: String,
    pub user_agents: Vec<String>,
    pub languages: Vec<String>,
    pub viewport: [u32; 2],
    pub navigation_timeout_seconds: u64,
    pub action_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    pub cookie_file: String,
    pub cookie_domain: String,
    pub required_cookies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestSection {
    pub base_url: String,
    pub max_scroll_iterations: usize,
    pub max_post_count: usize,
    pub scroll_delay_seconds: f64,
    pub stagnation_limit: usize,
}

impl HarvestSection {
    pub fn scroll_delay(&self) -> Result<Duration> {
        duration_from_secs("scroll_delay_seconds", self.scroll_delay_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HydrationSection {
    pub enabled: bool,
    pub detail_endpoint: String,
    pub timeout_seconds: u64,
    pub min_spacing_ms: u64,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinksSection {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub min_spacing_ms: u64,
}

pub fn load_harvester_config<P: AsRef<Path>>(path: P) -> Result<HarvesterConfig> {
    let config: HarvesterConfig = load_toml(path)?;
    config.harvest.scroll_delay()?;
    Ok(config)
}

/// Seconds as a `Duration`. Negative values count as zero; values a
/// `Duration` cannot hold are rejected.
pub fn duration_from_secs(field: &str, seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .map_err(|err| ConfigError::Invalid(format!("{field} = {seconds}: {err}")))
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
