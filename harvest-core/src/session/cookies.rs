use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    fn matches_domain(&self, domain: &str) -> bool {
        let wanted = domain.trim_start_matches('.');
        let own = self.domain.trim_start_matches('.');
        own == wanted || own.ends_with(&format!(".{wanted}"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<CookieRecord>),
    Wrapped { cookies: Vec<CookieRecord> },
}

/// Cookie set backing every request the browser makes for one harvest run.
#[derive(Debug, Clone, Default)]
pub struct SessionCookies {
    cookies: Vec<CookieRecord>,
}

impl SessionCookies {
    pub fn new(cookies: Vec<CookieRecord>) -> Self {
        Self { cookies }
    }

    /// Accepts both a bare JSON array and the `{"cookies": [...]}` export shape.
    pub fn load<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let parsed: CookieFile =
            serde_json::from_str(&content).map_err(|source| SessionError::Parse {
                source,
                path: path.to_path_buf(),
            })?;
        let cookies = match parsed {
            CookieFile::List(cookies) => cookies,
            CookieFile::Wrapped { cookies } => cookies,
        };
        debug!(path = %path.display(), count = cookies.len(), "loaded session cookies");
        Ok(Self { cookies })
    }

    pub fn cookies(&self) -> &[CookieRecord] {
        &self.cookies
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CookieRecord> {
        self.cookies.iter().find(|cookie| cookie.name == name)
    }

    /// CSRF token the internal API expects mirrored in a request header.
    pub fn csrf_token(&self) -> Option<&str> {
        self.get("ct0").map(|cookie| cookie.value.as_str())
    }

    /// Cookies scoped to `domain` (or one of its subdomains).
    pub fn for_domain(&self, domain: &str) -> Vec<CookieRecord> {
        self.cookies
            .iter()
            .filter(|cookie| cookie.matches_domain(domain))
            .cloned()
            .collect()
    }

    pub fn validate(&self, domain: &str, required: &[String]) -> SessionResult<()> {
        let scoped = self.for_domain(domain);
        let missing: Vec<String> = required
            .iter()
            .filter(|name| {
                !scoped
                    .iter()
                    .any(|cookie| &cookie.name == *name && !cookie.value.is_empty())
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SessionError::MissingCookies(missing));
        }
        if scoped.iter().all(|cookie| cookie.name != "twid") {
            warn!("session has no twid cookie; some timelines may render logged-out");
        }
        Ok(())
    }
}
