use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{BrowserSection, HydrationSection};
use crate::session::SessionCookies;

use super::driver::{
    response_channel, BrowserDriver, FetchedResponse, ResponseEvent, ResponseReceiver,
    ResponseSender,
};
use super::error::{BrowserError, BrowserResult};

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

/// Launches a Chromium instance carrying the session cookies and wires its
/// network events onto a response queue.
#[derive(Debug, Clone)]
pub struct DriverLauncher {
    config: Arc<BrowserSection>,
    bearer_token: Option<String>,
    profile_root: PathBuf,
}

impl DriverLauncher {
    pub fn new(
        config: BrowserSection,
        hydration: &HydrationSection,
        profile_root: PathBuf,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bearer_token: hydration.bearer_token.clone(),
            profile_root,
        }
    }

    pub async fn launch(
        &self,
        cookies: &SessionCookies,
        cookie_domain: &str,
        overrides: LaunchOverrides,
    ) -> BrowserResult<(ChromiumDriver, ResponseReceiver)> {
        let profile_dir = self.profile_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&profile_dir).await?;

        let user_agent = self.select_user_agent();
        let language = self.select_language();
        let headless = overrides.headless.unwrap_or(self.config.headless);
        let chromium_config =
            self.build_chromium_config(&profile_dir, &user_agent, language.as_deref(), headless)?;
        info!(
            profile = %profile_dir.display(),
            ua = %user_agent,
            headless,
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        let page = browser.new_page(CreateTargetParams::new("about:blank")).await?;
        let mut ua_params = SetUserAgentOverrideParams::builder().user_agent(user_agent.clone());
        if let Some(language) = &language {
            ua_params = ua_params.accept_language(language.clone());
        }
        page.set_user_agent(ua_params.build().map_err(BrowserError::Configuration)?)
            .await?;
        page.set_cookies(cookie_params(cookies, cookie_domain)?).await?;

        let (sender, receiver) = response_channel();
        let pump_task = spawn_response_pump(page.clone(), sender).await?;

        let driver = ChromiumDriver {
            browser,
            page,
            handler_task: Some(handler_task),
            pump_task: Some(pump_task),
            profile_dir,
            csrf_token: cookies.csrf_token().map(str::to_string),
            bearer_token: self.bearer_token.clone(),
            navigation_timeout: Duration::from_secs(self.config.navigation_timeout_seconds),
            action_timeout: Duration::from_secs(self.config.action_timeout_seconds),
        };
        Ok((driver, receiver))
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string())
    }

    fn select_language(&self) -> Option<String> {
        let mut rng = rand::thread_rng();
        self.config.languages.choose(&mut rng).cloned()
    }

    fn build_chromium_config(
        &self,
        profile_dir: &std::path::Path,
        user_agent: &str,
        language: Option<&str>,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.viewport;
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.executable_path)
            .user_data_dir(profile_dir)
            .request_timeout(Duration::from_secs(self.config.navigation_timeout_seconds))
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });
        if !headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={width},{height}"),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(language) = language {
            if let Some(primary) = language.split(',').next() {
                args.push(format!("--lang={primary}"));
            }
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

fn cookie_params(cookies: &SessionCookies, domain: &str) -> BrowserResult<Vec<CookieParam>> {
    cookies
        .for_domain(domain)
        .into_iter()
        .map(|cookie| {
            CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .domain(cookie.domain)
                .path(cookie.path)
                .secure(cookie.secure)
                .http_only(cookie.http_only)
                .build()
                .map_err(BrowserError::Configuration)
        })
        .collect()
}

/// Forwards every finished JSON response on `page` to `sender`. Bodies are
/// only requested once loading has finished; failed or cancelled loads are
/// forgotten.
async fn spawn_response_pump(
    page: Page,
    sender: ResponseSender,
) -> BrowserResult<JoinHandle<()>> {
    let mut received = page.event_listener::<EventResponseReceived>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;

    Ok(tokio::spawn(async move {
        let mut pending = PendingResponses::default();
        loop {
            tokio::select! {
                Some(event) = received.next() => {
                    pending.received(
                        event.request_id.inner(),
                        &event.response.mime_type,
                        &event.response.url,
                    );
                }
                Some(event) = failed.next() => {
                    if let Some(url) = pending.settle(event.request_id.inner()) {
                        debug!(url = %url, error = %event.error_text, "response load failed");
                    }
                }
                Some(event) = finished.next() => {
                    let Some(url) = pending.settle(event.request_id.inner()) else {
                        continue;
                    };
                    match read_body(&page, event.request_id.clone()).await {
                        Ok(body) => {
                            trace!(url = %url, bytes = body.len(), "captured response");
                            if sender.send(ResponseEvent::new(url, body)).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(url = %url, error = %err, "failed to read response body"),
                    }
                }
                else => break,
            }
        }
    }))
}

/// JSON responses whose body has not finished loading, keyed by request id.
#[derive(Debug, Default)]
struct PendingResponses {
    urls: HashMap<String, String>,
}

impl PendingResponses {
    fn received(&mut self, request_id: &str, mime_type: &str, url: &str) {
        if mime_type.contains("json") {
            self.urls.insert(request_id.to_string(), url.to_string());
        }
    }

    /// Forgets the request once its load finished or failed.
    fn settle(&mut self, request_id: &str) -> Option<String> {
        self.urls.remove(request_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.urls.len()
    }
}

async fn read_body(page: &Page, request_id: RequestId) -> BrowserResult<String> {
    let response = page.execute(GetResponseBodyParams::new(request_id)).await?;
    if response.result.base64_encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(response.result.body.as_bytes())
            .map_err(|err| BrowserError::Network(format!("invalid base64 body: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| BrowserError::Network(format!("body is not utf-8: {err}")))
    } else {
        Ok(response.result.body.clone())
    }
}

#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    pump_task: Option<JoinHandle<()>>,
    profile_dir: PathBuf,
    csrf_token: Option<String>,
    bearer_token: Option<String>,
    navigation_timeout: Duration,
    action_timeout: Duration,
}

impl ChromiumDriver {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile_dir.display(), "shutting down chromium instance");
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        if let Err(err) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(error = %err, "failed to remove profile directory");
        }
        Ok(())
    }

    fn fetch_script(&self, url: &str) -> BrowserResult<String> {
        let mut headers = serde_json::Map::new();
        if let Some(token) = &self.csrf_token {
            headers.insert("x-csrf-token".into(), token.clone().into());
        }
        if let Some(bearer) = &self.bearer_token {
            headers.insert("authorization".into(), format!("Bearer {bearer}").into());
            headers.insert("x-twitter-auth-type".into(), "OAuth2Session".into());
            headers.insert("x-twitter-active-user".into(), "yes".into());
        }
        let url = serde_json::to_string(url)
            .map_err(|err| BrowserError::Configuration(format!("invalid url: {err}")))?;
        let headers = serde_json::to_string(&headers)
            .map_err(|err| BrowserError::Configuration(format!("invalid headers: {err}")))?;
        Ok(format!(
            r#"(async () => {{
    const response = await fetch({url}, {{ credentials: 'include', redirect: 'follow', headers: {headers} }});
    const body = await response.text();
    return {{ status: response.status, url: response.url, body }};
}})()"#
        ))
    }
}

#[derive(Debug, Deserialize)]
struct FetchPayload {
    status: u16,
    url: String,
    body: String,
}

#[async_trait(?Send)]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        timeout(self.navigation_timeout, async {
            self.page.goto(params).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        })
        .await
        .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))??;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> BrowserResult<()> {
        timeout(
            self.action_timeout,
            self.page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)"),
        )
        .await
        .map_err(|_| BrowserError::Timeout("scroll".into()))??;
        Ok(())
    }

    async fn click_text(&self, label: &str) -> BrowserResult<bool> {
        let label = serde_json::to_string(label)
            .map_err(|err| BrowserError::Configuration(format!("invalid label: {err}")))?;
        let script = format!(
            r#"(() => {{
    const wanted = {label};
    const nodes = document.querySelectorAll('a, span, div[role="tab"], button');
    for (const node of nodes) {{
        if ((node.innerText || '').trim() === wanted) {{
            node.click();
            return true;
        }}
    }}
    return false;
}})()"#
        );
        let clicked: bool = timeout(self.action_timeout, self.page.evaluate(script.as_str()))
            .await
            .map_err(|_| BrowserError::Timeout("click".into()))??
            .into_value()
            .map_err(|err| {
                BrowserError::Unexpected(format!("failed to decode click result: {err}"))
            })?;
        Ok(clicked)
    }

    async fn get(&self, url: &str) -> BrowserResult<FetchedResponse> {
        let script = self.fetch_script(url)?;
        let payload: FetchPayload = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|err| BrowserError::Network(format!("follow-up fetch failed: {err}")))?
            .into_value()
            .map_err(|err| {
                BrowserError::Unexpected(format!("failed to decode fetch payload: {err}"))
            })?;
        Ok(FetchedResponse {
            status: payload.status,
            url: payload.url,
            body: payload.body,
        })
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile_dir.display(),
                    "ChromiumDriver dropped without explicit shutdown"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_loads_do_not_linger() {
        let mut pending = PendingResponses::default();
        pending.received("1", "application/json", "https://x.com/i/api/graphql/a/UserTweets");
        pending.received("2", "application/json", "https://x.com/i/api/graphql/b/UserTweets");
        pending.received("3", "text/html", "https://x.com/alice");
        assert_eq!(pending.len(), 2);

        assert_eq!(
            pending.settle("2").as_deref(),
            Some("https://x.com/i/api/graphql/b/UserTweets")
        );
        assert!(pending.settle("3").is_none());
        assert!(pending.settle("1").is_some());
        assert!(pending.settle("1").is_none());
        assert_eq!(pending.len(), 0);
    }
}
