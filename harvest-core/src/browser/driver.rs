use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::{BrowserError, BrowserResult};

/// One completed network response observed on the page.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: String,
    pub body: String,
}

impl ResponseEvent {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

pub type ResponseSender = mpsc::UnboundedSender<ResponseEvent>;
pub type ResponseReceiver = mpsc::UnboundedReceiver<ResponseEvent>;

/// Queue the driver publishes response events onto. A single consumer drains
/// it in arrival order.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> BrowserResult<Value> {
        serde_json::from_str(&self.body).map_err(|err| {
            BrowserError::Network(format!("response from {} is not json: {err}", self.url))
        })
    }
}

#[async_trait(?Send)]
pub trait BrowserDriver {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    async fn scroll_to_bottom(&self) -> BrowserResult<()>;
    /// Clicks the first visible element whose text equals `label`. Returns
    /// whether anything was clicked.
    async fn click_text(&self, label: &str) -> BrowserResult<bool>;
    /// Follow-up GET reusing the authenticated page session.
    async fn get(&self, url: &str) -> BrowserResult<FetchedResponse>;
}
