use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, ResponseReceiver};

use super::options::HarvestConfig;
use super::pipeline::HarvestPipeline;
use super::state::HarvestSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CapReached,
    TimelineExhausted,
    Stagnated,
    IterationBudget,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::CapReached => "cap reached",
            StopReason::TimelineExhausted => "timeline exhausted",
            StopReason::Stagnated => "stagnated",
            StopReason::IterationBudget => "iteration budget spent",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Scrolling,
    Settling,
    Evaluating,
    Done(StopReason),
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    pub max_iterations: usize,
    pub settle_delay: Duration,
    pub stagnation_limit: usize,
    pub cap: usize,
}

impl PaginationSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_iterations: config.max_scroll_iterations,
            settle_delay: config.settle_delay(),
            stagnation_limit: config.stagnation_limit,
            cap: config.max_post_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationOutcome {
    pub stop_reason: StopReason,
    pub iterations: usize,
}

/// Drives scroll, settle, evaluate until a stop condition fires. It is the
/// only component that decides to stop scrolling.
#[derive(Debug)]
pub struct PaginationController {
    settings: PaginationSettings,
    state: PaginationState,
    iterations: usize,
    stagnant: usize,
    baseline: usize,
}

impl PaginationController {
    pub fn new(settings: PaginationSettings) -> Self {
        Self {
            settings,
            state: PaginationState::Scrolling,
            iterations: 0,
            stagnant: 0,
            baseline: 0,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Consumes the responses triggered by navigation before the first
    /// scroll.
    pub async fn prime(
        &mut self,
        driver: &dyn BrowserDriver,
        events: &mut ResponseReceiver,
        pipeline: &mut HarvestPipeline,
        session: &mut HarvestSession,
    ) {
        self.settle(driver, events, pipeline, session).await;
        self.baseline = session.collected();
        debug!(collected = self.baseline, "initial page settled");
        if self.baseline >= self.settings.cap {
            self.state = PaginationState::Done(StopReason::CapReached);
        }
    }

    pub async fn run(
        &mut self,
        driver: &dyn BrowserDriver,
        events: &mut ResponseReceiver,
        pipeline: &mut HarvestPipeline,
        session: &mut HarvestSession,
    ) -> PaginationOutcome {
        loop {
            match self.state {
                PaginationState::Scrolling => {
                    self.iterations += 1;
                    if let Err(err) = driver.scroll_to_bottom().await {
                        warn!(iteration = self.iterations, error = %err, "scroll action failed");
                        session.metrics.record_scroll_failure();
                    }
                    self.state = PaginationState::Settling;
                }
                PaginationState::Settling => {
                    self.settle(driver, events, pipeline, session).await;
                    self.state = PaginationState::Evaluating;
                }
                PaginationState::Evaluating => {
                    self.state = match self.evaluate(session) {
                        Some(reason) => PaginationState::Done(reason),
                        None => PaginationState::Scrolling,
                    };
                }
                PaginationState::Done(stop_reason) => {
                    self.drain(driver, events, pipeline, session).await;
                    info!(
                        run_id = %session.run_id,
                        iterations = self.iterations,
                        collected = session.collected(),
                        reason = %stop_reason,
                        "pagination finished"
                    );
                    return PaginationOutcome {
                        stop_reason,
                        iterations: self.iterations,
                    };
                }
            }
        }
    }

    /// Stop conditions in priority order.
    fn evaluate(&mut self, session: &mut HarvestSession) -> Option<StopReason> {
        let collected = session.collected();
        let net_new = collected.saturating_sub(self.baseline);
        self.baseline = collected;
        if net_new == 0 {
            self.stagnant += 1;
        } else {
            self.stagnant = 0;
        }
        let cursor_seen = session.take_cursor_observed();
        debug!(
            iteration = self.iterations,
            net_new,
            collected,
            stagnant = self.stagnant,
            cursor_seen,
            "evaluating pagination"
        );

        if collected >= self.settings.cap {
            Some(StopReason::CapReached)
        } else if !cursor_seen {
            Some(StopReason::TimelineExhausted)
        } else if self.stagnant >= self.settings.stagnation_limit {
            Some(StopReason::Stagnated)
        } else if self.iterations >= self.settings.max_iterations {
            Some(StopReason::IterationBudget)
        } else {
            None
        }
    }

    /// Handles response events until the settle deadline. An event already
    /// being handled at the deadline runs to completion.
    async fn settle(
        &mut self,
        driver: &dyn BrowserDriver,
        events: &mut ResponseReceiver,
        pipeline: &mut HarvestPipeline,
        session: &mut HarvestSession,
    ) {
        let deadline = Instant::now() + self.settings.settle_delay;
        loop {
            match timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => {
                    pipeline.handle(driver, session, event).await;
                }
                Ok(None) => {
                    sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }
    }

    /// Handles responses that were already queued when scrolling stopped.
    async fn drain(
        &mut self,
        driver: &dyn BrowserDriver,
        events: &mut ResponseReceiver,
        pipeline: &mut HarvestPipeline,
        session: &mut HarvestSession,
    ) {
        while let Ok(event) = events.try_recv() {
            pipeline.handle(driver, session, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_iterations: usize) -> PaginationSettings {
        PaginationSettings {
            max_iterations,
            settle_delay: Duration::from_secs(2),
            stagnation_limit: 3,
            cap: 5,
        }
    }

    fn session_with(collected: usize, cursor: bool) -> HarvestSession {
        use crate::harvest::post::{Engagement, Post, PostKind};

        let mut session = HarvestSession::new();
        for id in 0..collected {
            session.collector.push(Post {
                id: id.to_string(),
                url: String::new(),
                kind: PostKind::Original,
                author: None,
                text: Some(String::new()),
                retweet_full_text: None,
                created_at: None,
                timestamp: None,
                engagement: Engagement::default(),
                parent: None,
                in_reply_to_handle: None,
                media: Vec::new(),
                expanded_urls: Vec::new(),
                mentions: Vec::new(),
                hashtags: Vec::new(),
            });
        }
        if cursor {
            session.observe_cursor("c".into());
        }
        session
    }

    #[test]
    fn cap_wins_over_missing_cursor() {
        let mut controller = PaginationController::new(settings(10));
        let mut session = session_with(5, false);
        assert_eq!(
            controller.evaluate(&mut session),
            Some(StopReason::CapReached)
        );
    }

    #[test]
    fn missing_cursor_means_exhausted() {
        let mut controller = PaginationController::new(settings(10));
        let mut session = session_with(1, false);
        assert_eq!(
            controller.evaluate(&mut session),
            Some(StopReason::TimelineExhausted)
        );
    }

    #[test]
    fn stagnation_counts_consecutive_evaluations() {
        let mut controller = PaginationController::new(settings(10));
        let mut session = session_with(0, false);
        for round in 1..=3 {
            session.observe_cursor(format!("c{round}"));
            let verdict = controller.evaluate(&mut session);
            if round < 3 {
                assert_eq!(verdict, None);
            } else {
                assert_eq!(verdict, Some(StopReason::Stagnated));
            }
        }
    }

    #[test]
    fn budget_applies_last() {
        let mut controller = PaginationController::new(settings(1));
        controller.iterations = 1;
        let mut session = session_with(2, true);
        assert_eq!(
            controller.evaluate(&mut session),
            Some(StopReason::IterationBudget)
        );
    }
}
