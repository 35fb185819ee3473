use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Enforces a minimum spacing between successive calls.
#[derive(Debug)]
pub struct Pacer {
    min_spacing: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_call: None,
        }
    }

    /// Waits until the spacing since the previous call has elapsed, then
    /// stamps the current call. Returns how long it waited.
    pub async fn wait(&mut self) -> Duration {
        let now = Instant::now();
        let waited = match self.last_call {
            Some(last) if last + self.min_spacing > now => {
                let ready = last + self.min_spacing;
                sleep_until(ready).await;
                ready - now
            }
            _ => Duration::ZERO,
        };
        self.last_call = Some(Instant::now());
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_and_later_calls_are_spaced() {
        let mut pacer = Pacer::new(Duration::from_millis(500));
        assert_eq!(pacer.wait().await, Duration::ZERO);
        assert_eq!(pacer.wait().await, Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(800)).await;
        assert_eq!(pacer.wait().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_spacing_never_waits() {
        let mut pacer = Pacer::new(Duration::ZERO);
        assert_eq!(pacer.wait().await, Duration::ZERO);
        assert_eq!(pacer.wait().await, Duration::ZERO);
    }
}
