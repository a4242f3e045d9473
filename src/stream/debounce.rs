// ABOUTME: Debounced filter commitment driven by an explicit deadline
//
// Every input replaces the pending text and pushes the deadline out by the delay.
// A commit happens only once the deadline passes with no further input, and always
// carries the latest text. Time is passed in, so the filter can be driven by a
// paused Tokio clock in tests.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Pending {
    text: String,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct DebounceFilter {
    delay: Duration,
    pending: Option<Pending>,
}

impl DebounceFilter {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Record an edit, cancelling any pending commit and rescheduling it
    pub fn on_input(&mut self, text: impl Into<String>, now: Instant) {
        self.pending = Some(Pending {
            text: text.into(),
            deadline: now + self.delay,
        });
    }

    /// When the pending commit fires, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|pending| pending.text.as_str())
    }

    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the committed text if the quiet period has elapsed
    pub fn poll_commit(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some(pending) if now >= pending.deadline => {
                let text = self.pending.take().map(|pending| pending.text)?;
                debug!(term = %text, "Filter committed");
                Some(text)
            }
            _ => None,
        }
    }

    /// Wait for the pending commit. Returns `None` at once when nothing is pending.
    ///
    /// Cancel-safe: dropping the future leaves the pending edit in place.
    pub async fn committed(&mut self) -> Option<String> {
        let deadline = self.deadline()?;
        tokio::time::sleep_until(deadline).await;
        self.poll_commit(Instant::now())
    }

    /// Drop any pending commit without emitting it
    pub fn dispose(&mut self) {
        if self.pending.take().is_some() {
            debug!("Pending filter commit discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const DELAY: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_rapid_inputs_coalesce_into_last_value() {
        let mut filter = DebounceFilter::new(DELAY);
        let started = Instant::now();

        for text in ["e", "er", "err"] {
            filter.on_input(text, Instant::now());
            advance(Duration::from_millis(300)).await;
            assert_eq!(filter.poll_commit(Instant::now()), None);
        }

        let last_input = started + Duration::from_millis(600);
        assert_eq!(filter.committed().await.as_deref(), Some("err"));
        let quiet = Instant::now() - last_input;
        assert!(quiet >= DELAY && quiet < DELAY + Duration::from_millis(2));

        // Exactly one commit per quiet period
        assert_eq!(filter.committed().await, None);
        assert!(!filter.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inputs_separated_by_delay_commit_separately() {
        let mut filter = DebounceFilter::new(DELAY);

        filter.on_input("first", Instant::now());
        assert_eq!(filter.committed().await.as_deref(), Some("first"));

        filter.on_input("second", Instant::now());
        assert_eq!(filter.committed().await.as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_commit_before_quiet_period() {
        let mut filter = DebounceFilter::new(DELAY);
        filter.on_input("x", Instant::now());

        advance(DELAY - Duration::from_millis(1)).await;
        assert_eq!(filter.poll_commit(Instant::now()), None);
        assert_eq!(filter.pending_text(), Some("x"));

        advance(Duration::from_millis(1)).await;
        assert_eq!(filter.poll_commit(Instant::now()).as_deref(), Some("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_commit() {
        let mut filter = DebounceFilter::new(DELAY);
        filter.on_input("abandoned", Instant::now());
        filter.dispose();

        advance(DELAY * 2).await;
        assert_eq!(filter.poll_commit(Instant::now()), None);
        assert_eq!(filter.committed().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_keeps_pending_edit() {
        let mut filter = DebounceFilter::new(DELAY);
        filter.on_input("kept", Instant::now());

        let waited =
            tokio::time::timeout(Duration::from_millis(100), filter.committed()).await;
        assert!(waited.is_err());
        assert_eq!(filter.pending_text(), Some("kept"));
        assert_eq!(filter.committed().await.as_deref(), Some("kept"));
    }
}
