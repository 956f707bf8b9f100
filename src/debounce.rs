//! Debounce scheduler for search intents.
//!
//! One deadline per [`DebounceClass`]. Scheduling a class again moves its
//! deadline, so at most one action per class is ever pending. The scheduler
//! owns no tasks or timers of its own: the owner awaits
//! [`DebounceScheduler::next_due`] inside its `select!` loop, and dropping
//! the scheduler drops every pending deadline with it.

use std::time::Duration;

use indexer_console_core::IntentClass;
use tokio::time::Instant;

use crate::config::SearchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceClass {
    /// Free-text search box.
    Text,
    /// Selects, tag ids, date pickers.
    Filter,
}

/// Quiet periods per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    pub text: Duration,
    pub filter: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            text: Duration::from_millis(500),
            filter: Duration::from_millis(300),
        }
    }
}

impl DebouncePolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            text: Duration::from_millis(config.text_debounce_ms),
            filter: Duration::from_millis(config.filter_debounce_ms),
        }
    }

    pub fn quiet_period(&self, class: DebounceClass) -> Duration {
        match class {
            DebounceClass::Text => self.text,
            DebounceClass::Filter => self.filter,
        }
    }

    /// Debounce class for an intent; `None` means dispatch immediately.
    pub fn class_for(intent: IntentClass) -> Option<DebounceClass> {
        match intent {
            IntentClass::Text => Some(DebounceClass::Text),
            IntentClass::Structured => Some(DebounceClass::Filter),
            IntentClass::Immediate => None,
        }
    }
}

#[derive(Debug)]
pub struct DebounceScheduler {
    policy: DebouncePolicy,
    text: Option<Instant>,
    filter: Option<Instant>,
}

impl DebounceScheduler {
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            text: None,
            filter: None,
        }
    }

    /// (Re)starts the quiet period for `class` and returns the new deadline.
    pub fn schedule(&mut self, class: DebounceClass) -> Instant {
        let deadline = Instant::now() + self.policy.quiet_period(class);
        *self.slot(class) = Some(deadline);
        deadline
    }

    fn cancel(&mut self, class: DebounceClass) {
        *self.slot(class) = None;
    }

    pub fn cancel_all(&mut self) {
        self.text = None;
        self.filter = None;
    }

    pub fn has_pending(&self) -> bool {
        self.text.is_some() || self.filter.is_some()
    }

    /// The earliest pending deadline, if any.
    fn next_deadline(&self) -> Option<(DebounceClass, Instant)> {
        match (self.text, self.filter) {
            (Some(t), Some(f)) if f < t => Some((DebounceClass::Filter, f)),
            (Some(t), _) => Some((DebounceClass::Text, t)),
            (None, Some(f)) => Some((DebounceClass::Filter, f)),
            (None, None) => None,
        }
    }

    /// Waits for the earliest deadline, clears it, and returns its class.
    ///
    /// Never resolves while nothing is pending. Cancel-safe: a deadline is
    /// only cleared once it has actually elapsed.
    pub async fn next_due(&mut self) -> DebounceClass {
        let Some((class, deadline)) = self.next_deadline() else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;
        self.cancel(class);
        class
    }

    fn slot(&mut self, class: DebounceClass) -> &mut Option<Instant> {
        match class {
            DebounceClass::Text => &mut self.text,
            DebounceClass::Filter => &mut self.filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn rescheduling_moves_the_deadline() {
        let mut scheduler = DebounceScheduler::new(DebouncePolicy::default());
        scheduler.schedule(DebounceClass::Text);
        advance(Duration::from_millis(400)).await;
        scheduler.schedule(DebounceClass::Text);

        // 400ms after the second keystroke the original deadline has passed,
        // the moved one has not.
        assert!(timeout(Duration::from_millis(400), scheduler.next_due())
            .await
            .is_err());
        assert!(scheduler.has_pending());

        let class = timeout(Duration::from_millis(200), scheduler.next_due())
            .await
            .unwrap();
        assert_eq!(class, DebounceClass::Text);
        assert!(!scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_class_fires_first() {
        let mut scheduler = DebounceScheduler::new(DebouncePolicy::default());
        scheduler.schedule(DebounceClass::Text);
        scheduler.schedule(DebounceClass::Filter);
        assert_eq!(scheduler.next_due().await, DebounceClass::Filter);
        assert_eq!(
            scheduler.next_deadline().map(|(class, _)| class),
            Some(DebounceClass::Text)
        );
        assert_eq!(scheduler.next_due().await, DebounceClass::Text);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_pending_never_fires() {
        let mut scheduler = DebounceScheduler::new(DebouncePolicy::default());
        scheduler.schedule(DebounceClass::Filter);
        scheduler.cancel_all();
        assert!(timeout(Duration::from_secs(10), scheduler.next_due())
            .await
            .is_err());
    }

    #[test]
    fn intent_classes() {
        assert_eq!(
            DebouncePolicy::class_for(IntentClass::Text),
            Some(DebounceClass::Text)
        );
        assert_eq!(
            DebouncePolicy::class_for(IntentClass::Structured),
            Some(DebounceClass::Filter)
        );
        assert_eq!(DebouncePolicy::class_for(IntentClass::Immediate), None);
    }
}
