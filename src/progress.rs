use indicatif::ProgressBar;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Percentage progress of one upload, optionally mirrored to a progress bar.
///
/// Clones share the same value. Writers can only raise it; [`reset`] is the
/// one way back to zero.
///
/// [`reset`]: ProgressReporter::reset
#[derive(Clone, Default)]
pub struct ProgressReporter {
    value: Arc<AtomicU8>,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors the value to `bar`, whose length is set to 100.
    #[must_use]
    pub fn with_bar(bar: ProgressBar) -> Self {
        bar.set_length(100);
        Self {
            value: Arc::default(),
            bar: Some(bar),
        }
    }

    #[must_use]
    pub fn value(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
        if let Some(bar) = &self.bar {
            bar.reset();
            bar.set_length(100);
        }
    }

    /// Raises the value to `percent` (capped at 100). Lower values are ignored.
    pub fn advance_to(&self, percent: u8) {
        let previous = self.value.fetch_max(percent.min(100), Ordering::SeqCst);
        self.sync_bar(previous.max(percent.min(100)));
    }

    /// Raises the value by `delta` without passing `cap`.
    pub fn bump(&self, delta: u8, cap: u8) {
        let _ = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < cap).then(|| current.saturating_add(delta).min(cap))
            });
        self.sync_bar(self.value());
    }

    pub fn set_message(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.into());
        }
    }

    pub fn finish(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.into());
        }
    }

    pub fn abandon(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message(message.into());
        }
    }

    fn sync_bar(&self, percent: u8) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(percent));
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("value", &self.value())
            .field("has_bar", &self.bar.is_some())
            .finish()
    }
}

/// Holds a reporter for the duration of one pipeline invocation.
///
/// Dropping the guard without calling [`complete`] resets the progress to 0,
/// so an early return or error never leaves a half-finished value behind.
///
/// [`complete`]: InvocationGuard::complete
#[derive(Debug)]
pub struct InvocationGuard<'a> {
    progress: &'a ProgressReporter,
    completed: bool,
}

impl<'a> InvocationGuard<'a> {
    /// Resets `progress` and starts a new invocation.
    #[must_use]
    pub fn begin(progress: &'a ProgressReporter) -> Self {
        progress.reset();
        Self {
            progress,
            completed: false,
        }
    }

    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.progress.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_decreases() {
        let progress = ProgressReporter::new();
        progress.advance_to(40);
        progress.advance_to(10);
        assert_eq!(progress.value(), 40);
        progress.advance_to(250);
        assert_eq!(progress.value(), 100);
    }

    #[test]
    fn test_bump_respects_cap() {
        let progress = ProgressReporter::new();
        for _ in 0..50 {
            progress.bump(7, 90);
        }
        assert_eq!(progress.value(), 90);

        progress.advance_to(95);
        progress.bump(3, 90);
        assert_eq!(progress.value(), 95);
    }

    #[test]
    fn test_clones_share_value() {
        let progress = ProgressReporter::new();
        let ticker = progress.clone();
        ticker.bump(5, 90);
        assert_eq!(progress.value(), 5);
    }

    #[test]
    fn test_guard_resets_unless_completed() {
        let progress = ProgressReporter::new();
        progress.advance_to(100);

        let guard = InvocationGuard::begin(&progress);
        assert_eq!(progress.value(), 0);
        progress.advance_to(60);
        drop(guard);
        assert_eq!(progress.value(), 0);

        let guard = InvocationGuard::begin(&progress);
        progress.advance_to(100);
        guard.complete();
        assert_eq!(progress.value(), 100);
    }

    #[test]
    fn test_bar_mirrors_value() {
        let bar = ProgressBar::hidden();
        let progress = ProgressReporter::with_bar(bar.clone());
        progress.advance_to(30);
        assert_eq!(bar.position(), 30);
        assert_eq!(bar.length(), Some(100));
        progress.reset();
        assert_eq!(bar.position(), 0);
    }
}
