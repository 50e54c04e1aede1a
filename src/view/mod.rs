//! Entries-view lifecycle state, as consumed by whatever front end embeds
//! the engine.
//!
//! The state machine is deliberately small: `Loading` until the cache has
//! answered, then either straight to `ShowingEntries` or through the
//! initial-sync path. The only transition out of `FailedToSync` is an
//! explicit retry intent — background retries are the job driver's business
//! and both paths are safe to race because initial sync is idempotent.

use tokio::sync::watch;

/// What the entries screen should render right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntriesViewState {
    /// Cache not consulted yet.
    Loading,
    /// First snapshot is being pulled; progress is committed entries so far.
    PerformingInitialSync { entries_synced: usize },
    /// Initial sync failed; shows the cause and waits for a retry intent.
    FailedToSync { cause: String },
    /// Normal operation; `background_sync` marks an incremental sync in
    /// flight behind the list.
    ShowingEntries { background_sync: bool },
}

/// Single writer for the view state, driven by the embedding application.
/// Observers subscribe through [`ViewStateTracker::subscribe`] and receive
/// the current state immediately and every change in order.
pub struct ViewStateTracker {
    state: watch::Sender<EntriesViewState>,
}

impl ViewStateTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(EntriesViewState::Loading);
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<EntriesViewState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> EntriesViewState {
        self.state.borrow().clone()
    }

    /// The cache answered: show entries if the snapshot is complete,
    /// otherwise enter the initial-sync path.
    pub fn cache_ready(&self, initial_sync_completed: bool) {
        let next = if initial_sync_completed {
            EntriesViewState::ShowingEntries {
                background_sync: false,
            }
        } else {
            EntriesViewState::PerformingInitialSync { entries_synced: 0 }
        };
        let _ = self.state.send_replace(next);
    }

    /// Progress tick during initial sync; ignored in any other state.
    pub fn initial_sync_progress(&self, entries_synced: usize) {
        self.state.send_if_modified(|state| {
            if matches!(state, EntriesViewState::PerformingInitialSync { .. }) {
                *state = EntriesViewState::PerformingInitialSync { entries_synced };
                true
            } else {
                false
            }
        });
    }

    /// Initial sync finished: the list is ready.
    pub fn initial_sync_completed(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, EntriesViewState::PerformingInitialSync { .. }) {
                *state = EntriesViewState::ShowingEntries {
                    background_sync: false,
                };
                true
            } else {
                false
            }
        });
    }

    /// Initial sync failed; surfaces the raw cause for display.
    pub fn initial_sync_failed(&self, cause: impl Into<String>) {
        let cause = cause.into();
        self.state.send_if_modified(|state| {
            if matches!(state, EntriesViewState::PerformingInitialSync { .. }) {
                *state = EntriesViewState::FailedToSync { cause };
                true
            } else {
                false
            }
        });
    }

    /// Explicit user retry. This is the only way out of `FailedToSync`;
    /// called in any other state it does nothing.
    pub fn retry(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, EntriesViewState::FailedToSync { .. }) {
                *state = EntriesViewState::PerformingInitialSync { entries_synced: 0 };
                true
            } else {
                false
            }
        });
    }

    /// Toggle the background-sync indicator while showing entries.
    pub fn background_sync(&self, running: bool) {
        self.state.send_if_modified(|state| {
            if matches!(state, EntriesViewState::ShowingEntries { .. }) {
                *state = EntriesViewState::ShowingEntries {
                    background_sync: running,
                };
                true
            } else {
                false
            }
        });
    }
}

impl Default for ViewStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_loading() {
        let tracker = ViewStateTracker::new();
        assert_eq!(tracker.current(), EntriesViewState::Loading);
    }

    #[test]
    fn initialized_cache_goes_straight_to_entries() {
        let tracker = ViewStateTracker::new();
        tracker.cache_ready(true);
        assert_eq!(
            tracker.current(),
            EntriesViewState::ShowingEntries {
                background_sync: false
            }
        );
    }

    #[test]
    fn uninitialized_cache_enters_initial_sync_with_progress() {
        let tracker = ViewStateTracker::new();
        tracker.cache_ready(false);
        tracker.initial_sync_progress(120);
        assert_eq!(
            tracker.current(),
            EntriesViewState::PerformingInitialSync { entries_synced: 120 }
        );

        tracker.initial_sync_completed();
        assert_eq!(
            tracker.current(),
            EntriesViewState::ShowingEntries {
                background_sync: false
            }
        );
    }

    #[test]
    fn failure_is_only_left_via_explicit_retry() {
        let tracker = ViewStateTracker::new();
        tracker.cache_ready(false);
        tracker.initial_sync_failed("Request timed out");

        // Progress ticks and completion events from a dead sync change nothing.
        tracker.initial_sync_progress(5);
        tracker.initial_sync_completed();
        assert_eq!(
            tracker.current(),
            EntriesViewState::FailedToSync {
                cause: "Request timed out".to_string()
            }
        );

        tracker.retry();
        assert_eq!(
            tracker.current(),
            EntriesViewState::PerformingInitialSync { entries_synced: 0 }
        );
    }

    #[test]
    fn retry_outside_failure_is_a_no_op() {
        let tracker = ViewStateTracker::new();
        tracker.cache_ready(true);
        tracker.retry();
        assert_eq!(
            tracker.current(),
            EntriesViewState::ShowingEntries {
                background_sync: false
            }
        );
    }

    #[test]
    fn background_sync_toggles_only_while_showing_entries() {
        let tracker = ViewStateTracker::new();
        tracker.background_sync(true);
        assert_eq!(tracker.current(), EntriesViewState::Loading);

        tracker.cache_ready(true);
        tracker.background_sync(true);
        assert_eq!(
            tracker.current(),
            EntriesViewState::ShowingEntries {
                background_sync: true
            }
        );
    }

    #[tokio::test]
    async fn observers_see_transitions_in_order() {
        let tracker = ViewStateTracker::new();
        let mut rx = tracker.subscribe();

        assert_eq!(*rx.borrow_and_update(), EntriesViewState::Loading);

        tracker.cache_ready(false);
        rx.changed().await.unwrap();
        assert!(matches!(
            *rx.borrow_and_update(),
            EntriesViewState::PerformingInitialSync { .. }
        ));

        tracker.initial_sync_completed();
        rx.changed().await.unwrap();
        assert!(matches!(
            *rx.borrow_and_update(),
            EntriesViewState::ShowingEntries { .. }
        ));
    }
}
