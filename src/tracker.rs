//! # Tracker
//!
//! The one object that owns the whole pipeline: host-configured state, the
//! settings store, the event queue and the dispatcher. The FFI layer keeps a
//! single process-wide instance and forwards every call to it; Rust callers
//! and tests can construct their own.
//!
//! Locks are held only for the span of a read or write and never across
//! disk or network I/O done by another component.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::error::Result;
use crate::core::Config;
use crate::features::consent::{
    may_track, record_answer, render_prompt, ConsentDecision, ConsentSignal, DenyReason,
};
use crate::features::dispatch::{
    build_batches, DispatchMetadata, Dispatcher, EventSink, HttpSink, RetryPolicy,
};
use crate::features::queue::{EnqueueOutcome, EventQueue};
use crate::features::settings::{PersistedSettings, SettingsKey, SettingsStore};
use crate::features::state::ConfigState;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// What happened to a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Queued { sequence_no: u64, evicted: usize },
    Denied(DenyReason),
    /// Consent undetermined; nothing recorded until the host answers
    PromptRequired,
    /// Event too large to keep
    Dropped,
}

pub struct Tracker {
    config: Config,
    state: Mutex<ConfigState>,
    settings: Arc<SettingsStore>,
    queue: EventQueue,
    dispatcher: Dispatcher,
    /// Most recent payload seen by the gate, used as the prompt's example
    last_payload: Mutex<Option<serde_json::Value>>,
}

impl Tracker {
    /// Build a tracker that sends to the collector named in `config`
    pub fn new(config: Config) -> Result<Self> {
        let sink = HttpSink::new(&config.api_url, config.request_timeout)?;
        info!("Tracking events to {}", sink.endpoint());
        Ok(Self::with_sink(config, Arc::new(sink)))
    }

    /// Build a tracker around any sink
    pub fn with_sink(config: Config, sink: Arc<dyn EventSink>) -> Self {
        let policy = RetryPolicy::new(config.max_attempts);
        Tracker {
            state: Mutex::new(ConfigState::new(&config)),
            settings: Arc::new(SettingsStore::from_config(&config)),
            queue: EventQueue::new(config.queue_max_events, config.queue_max_bytes),
            dispatcher: Dispatcher::new(sink, policy),
            last_payload: Mutex::new(None),
            config,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConfigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the config state under its lock
    pub fn update_state<F>(&self, change: F)
    where
        F: FnOnce(&mut ConfigState),
    {
        change(&mut self.lock_state());
    }

    /// Copy of the current config state
    pub fn state(&self) -> ConfigState {
        self.lock_state().clone()
    }

    pub fn apply_signal(&self, signal: ConsentSignal) {
        debug!("consent signal {signal}");
        self.lock_state().apply(signal);
    }

    /// Persisted settings for the configured project instance
    #[cfg(test)]
    fn settings(&self) -> PersistedSettings {
        let key = self.lock_state().settings_key();
        self.settings.get(&key)
    }

    /// Evaluate the consent gate for the current state
    pub fn consent(&self) -> ConsentDecision {
        let (inputs, key) = {
            let state = self.lock_state();
            (state.consent_inputs(), state.settings_key())
        };
        may_track(&inputs, &self.settings.get(&key))
    }

    /// Record the host's answer to the permission prompt.
    ///
    /// The answer holds for the rest of the process even if it could not be
    /// written to disk; the error is returned for logging.
    pub fn answer_prompt(&self, allow: bool) -> Result<PersistedSettings> {
        let key = self.lock_state().settings_key();
        info!(
            "Permission prompt answered: tracking {}",
            if allow { "allowed" } else { "declined" }
        );
        self.settings
            .update(&key, |settings| record_answer(settings, allow, Utc::now()))
    }

    /// Prompt text with its placeholders filled in
    pub fn permission_prompt(&self) -> String {
        let (template, key) = {
            let state = self.lock_state();
            (
                state.request_permission_prompt().to_string(),
                state.settings_key(),
            )
        };
        let example = self
            .last_payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let path = self.settings.path_for(&key).ok();
        render_prompt(&template, &example, path.as_deref())
    }

    /// Queue an event if consent allows it. With `dispatch_now`, a dispatch
    /// is triggered right after queueing.
    pub fn track_event(
        &self,
        slug: &str,
        name: &str,
        payload: serde_json::Value,
        dispatch_now: bool,
    ) -> TrackOutcome {
        *self
            .last_payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(payload.clone());

        let decision = self.consent();
        let outcome = match decision {
            ConsentDecision::Deny(reason) => TrackOutcome::Denied(reason),
            ConsentDecision::PromptRequired => TrackOutcome::PromptRequired,
            ConsentDecision::Allow => {
                let identity = self.lock_state().identity_for(slug);
                match self.queue.enqueue(identity, name, payload) {
                    EnqueueOutcome::Queued {
                        sequence_no,
                        evicted,
                    } => TrackOutcome::Queued {
                        sequence_no,
                        evicted,
                    },
                    EnqueueOutcome::TooLarge { .. } => TrackOutcome::Dropped,
                }
            }
        };
        debug!("track_event {:?} {:?}: {}", slug, name, decision);

        if dispatch_now && matches!(outcome, TrackOutcome::Queued { .. }) {
            if let Err(e) = self.dispatch_events() {
                warn!("Immediate dispatch failed: {e}");
            }
        }
        outcome
    }

    /// Claim every queued event and hand it to the background dispatcher.
    /// Returns the number of events claimed.
    ///
    /// Request metadata is read now; a user id missing from both the
    /// environment and the host is resolved in the background.
    pub fn dispatch_events(&self) -> Result<usize> {
        let events = self.queue.drain();
        if events.is_empty() {
            debug!("dispatch_events: queue empty");
            return Ok(0);
        }

        let count = events.len();
        let (user_id, invocation_id, project_key, key) = {
            let state = self.lock_state();
            (
                state.user_id().map(str::to_string),
                state.invocation_id().to_string(),
                state.project_key().to_string(),
                state.settings_key(),
            )
        };
        let settings = self.settings.clone();
        let (max_events, max_bytes) = (self.config.batch_max_events, self.config.batch_max_bytes);

        self.dispatcher.dispatch_with(move || {
            let meta = DispatchMetadata {
                user_id: user_id.unwrap_or_else(|| stored_user_id(&settings, &key)),
                invocation_id,
                project_key,
            };
            build_batches(events, &meta, max_events, max_bytes)
        })?;
        Ok(count)
    }

    /// Wait up to `timeout` for scheduled dispatches to finish
    pub fn flush(&self, timeout: Duration) -> bool {
        let done = self.dispatcher.flush(timeout);
        let stats = self.dispatcher.stats();
        debug!(
            "flush: {} event(s) sent, {} dropped, {} still queued",
            stats.events_sent,
            stats.events_dropped,
            self.pending()
        );
        done
    }

    /// Events waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// User id cached in settings, generated and saved on first use. The check
/// and the insert happen under the store's write lock, so concurrent first
/// dispatches agree on one id.
fn stored_user_id(settings: &SettingsStore, key: &SettingsKey) -> String {
    if let Some(user_id) = settings.get(key).user_id {
        return user_id;
    }

    let saved = settings.update(key, |s| {
        s.user_id.get_or_insert_with(|| {
            debug!("No user_id found, generating a new unique one");
            Uuid::new_v4().to_string()
        });
    });
    match saved {
        Ok(updated) => updated.user_id.unwrap_or_default(),
        Err(e) => {
            warn!("Could not save generated user_id: {e}");
            settings.get(key).user_id.unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::testing::RecordingSink;
    use serde_json::json;
    use std::time::Instant;
    use tempfile::TempDir;

    const FLUSH: Duration = Duration::from_secs(5);

    fn tracker_with(sink: Arc<RecordingSink>, dir: &TempDir) -> Tracker {
        let config = Config {
            settings_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let tracker = Tracker::with_sink(config, sink);
        tracker.update_state(|s| {
            s.set_project_slug("acme");
            s.set_instance_id("test");
            s.set_project_key("_foo_");
            s.set_version("1.0.0");
        });
        tracker
    }

    /// Tracker whose consent gate allows events
    fn allowed_tracker(sink: Arc<RecordingSink>, dir: &TempDir) -> Tracker {
        let tracker = tracker_with(sink, dir);
        tracker.answer_prompt(true).unwrap();
        tracker
    }

    #[test]
    fn test_ci_without_ci_tracking_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = allowed_tracker(sink.clone(), &dir);
        tracker.apply_signal(ConsentSignal::IsCi(true));
        tracker.apply_signal(ConsentSignal::CiTrackingEnabled(false));

        let outcome = tracker.track_event("acme", "command", json!({"version": "1.0"}), false);
        assert_eq!(
            outcome,
            TrackOutcome::Denied(DenyReason::CiTrackingDisabled)
        );
        assert_eq!(tracker.pending(), 0);

        assert_eq!(tracker.dispatch_events().unwrap(), 0);
        assert!(tracker.flush(FLUSH));
        assert_eq!(sink.request_count(), 0);
    }

    #[test]
    fn test_unanswered_prompt_is_fail_closed_until_answered() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = tracker_with(sink, &dir);

        assert_eq!(tracker.consent(), ConsentDecision::PromptRequired);
        assert_eq!(
            tracker.track_event("acme", "command", json!({}), false),
            TrackOutcome::PromptRequired
        );
        assert_eq!(tracker.pending(), 0);

        tracker.answer_prompt(true).unwrap();
        assert!(matches!(
            tracker.track_event("acme", "command", json!({}), false),
            TrackOutcome::Queued { .. }
        ));
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn test_persisted_opt_out_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let tracker = tracker_with(Arc::new(RecordingSink::default()), &dir);
            tracker.answer_prompt(false).unwrap();
        }

        let tracker = tracker_with(Arc::new(RecordingSink::default()), &dir);
        assert_eq!(tracker.consent(), ConsentDecision::Deny(DenyReason::OptedOut));
        assert_eq!(
            tracker.track_event("acme", "command", json!({}), false),
            TrackOutcome::Denied(DenyReason::OptedOut)
        );
        assert!(tracker.settings().prompt_answered);
    }

    #[test]
    fn test_allowed_events_sent_exactly_once() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = allowed_tracker(sink.clone(), &dir);

        let mut expected = Vec::new();
        for i in 0..25 {
            if let TrackOutcome::Queued { sequence_no, .. } =
                tracker.track_event("acme", "command", json!({ "i": i }), false)
            {
                expected.push(sequence_no);
            }
        }
        assert_eq!(tracker.dispatch_events().unwrap(), 25);
        // Second dispatch finds nothing left to claim
        assert_eq!(tracker.dispatch_events().unwrap(), 0);
        assert!(tracker.flush(FLUSH));

        assert_eq!(sink.sequences(), expected);
    }

    #[test]
    fn test_concurrent_dispatch_never_double_sends() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(allowed_tracker(sink.clone(), &dir));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.track_event("acme", "command", json!({}), false);
                        tracker.dispatch_events().unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        tracker.dispatch_events().unwrap();
        assert!(tracker.flush(FLUSH));

        let mut sequences = sink.sequences();
        sequences.sort_unstable();
        let total = sequences.len();
        sequences.dedup();
        assert_eq!(total, 200);
        assert_eq!(sequences.len(), 200);
    }

    #[test]
    fn test_dispatch_attaches_metadata_set_after_tracking() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = allowed_tracker(sink.clone(), &dir);

        tracker.track_event("acme", "command", json!({}), false);
        tracker.update_state(|s| {
            s.set_user_id("_user_id_");
            s.set_invocation_id("_invocation_id_");
        });
        tracker.dispatch_events().unwrap();
        assert!(tracker.flush(FLUSH));

        let batch = &sink.batches()[0];
        assert_eq!(batch.user_id, "_user_id_");
        assert_eq!(batch.invocation_id, "_invocation_id_");
        assert_eq!(batch.project_key, "_foo_");
        assert_eq!(batch.events[0].version, "1.0.0");
    }

    #[test]
    fn test_generated_user_id_is_persisted_and_reused() {
        let dir = TempDir::new().unwrap();
        let first_sink = Arc::new(RecordingSink::default());
        {
            let tracker = allowed_tracker(first_sink.clone(), &dir);
            tracker.track_event("acme", "command", json!({}), false);
            tracker.dispatch_events().unwrap();
            assert!(tracker.flush(FLUSH));
        }
        let first_user = first_sink.batches()[0].user_id.clone();
        assert!(!first_user.is_empty());

        let second_sink = Arc::new(RecordingSink::default());
        let tracker = tracker_with(second_sink.clone(), &dir);
        tracker.track_event("acme", "command", json!({}), false);
        tracker.dispatch_events().unwrap();
        assert!(tracker.flush(FLUSH));

        assert_eq!(second_sink.batches()[0].user_id, first_user);
    }

    #[test]
    fn test_concurrent_first_dispatches_share_one_user_id() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(allowed_tracker(sink.clone(), &dir));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    tracker.track_event("acme", "command", json!({}), false);
                    tracker.dispatch_events().unwrap();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert!(tracker.flush(FLUSH));

        let stored = tracker.settings().user_id.unwrap();
        let batches = sink.batches();
        assert!(!batches.is_empty());
        assert!(batches.iter().all(|b| b.user_id == stored));
    }

    #[test]
    fn test_dispatch_now_flag_sends_immediately() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = allowed_tracker(sink.clone(), &dir);

        tracker.track_event("acme", "command", json!({}), true);
        assert_eq!(tracker.pending(), 0);
        assert!(tracker.flush(FLUSH));
        assert_eq!(sink.sequences().len(), 1);
    }

    #[test]
    fn test_dispatch_does_not_block_on_slow_sink() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_secs(3)));
        let tracker = allowed_tracker(sink, &dir);
        tracker.track_event("acme", "command", json!({}), false);

        let start = Instant::now();
        assert_eq!(tracker.dispatch_events().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_queue_cap_enforced() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            settings_dir: Some(dir.path().to_path_buf()),
            queue_max_events: 3,
            ..Config::default()
        };
        let tracker = Tracker::with_sink(config, Arc::new(RecordingSink::default()));
        tracker.answer_prompt(true).unwrap();

        for _ in 0..10 {
            tracker.track_event("acme", "command", json!({}), false);
            assert!(tracker.pending() <= 3);
        }
        assert_eq!(tracker.pending(), 3);
    }

    #[test]
    fn test_noninteractive_tracking_allows_without_prompt() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_with(Arc::new(RecordingSink::default()), &dir);
        tracker.apply_signal(ConsentSignal::Noninteractive {
            is_noninteractive: true,
            tracking_enabled: true,
        });
        assert_eq!(tracker.consent(), ConsentDecision::Allow);
        assert!(!tracker.settings().prompt_answered);
    }

    #[test]
    fn test_permission_prompt_uses_last_payload_and_path() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_with(Arc::new(RecordingSink::default()), &dir);
        tracker.track_event("acme", "command", json!({"version": "1.0"}), false);

        let text = tracker.permission_prompt();
        assert!(text.contains("\"version\": \"1.0\""));
        assert!(text.contains("acme_cls_test"));

        tracker.update_state(|s| s.set_request_permission_prompt("_prompt_"));
        assert_eq!(tracker.permission_prompt(), "_prompt_");
    }

    #[test]
    fn test_empty_slug_uses_project_slug() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let tracker = allowed_tracker(sink.clone(), &dir);

        tracker.track_event("", "command", json!({}), false);
        tracker.dispatch_events().unwrap();
        assert!(tracker.flush(FLUSH));
        assert_eq!(sink.batches()[0].slug, "acme");
    }
}
