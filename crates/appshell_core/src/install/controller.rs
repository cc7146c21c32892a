//! Install lifecycle controller wiring the state machine to durable storage
//! and the platform's deferred prompt.
//!
//! # Responsibility
//! - Capture the platform prompt when installability is signalled outside
//!   the suppression window.
//! - Persist the dismissal anchor and push every state change to listeners.
//!
//! # Invariants
//! - In-memory state starts at `Unavailable` on every construction; only the
//!   dismissal anchor survives restarts.
//! - The captured prompt is presented at most once.
//! - The controller never surfaces errors; unmatched calls are no-ops and an
//!   invalid prompt config falls back to the defaults for the bad fields.
//! - Transitions are versioned under the dispatch lock and delivered after it
//!   is released, so a listener may drive the controller from its callback.

use super::lifecycle::{
    InstallEvent, InstallLifecycle, InstallOutcome, InstallState, SuppressionPolicy, Transition,
};
use super::storage::{DismissalStore, KeyValueStore};
use crate::clock::{Clock, EpochMs};
use crate::config::InstallPromptConfig;
use crate::observe::{lock_unpoisoned, ListenerRegistry, Subscription};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

/// Platform-provided capability that opens the native install dialog.
///
/// The user's decision arrives later through
/// [`InstallController::resolve_user_choice`].
pub trait DeferredPrompt: Send {
    fn present(&mut self);
}

/// How the app is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Browser,
    /// Launched as an installed app; no prompt is ever offered.
    Standalone,
}

struct ControllerState {
    lifecycle: InstallLifecycle,
    prompt: Option<Box<dyn DeferredPrompt>>,
    version: u64,
}

pub struct InstallController {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    clock: Arc<dyn Clock>,
    display_mode: DisplayMode,
    state: Mutex<ControllerState>,
    dispatch: Mutex<()>,
    listeners: ListenerRegistry<InstallState>,
}

impl InstallController {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: &InstallPromptConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = match config.validate() {
            Ok(()) => config.clone(),
            Err(err) => {
                warn!(
                    "event=install_config module=install status=error error={} fallback=default",
                    err
                );
                config.sanitized()
            }
        };

        Self {
            store,
            storage_key: config.storage_key,
            clock,
            display_mode: DisplayMode::Browser,
            state: Mutex::new(ControllerState {
                lifecycle: InstallLifecycle::new(SuppressionPolicy::new(
                    config.suppression_window_ms,
                )),
                prompt: None,
                version: 1,
            }),
            dispatch: Mutex::new(()),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn with_display_mode(mut self, display_mode: DisplayMode) -> Self {
        self.display_mode = display_mode;
        self
    }

    pub fn state(&self) -> InstallState {
        lock_unpoisoned(&self.state).lifecycle.state()
    }

    /// Whether the UI should offer the install affordance.
    pub fn can_present(&self) -> bool {
        let state = lock_unpoisoned(&self.state);
        state.lifecycle.state() == InstallState::Available && state.prompt.is_some()
    }

    /// True when running standalone or after the user accepted this session.
    pub fn is_installed(&self) -> bool {
        self.display_mode == DisplayMode::Standalone || self.state() == InstallState::Accepted
    }

    pub fn last_dismissed_at(&self) -> Option<EpochMs> {
        self.dismissals().load()
    }

    /// Offers the platform prompt. Returns whether it was captured.
    ///
    /// Inside the suppression window the prompt is dropped and the state
    /// stays `Unavailable`.
    pub fn on_installability_signalled(&self, prompt: Box<dyn DeferredPrompt>) -> bool {
        if self.display_mode == DisplayMode::Standalone {
            debug!("event=install_signal module=install status=ignored reason=standalone");
            return false;
        }

        let last_dismissed = self.dismissals().load();
        let now = self.clock.now_ms();

        let (transition, published) = {
            let _dispatch = lock_unpoisoned(&self.dispatch);
            let mut state = lock_unpoisoned(&self.state);
            let transition = state.lifecycle.apply(
                InstallEvent::InstallabilitySignalled,
                last_dismissed,
                now,
            );
            if matches!(transition, Transition::Moved { .. } | Transition::Recaptured) {
                state.prompt = Some(prompt);
            }
            (transition, self.bump(&mut state, transition))
        };

        match transition {
            Transition::Suppressed => info!(
                "event=install_signal module=install status=suppressed dismissed_ago_ms={}",
                last_dismissed.map_or(0, |at| now.saturating_sub(at))
            ),
            Transition::Ignored => self.log_ignored(InstallEvent::InstallabilitySignalled),
            Transition::Moved { .. } | Transition::Recaptured => {
                info!("event=install_signal module=install status=ok")
            }
        }
        self.broadcast(published);

        matches!(transition, Transition::Moved { .. } | Transition::Recaptured)
    }

    /// Presents the captured prompt once. Returns whether it was presented;
    /// outside `Available` this is a silent no-op.
    pub fn present(&self) -> bool {
        let now = self.clock.now_ms();
        let (mut prompt, published) = {
            let _dispatch = lock_unpoisoned(&self.dispatch);
            let mut state = lock_unpoisoned(&self.state);
            if state.prompt.is_none() {
                drop(state);
                self.log_ignored(InstallEvent::Presented);
                return false;
            }
            let transition = state.lifecycle.apply(InstallEvent::Presented, None, now);
            if !transition.changed() {
                drop(state);
                self.log_ignored(InstallEvent::Presented);
                return false;
            }
            (state.prompt.take(), self.bump(&mut state, transition))
        };

        if let Some(prompt) = prompt.as_mut() {
            prompt.present();
        }
        info!("event=install_present module=install status=ok");
        self.broadcast(published);
        true
    }

    /// Records the user's decision for the shown prompt.
    pub fn resolve_user_choice(&self, outcome: InstallOutcome) {
        let now = self.clock.now_ms();

        let published = {
            let _dispatch = lock_unpoisoned(&self.dispatch);
            let published = {
                let mut state = lock_unpoisoned(&self.state);
                let transition = state
                    .lifecycle
                    .apply(InstallEvent::UserChoice(outcome), None, now);
                if !transition.changed() {
                    drop(state);
                    self.log_ignored(InstallEvent::UserChoice(outcome));
                    return;
                }
                self.bump(&mut state, transition)
            };

            // The anchor is stored before any listener hears of the choice.
            let dismissals = self.dismissals();
            match outcome {
                InstallOutcome::Accepted => dismissals.clear(),
                InstallOutcome::Dismissed => dismissals.record(now),
            }
            published
        };

        info!(
            "event=install_choice module=install status=ok outcome={}",
            outcome.as_str()
        );
        self.broadcast(published);
    }

    /// Registers `listener` for state changes; it first receives the current
    /// state.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(InstallState) + Send + Sync + 'static,
    {
        let (handle, subscription) = self
            .listeners
            .register(move |state: &InstallState| listener(*state));

        let (version, current) = {
            let state = lock_unpoisoned(&self.state);
            (state.version, state.lifecycle.state())
        };
        handle.deliver(version, &current);
        subscription
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn dismissals(&self) -> DismissalStore<'_> {
        DismissalStore::new(self.store.as_ref(), &self.storage_key)
    }

    /// Advances the version for a state change and queues it for listeners.
    /// Callers hold the dispatch lock.
    fn bump(
        &self,
        state: &mut ControllerState,
        transition: Transition,
    ) -> Option<(u64, InstallState)> {
        let Transition::Moved { to, .. } = transition else {
            return None;
        };
        state.version += 1;
        self.listeners.stage(state.version, to);
        Some((state.version, to))
    }

    fn broadcast(&self, published: Option<(u64, InstallState)>) {
        if let Some((version, state)) = published {
            let delivered = self.listeners.flush();
            debug!(
                "event=install_publish module=install status=ok version={} state={} listeners={}",
                version, state, delivered
            );
        }
    }

    fn log_ignored(&self, event: InstallEvent) {
        debug!(
            "event=install_transition module=install status=ignored trigger={} state={}",
            event.as_str(),
            self.state()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredPrompt, DisplayMode, InstallController};
    use crate::clock::ManualClock;
    use crate::config::InstallPromptConfig;
    use crate::install::lifecycle::{InstallOutcome, InstallState};
    use crate::install::storage::MemoryKeyValueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct CountingPrompt(Arc<AtomicUsize>);

    impl DeferredPrompt for CountingPrompt {
        fn present(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> InstallController {
        InstallController::new(
            Arc::new(MemoryKeyValueStore::new()),
            &InstallPromptConfig::default(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )
    }

    #[test]
    fn prompt_is_presented_exactly_once() {
        let presented = Arc::new(AtomicUsize::new(0));
        let controller = controller();
        assert!(controller.on_installability_signalled(Box::new(CountingPrompt(Arc::clone(
            &presented
        )))));
        assert!(controller.can_present());

        assert!(controller.present());
        assert!(!controller.present());
        assert_eq!(presented.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), InstallState::Shown);
    }

    #[test]
    fn present_without_capture_is_a_no_op() {
        let controller = controller();
        assert!(!controller.present());
        assert_eq!(controller.state(), InstallState::Unavailable);
    }

    #[test]
    fn standalone_mode_ignores_signals() {
        let presented = Arc::new(AtomicUsize::new(0));
        let controller = controller().with_display_mode(DisplayMode::Standalone);
        assert!(controller.is_installed());
        assert!(!controller.on_installability_signalled(Box::new(CountingPrompt(presented))));
        assert_eq!(controller.state(), InstallState::Unavailable);
    }

    #[test]
    fn subscribers_see_current_then_each_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let controller = controller();
        let sink = Arc::clone(&seen);
        let _subscription = controller.subscribe(move |state| sink.lock().unwrap().push(state));

        controller.on_installability_signalled(Box::new(CountingPrompt(Arc::default())));
        controller.present();
        controller.resolve_user_choice(InstallOutcome::Accepted);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                InstallState::Unavailable,
                InstallState::Available,
                InstallState::Shown,
                InstallState::Accepted
            ]
        );
        assert!(controller.is_installed());
    }
}
