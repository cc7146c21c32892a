use appshell_core::config::DEFAULT_INSTALL_DISMISSED_KEY;
use appshell_core::install::MemoryKeyValueStore;
use appshell_core::{
    DeferredPrompt, InstallController, InstallOutcome, InstallPromptConfig, InstallState,
    KeyValueStore, ManualClock, SqliteKeyValueStore, DAY_MS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const T: i64 = 1_700_000_000_000;

#[derive(Default)]
struct FakePrompt {
    presented: Arc<AtomicUsize>,
}

impl DeferredPrompt for FakePrompt {
    fn present(&mut self) {
        self.presented.fetch_add(1, Ordering::SeqCst);
    }
}

fn load(store: &Arc<dyn KeyValueStore>, clock: &Arc<ManualClock>) -> InstallController {
    InstallController::new(
        Arc::clone(store),
        &InstallPromptConfig::default(),
        clock.clone(),
    )
}

fn dismiss(controller: &InstallController) {
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
    assert!(controller.present());
    controller.resolve_user_choice(InstallOutcome::Dismissed);
    assert_eq!(controller.state(), InstallState::Dismissed);
}

#[test]
fn dismissal_three_days_old_suppresses_eight_days_old_allows() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));

    store
        .set(DEFAULT_INSTALL_DISMISSED_KEY, &(T - 3 * DAY_MS).to_string())
        .unwrap();
    let controller = load(&store, &clock);
    assert!(!controller.on_installability_signalled(Box::new(FakePrompt::default())));
    assert_eq!(controller.state(), InstallState::Unavailable);

    store
        .set(DEFAULT_INSTALL_DISMISSED_KEY, &(T - 8 * DAY_MS).to_string())
        .unwrap();
    let controller = load(&store, &clock);
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
    assert_eq!(controller.state(), InstallState::Available);
}

#[test]
fn absent_dismissal_allows_prompt() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let controller = load(&store, &clock);

    assert_eq!(controller.last_dismissed_at(), None);
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
    assert!(controller.can_present());
}

#[test]
fn dismiss_then_reload_at_five_and_eight_days() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client_state.db");
    let clock = Arc::new(ManualClock::new(T));

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
        let controller = load(&store, &clock);
        dismiss(&controller);
        assert_eq!(controller.last_dismissed_at(), Some(T));
    }

    clock.set(T + 5 * DAY_MS);
    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
        let controller = load(&store, &clock);
        assert_eq!(controller.state(), InstallState::Unavailable);
        assert!(!controller.on_installability_signalled(Box::new(FakePrompt::default())));
        assert_eq!(controller.state(), InstallState::Unavailable);
        assert!(!controller.present());
    }

    clock.set(T + 8 * DAY_MS);
    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(&path).unwrap());
        let controller = load(&store, &clock);
        assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
        assert_eq!(controller.state(), InstallState::Available);
    }
}

#[test]
fn accepting_clears_the_dismissal_record() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    dismiss(&load(&store, &clock));

    clock.advance_days(8);
    let controller = load(&store, &clock);
    let prompt = FakePrompt::default();
    let presented = Arc::clone(&prompt.presented);
    assert!(controller.on_installability_signalled(Box::new(prompt)));
    assert!(controller.present());
    controller.resolve_user_choice(InstallOutcome::Accepted);

    assert_eq!(presented.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), InstallState::Accepted);
    assert!(controller.is_installed());
    assert_eq!(store.get(DEFAULT_INSTALL_DISMISSED_KEY).unwrap(), None);

    // Accepted behaves like never dismissed on the next load.
    let controller = load(&store, &clock);
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
}

#[test]
fn choice_before_prompt_is_shown_is_ignored() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let controller = load(&store, &clock);

    controller.resolve_user_choice(InstallOutcome::Dismissed);
    assert_eq!(controller.state(), InstallState::Unavailable);

    controller.on_installability_signalled(Box::new(FakePrompt::default()));
    controller.resolve_user_choice(InstallOutcome::Dismissed);
    assert_eq!(controller.state(), InstallState::Available);
    assert_eq!(controller.last_dismissed_at(), None);
}

#[test]
fn terminal_state_holds_until_next_load() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let controller = load(&store, &clock);
    dismiss(&controller);

    clock.advance_days(30);
    assert!(!controller.on_installability_signalled(Box::new(FakePrompt::default())));
    assert_eq!(controller.state(), InstallState::Dismissed);
}

#[test]
fn unparsable_stored_value_counts_as_never_dismissed() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    store
        .set(DEFAULT_INSTALL_DISMISSED_KEY, "not-a-timestamp")
        .unwrap();
    let clock = Arc::new(ManualClock::new(T));

    let controller = load(&store, &clock);
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
}

#[test]
fn custom_window_and_key_are_honored() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let config = InstallPromptConfig {
        storage_key: "install-snooze".to_string(),
        suppression_window_ms: DAY_MS,
    };
    config.validate().unwrap();

    let controller = InstallController::new(Arc::clone(&store), &config, clock.clone());
    dismiss(&controller);
    assert_eq!(
        store.get("install-snooze").unwrap().as_deref(),
        Some(T.to_string().as_str())
    );

    clock.advance_days(2);
    let controller = InstallController::new(Arc::clone(&store), &config, clock.clone());
    assert!(controller.on_installability_signalled(Box::new(FakePrompt::default())));
}

#[test]
fn listeners_observe_transitions_in_order() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let controller = load(&store, &clock);

    let seen: Arc<Mutex<Vec<InstallState>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let subscription = controller.subscribe(move |state| sink.lock().unwrap().push(state));

    dismiss(&controller);
    subscription.unsubscribe();
    assert_eq!(controller.listener_count(), 0);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            InstallState::Unavailable,
            InstallState::Available,
            InstallState::Shown,
            InstallState::Dismissed
        ]
    );
}

#[test]
fn non_positive_window_falls_back_to_seven_days() {
    for window in [0, -5] {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        store
            .set(DEFAULT_INSTALL_DISMISSED_KEY, &(T - 3 * DAY_MS).to_string())
            .unwrap();
        let clock = Arc::new(ManualClock::new(T));
        let config = InstallPromptConfig {
            suppression_window_ms: window,
            ..InstallPromptConfig::default()
        };

        let controller = InstallController::new(Arc::clone(&store), &config, clock);
        assert!(
            !controller.on_installability_signalled(Box::new(FakePrompt::default())),
            "window {window} must not disable suppression"
        );
        assert_eq!(controller.state(), InstallState::Unavailable);
    }
}

#[test]
fn blank_storage_key_uses_default_key() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let config = InstallPromptConfig {
        storage_key: String::new(),
        ..InstallPromptConfig::default()
    };

    dismiss(&InstallController::new(Arc::clone(&store), &config, clock));
    assert_eq!(
        store.get(DEFAULT_INSTALL_DISMISSED_KEY).unwrap().as_deref(),
        Some(T.to_string().as_str())
    );
}

#[test]
fn listener_can_present_as_soon_as_prompt_is_available() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    let clock = Arc::new(ManualClock::new(T));
    let controller = Arc::new(load(&store, &clock));

    let seen: Arc<Mutex<Vec<InstallState>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let weak = Arc::downgrade(&controller);
    let _subscription = controller.subscribe(move |state| {
        sink.lock().unwrap().push(state);
        if state == InstallState::Available {
            if let Some(controller) = weak.upgrade() {
                assert!(controller.present());
            }
        }
    });

    let prompt = FakePrompt::default();
    let presented = Arc::clone(&prompt.presented);
    assert!(controller.on_installability_signalled(Box::new(prompt)));

    assert_eq!(presented.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), InstallState::Shown);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            InstallState::Unavailable,
            InstallState::Available,
            InstallState::Shown
        ]
    );
}
