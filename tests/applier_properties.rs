//! Property tests for the progress applier: monotonic percentage under
//! arbitrary delivery order, and idempotent terminal handling.

use proptest::prelude::*;
use serde_json::Value;

use tasksync::applier::{apply, Effect, NotificationLevel, UiState};
use tasksync::{Task, TaskStatus};

// ─── Arbitrary Strategies ───────────────────────────────────────────────────

fn arb_active_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(vec![TaskStatus::Pending, TaskStatus::Running])
}

fn arb_terminal_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(vec![
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ])
}

fn arb_snapshot(status: impl Strategy<Value = TaskStatus>) -> impl Strategy<Value = Task> {
    (status, 0.0f64..=100.0, "[a-z ]{0,20}", 0u64..1_000).prop_map(|(status, pct, msg, current)| {
        let mut task = Task::new("T1", status).with_progress(pct, msg);
        task.progress.current = current;
        task
    })
}

fn notifications(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Notify(_)))
        .count()
}

proptest! {
    #[test]
    fn displayed_percentage_is_running_max(
        snapshots in prop::collection::vec(arb_snapshot(arb_active_status()), 1..40)
    ) {
        let mut ui = UiState::tracking("T1");
        let mut max_seen = 0.0f64;
        for snapshot in &snapshots {
            ui = apply(&ui, snapshot, Some("T1")).state;
            max_seen = max_seen.max(snapshot.progress.percentage);
            prop_assert_eq!(ui.percentage, max_seen);
        }
    }

    #[test]
    fn current_count_never_decreases(
        snapshots in prop::collection::vec(arb_snapshot(arb_active_status()), 1..40)
    ) {
        let mut ui = UiState::tracking("T1");
        for snapshot in &snapshots {
            let next = apply(&ui, snapshot, Some("T1")).state;
            prop_assert!(next.current >= ui.current);
            ui = next;
        }
    }

    #[test]
    fn percentage_stays_in_range(pct in -1.0e6f64..1.0e6) {
        let snapshot = Task::new("T1", TaskStatus::Running).with_progress(pct, "");
        let ui = apply(&UiState::tracking("T1"), &snapshot, Some("T1")).state;
        prop_assert!((0.0..=100.0).contains(&ui.percentage));
    }

    #[test]
    fn terminal_snapshot_applies_at_most_once(
        prefix in prop::collection::vec(arb_snapshot(arb_active_status()), 0..10),
        terminal in arb_snapshot(arb_terminal_status()),
    ) {
        let mut ui = UiState::tracking("T1");
        for snapshot in &prefix {
            ui = apply(&ui, snapshot, Some("T1")).state;
        }

        let first = apply(&ui, &terminal, Some("T1"));
        prop_assert!(first.is_terminal());
        prop_assert_eq!(notifications(&first.effects), 1);
        prop_assert!(!first.state.visible);

        // The first application cleared the identity store.
        let second = apply(&first.state, &terminal, None);
        prop_assert!(second.is_noop());
        prop_assert_eq!(&second.state, &first.state);
    }

    #[test]
    fn snapshots_after_terminal_are_ignored(
        later in prop::collection::vec(arb_snapshot(Just(TaskStatus::Running)), 1..10)
    ) {
        let done = apply(&UiState::tracking("T1"), &Task::new("T1", TaskStatus::Completed), Some("T1"));
        let mut ui = done.state.clone();
        for snapshot in &later {
            let step = apply(&ui, snapshot, None);
            prop_assert!(step.is_noop());
            ui = step.state;
        }
        prop_assert_eq!(ui, done.state);
    }
}

#[test]
fn completed_without_result_renders_null() {
    let step = apply(
        &UiState::tracking("T1"),
        &Task::new("T1", TaskStatus::Completed),
        Some("T1"),
    );
    assert!(step.effects.contains(&Effect::RenderResult(Value::Null)));
    assert_eq!(step.state.percentage, 100.0);
}

#[test]
fn cancelled_notifies_info() {
    let step = apply(
        &UiState::tracking("T1"),
        &Task::new("T1", TaskStatus::Cancelled),
        Some("T1"),
    );
    let levels: Vec<_> = step
        .effects
        .iter()
        .filter_map(|e| match e {
            Effect::Notify(n) => Some(n.level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![NotificationLevel::Info]);
}
