use chrono::{DateTime, Utc};
use uuid::Uuid;

use trace_core::safety::{
    self, CrisisSnapshot, MarkOutcome, MessageVerdict, SafeMessageOutcome, WindowEvaluation,
};

use super::store::CrisisStore;

/// Flag a user as in crisis right now.
///
/// Fail-open: a storage failure is logged and reported as
/// `persisted: false`, never raised. Crisis tracking must not be able to
/// block a chat response.
pub async fn mark_in_crisis<S: CrisisStore>(
    store: &S,
    user_id: Uuid,
    source: Option<&str>,
    tag: Option<&str>,
    now: DateTime<Utc>,
) -> MarkOutcome {
    let source = source.unwrap_or(safety::DEFAULT_CRISIS_SOURCE);
    let tag = tag.unwrap_or(safety::DEFAULT_CRISIS_TAG);

    match store.flag(user_id, source, tag, now).await {
        Ok(()) => MarkOutcome { persisted: true },
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "failed to persist crisis flag");
            MarkOutcome { persisted: false }
        }
    }
}

/// Whether the user is inside the crisis window right now. Missing rows,
/// cleared flags, and storage failures all read as "not in crisis"; this
/// gates follow-up messaging, not the primary safety response.
pub async fn is_in_crisis_window<S: CrisisStore>(
    store: &S,
    user_id: Uuid,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> bool {
    let row = match store.fetch(user_id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "crisis state read failed, treating as not in crisis");
            return false;
        }
    };

    let Some(row) = row else {
        return false;
    };
    let Some(flagged_at) = row.last_crisis_at else {
        return false;
    };

    WindowEvaluation::from_flagged_at(flagged_at, row.safe_messages_since, window_minutes, now)
        .active
}

/// Full crisis state for a user. Idempotent between writes; degrades to the
/// all-default inactive snapshot when the store is unreachable.
pub async fn get_crisis_state<S: CrisisStore>(
    store: &S,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> CrisisSnapshot {
    let row = match store.fetch(user_id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "crisis state read failed, returning inactive state");
            return CrisisSnapshot::inactive();
        }
    };

    let Some(row) = row else {
        return CrisisSnapshot::inactive();
    };
    // A stale counter with no flag means the user already exited;
    // last_crisis_at alone decides whether tracking is active.
    let Some(flagged_at) = row.last_crisis_at else {
        return CrisisSnapshot::inactive();
    };

    let eval = WindowEvaluation::from_flagged_at(
        flagged_at,
        row.safe_messages_since,
        safety::CRISIS_WINDOW_MINUTES,
        now,
    );

    CrisisSnapshot {
        active: eval.active,
        last_crisis_at: Some(flagged_at),
        last_crisis_tag: Some(row.last_crisis_tag),
        last_crisis_source: Some(row.last_crisis_source),
        safe_messages_since: row.safe_messages_since,
        pending_exit_check_in: eval.pending_exit_check_in,
    }
}

/// Per-message state machine, driven by the upstream classifier's verdict.
///
/// A distressed message (re)opens the window regardless of prior state. A
/// safe message advances the counter, exits when the early-exit conditions
/// are met, or does nothing when the user is untracked or the window has
/// already lapsed.
pub async fn update_after_message<S: CrisisStore>(
    store: &S,
    user_id: Uuid,
    distressed: bool,
    now: DateTime<Utc>,
) -> MessageVerdict {
    if distressed {
        mark_in_crisis(
            store,
            user_id,
            Some(safety::DEFAULT_CRISIS_SOURCE),
            Some(safety::CHAT_DISTRESS_TAG),
            now,
        )
        .await;
        return MessageVerdict::flagged();
    }

    let row = match store.fetch(user_id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "crisis state read failed, treating message as untracked");
            return MessageVerdict::inactive();
        }
    };

    let (flagged_at, stored_count) = match row {
        Some(row) => (row.last_crisis_at, row.safe_messages_since),
        None => (None, 0),
    };

    match safety::advance_after_safe_message(flagged_at, stored_count, now) {
        SafeMessageOutcome::NotTracked | SafeMessageOutcome::WindowExpired => {
            MessageVerdict::inactive()
        }
        SafeMessageOutcome::Exited => {
            if let Err(err) = store.clear(user_id, now).await {
                tracing::warn!(%user_id, error = %err, "failed to clear crisis flag on exit");
            }
            MessageVerdict::inactive()
        }
        SafeMessageOutcome::StillActive {
            safe_messages_since,
            pending_exit_check_in,
        } => {
            if let Err(err) = store.record_safe_message(user_id, safe_messages_since, now).await {
                tracing::warn!(%user_id, error = %err, "failed to persist safe-message counter");
            }
            MessageVerdict {
                active: true,
                safe_messages_since,
                pending_exit_check_in,
            }
        }
    }
}
