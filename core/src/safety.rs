use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum time since the last flagged message during which a user is still
/// considered inside the crisis window, absent an earlier exit.
pub const CRISIS_WINDOW_MINUTES: i64 = 90;

/// Consecutive non-distressed messages required to exit crisis mode early.
pub const SAFE_MESSAGES_TO_EXIT: i32 = 4;

/// Minimum elapsed time since flagging before an early exit is allowed,
/// even if the safe-message count is reached sooner.
pub const MIN_MINUTES_TO_EXIT: i64 = 30;

/// Safe-message count at which the caller should proactively check in,
/// one message before the hard exit. Intentionally the literal 3, not
/// derived from `SAFE_MESSAGES_TO_EXIT`.
pub const EXIT_CHECK_IN_AFTER: i32 = 3;

pub const DEFAULT_CRISIS_SOURCE: &str = "chat";
pub const DEFAULT_CRISIS_TAG: &str = "distress";

/// Tag recorded when a distressed message refreshes the window mid-chat.
pub const CHAT_DISTRESS_TAG: &str = "high-distress";

/// Result of evaluating a flagged user's window against the clock.
/// Expiry is computed lazily from the stored timestamp; no timer runs
/// anywhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEvaluation {
    pub active: bool,
    /// The user is on the cusp of exiting; the caller may want to check in
    /// rather than wait for the final safe message.
    pub pending_exit_check_in: bool,
}

impl WindowEvaluation {
    pub const INACTIVE: Self = Self {
        active: false,
        pending_exit_check_in: false,
    };

    /// Evaluate a window from the stored flag time and safe-message counter.
    /// `now` earlier than `flagged_at` (clock skew) counts as zero elapsed.
    pub fn from_flagged_at(
        flagged_at: DateTime<Utc>,
        safe_messages_since: i32,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let since = now
            .signed_duration_since(flagged_at)
            .max(Duration::zero());

        if since > Duration::minutes(window_minutes) {
            return Self::INACTIVE;
        }

        let cooled_down = since >= Duration::minutes(MIN_MINUTES_TO_EXIT);
        if safe_messages_since >= SAFE_MESSAGES_TO_EXIT && cooled_down {
            return Self::INACTIVE;
        }

        Self {
            active: true,
            pending_exit_check_in: safe_messages_since >= EXIT_CHECK_IN_AFTER && cooled_down,
        }
    }
}

/// Transition for one non-distressed message from a user, computed from the
/// stored row. The caller persists whatever the outcome requires: nothing
/// for `NotTracked`/`WindowExpired`, a cleared row for `Exited`, the new
/// counter for `StillActive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeMessageOutcome {
    /// No crisis flag is set for this user.
    NotTracked,
    /// The window lapsed on its own. Time-based expiry takes precedence
    /// over counting, so the stored counter is not advanced.
    WindowExpired,
    /// This message completes the early exit.
    Exited,
    /// Still inside the window with an incremented counter.
    StillActive {
        safe_messages_since: i32,
        pending_exit_check_in: bool,
    },
}

pub fn advance_after_safe_message(
    flagged_at: Option<DateTime<Utc>>,
    stored_safe_count: i32,
    now: DateTime<Utc>,
) -> SafeMessageOutcome {
    let Some(flagged_at) = flagged_at else {
        return SafeMessageOutcome::NotTracked;
    };

    let since = now
        .signed_duration_since(flagged_at)
        .max(Duration::zero());

    if since > Duration::minutes(CRISIS_WINDOW_MINUTES) {
        return SafeMessageOutcome::WindowExpired;
    }

    let next_count = stored_safe_count + 1;
    let cooled_down = since >= Duration::minutes(MIN_MINUTES_TO_EXIT);

    if next_count >= SAFE_MESSAGES_TO_EXIT && cooled_down {
        return SafeMessageOutcome::Exited;
    }

    SafeMessageOutcome::StillActive {
        safe_messages_since: next_count,
        pending_exit_check_in: next_count >= EXIT_CHECK_IN_AFTER && cooled_down,
    }
}

/// Full per-user crisis state as returned to the chat handler.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CrisisSnapshot {
    /// Whether the user is currently inside the crisis follow-up window
    pub active: bool,
    /// When the most recent high-distress message was recorded
    pub last_crisis_at: Option<DateTime<Utc>>,
    /// Classification label for the flag (e.g. "high-distress")
    pub last_crisis_tag: Option<String>,
    /// Where the distress was detected (e.g. "chat", "journal")
    pub last_crisis_source: Option<String>,
    /// Consecutive safe messages since the flag
    pub safe_messages_since: i32,
    /// One-message-early signal that the user is close to exiting
    pub pending_exit_check_in: bool,
}

impl CrisisSnapshot {
    /// The all-default state: no crisis history, nothing pending. Also the
    /// fail-open value when the store is unreachable.
    pub fn inactive() -> Self {
        Self {
            active: false,
            last_crisis_at: None,
            last_crisis_tag: None,
            last_crisis_source: None,
            safe_messages_since: 0,
            pending_exit_check_in: false,
        }
    }
}

/// Verdict for one processed message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageVerdict {
    pub active: bool,
    pub safe_messages_since: i32,
    pub pending_exit_check_in: bool,
}

impl MessageVerdict {
    pub fn inactive() -> Self {
        Self {
            active: false,
            safe_messages_since: 0,
            pending_exit_check_in: false,
        }
    }

    /// Verdict right after a distressed message: window open, counter reset.
    pub fn flagged() -> Self {
        Self {
            active: true,
            safe_messages_since: 0,
            pending_exit_check_in: false,
        }
    }
}

/// Outcome of a crisis-flag write. Fail-open: a failed write is reported
/// here and logged, never raised into the caller's message flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MarkOutcome {
    pub persisted: bool,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        CRISIS_WINDOW_MINUTES, MIN_MINUTES_TO_EXIT, SAFE_MESSAGES_TO_EXIT, SafeMessageOutcome,
        WindowEvaluation, advance_after_safe_message,
    };

    #[test]
    fn window_is_active_immediately_after_flagging() {
        let now = Utc::now();

        let eval = WindowEvaluation::from_flagged_at(now, 0, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
        assert!(!eval.pending_exit_check_in);
    }

    #[test]
    fn window_expires_after_the_window_elapses() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(CRISIS_WINDOW_MINUTES + 5);

        let eval = WindowEvaluation::from_flagged_at(flagged, 0, CRISIS_WINDOW_MINUTES, now);
        assert_eq!(eval, WindowEvaluation::INACTIVE);
    }

    #[test]
    fn window_survives_until_exactly_the_window_boundary() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(CRISIS_WINDOW_MINUTES);

        let eval = WindowEvaluation::from_flagged_at(flagged, 0, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
    }

    #[test]
    fn enough_safe_messages_exit_only_after_the_cooldown() {
        let now = Utc::now();

        let early = now - Duration::minutes(MIN_MINUTES_TO_EXIT - 1);
        let eval =
            WindowEvaluation::from_flagged_at(early, SAFE_MESSAGES_TO_EXIT, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);

        let cooled = now - Duration::minutes(MIN_MINUTES_TO_EXIT);
        let eval =
            WindowEvaluation::from_flagged_at(cooled, SAFE_MESSAGES_TO_EXIT, CRISIS_WINDOW_MINUTES, now);
        assert!(!eval.active);
    }

    #[test]
    fn pending_check_in_fires_one_message_before_exit() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(MIN_MINUTES_TO_EXIT + 1);

        let eval = WindowEvaluation::from_flagged_at(flagged, 3, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
        assert!(eval.pending_exit_check_in);

        // Two safe messages is not yet on the cusp
        let eval = WindowEvaluation::from_flagged_at(flagged, 2, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
        assert!(!eval.pending_exit_check_in);
    }

    #[test]
    fn pending_check_in_requires_the_cooldown() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(MIN_MINUTES_TO_EXIT - 5);

        let eval = WindowEvaluation::from_flagged_at(flagged, 3, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
        assert!(!eval.pending_exit_check_in);
    }

    #[test]
    fn clock_skew_counts_as_zero_elapsed() {
        let now = Utc::now();
        let flagged = now + Duration::minutes(10);

        let eval = WindowEvaluation::from_flagged_at(flagged, 0, CRISIS_WINDOW_MINUTES, now);
        assert!(eval.active);
    }

    #[test]
    fn safe_message_without_a_flag_is_not_tracked() {
        let now = Utc::now();
        assert_eq!(
            advance_after_safe_message(None, 0, now),
            SafeMessageOutcome::NotTracked
        );
    }

    #[test]
    fn safe_message_after_the_window_expires_it() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(CRISIS_WINDOW_MINUTES + 1);

        assert_eq!(
            advance_after_safe_message(Some(flagged), 2, now),
            SafeMessageOutcome::WindowExpired
        );
    }

    #[test]
    fn fourth_safe_message_past_the_cooldown_exits() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(MIN_MINUTES_TO_EXIT + 1);

        assert_eq!(
            advance_after_safe_message(Some(flagged), 3, now),
            SafeMessageOutcome::Exited
        );
    }

    #[test]
    fn fourth_safe_message_before_the_cooldown_keeps_counting() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(MIN_MINUTES_TO_EXIT - 10);

        assert_eq!(
            advance_after_safe_message(Some(flagged), 3, now),
            SafeMessageOutcome::StillActive {
                safe_messages_since: 4,
                pending_exit_check_in: false,
            }
        );
    }

    #[test]
    fn third_safe_message_past_the_cooldown_is_the_cusp() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(MIN_MINUTES_TO_EXIT);

        assert_eq!(
            advance_after_safe_message(Some(flagged), 2, now),
            SafeMessageOutcome::StillActive {
                safe_messages_since: 3,
                pending_exit_check_in: true,
            }
        );
    }

    #[test]
    fn early_safe_messages_just_count_up() {
        let now = Utc::now();
        let flagged = now - Duration::minutes(5);

        assert_eq!(
            advance_after_safe_message(Some(flagged), 0, now),
            SafeMessageOutcome::StillActive {
                safe_messages_since: 1,
                pending_exit_check_in: false,
            }
        );
    }
}
