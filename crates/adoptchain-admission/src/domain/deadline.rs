//! Deadline arithmetic for application windows.

/// Seconds a roster stays open after its first application.
pub const WAIT_WINDOW_SECS: i64 = 100;

/// Remaining time below which observers get a live per-second countdown.
pub const SOON_THRESHOLD_SECS: i64 = 60 * 60;

/// Unix second at which the window opened by `start_time` closes.
#[must_use]
pub fn deadline(start_time: i64) -> i64 {
    start_time.saturating_add(WAIT_WINDOW_SECS)
}

/// Seconds left before the window closes; never negative.
#[must_use]
pub fn remaining_seconds(start_time: i64, now: i64) -> i64 {
    deadline(start_time).saturating_sub(now).max(0)
}

/// Returns `true` if `remaining` warrants a live countdown.
#[must_use]
pub fn is_soon(remaining: i64) -> bool {
    remaining > 0 && remaining < SOON_THRESHOLD_SECS
}

/// Renders remaining time for display: coarse above an hour
/// (`more than 2 day`), `m:ss` below.
#[must_use]
pub fn format_remaining(remaining: i64) -> String {
    let remaining = remaining.max(0);
    let seconds = remaining % 60;
    let minutes = remaining / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let months = days / 30;

    if months > 0 {
        format!("more than {months} month")
    } else if days > 0 {
        format!("more than {days} day")
    } else if hours > 0 {
        format!("more than {hours} hour")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
