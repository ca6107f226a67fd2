//! Position arithmetic on the authoritative timeline

use crate::PlayState;

/// Position in seconds a listener should be at for `server_now_ms`.
///
/// Clamped to `[0, duration]` when the duration is known and positive.
pub fn expected_position_secs(state: &PlayState, duration_sec: Option<f64>, server_now_ms: i64) -> f64 {
    let elapsed = state
        .elapsed_ms(server_now_ms)
        .map(|ms| ms as f64 / 1000.0)
        .unwrap_or(0.0)
        .max(0.0);
    match duration_sec {
        Some(duration) if duration > 0.0 => elapsed.min(duration),
        _ => elapsed,
    }
}

/// Seconds left in the current track, when its duration is known.
pub fn remaining_secs(state: &PlayState, duration_sec: Option<f64>, server_now_ms: i64) -> Option<f64> {
    let duration = duration_sec.filter(|d| *d > 0.0)?;
    let elapsed = state.elapsed_ms(server_now_ms)? as f64 / 1000.0;
    Some(duration - elapsed)
}

/// Format seconds as `m:ss`.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn expected_position_clamps_to_duration() {
        let state = PlayState::started(Some(Uuid::new_v4()), 0);
        assert_eq!(expected_position_secs(&state, Some(180.0), 200_000), 180.0);
        assert_eq!(expected_position_secs(&state, None, 200_000), 200.0);
        assert_eq!(expected_position_secs(&state, Some(0.0), 5_000), 5.0);
    }

    #[test]
    fn expected_position_uses_pause_reference() {
        let state = PlayState::started(Some(Uuid::new_v4()), 0).paused_at(40_000);
        assert_eq!(expected_position_secs(&state, Some(180.0), 90_000), 40.0);
    }

    #[test]
    fn idle_state_expects_zero() {
        assert_eq!(expected_position_secs(&PlayState::stopped(0), Some(10.0), 5_000), 0.0);
    }

    #[test]
    fn remaining_requires_known_duration() {
        let state = PlayState::started(Some(Uuid::new_v4()), 0);
        assert_eq!(remaining_secs(&state, Some(180.0), 170_000), Some(10.0));
        assert_eq!(remaining_secs(&state, None, 170_000), None);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(61.9), "1:01");
        assert_eq!(format_clock(600.0), "10:00");
    }
}
