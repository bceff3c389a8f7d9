//! Smart rewind on resume.
//!
//! After a long pause or an audio route interruption the listener gets a
//! few seconds back, but never past the start of the current chapter.

use core_library::models::Chapter;
use std::time::Duration;

/// Resume position after rewinding `interval` from `current_time`.
///
/// `max(chapter_start, current_time - interval)`, clamped at zero. A zero
/// interval leaves the position unchanged.
pub fn smart_rewind_position(current_time: f64, interval: Duration, chapters: &[Chapter]) -> f64 {
    if interval.is_zero() {
        return current_time;
    }

    let chapter_start = chapters
        .iter()
        .filter(|chapter| chapter.start <= current_time)
        .map(|chapter| chapter.start)
        .fold(0.0, f64::max);

    (current_time - interval.as_secs_f64())
        .max(chapter_start)
        .max(0.0)
}

/// Whether resuming now should rewind.
///
/// True after an interruption, or when playback was last seen at least
/// `threshold` ago.
pub fn should_rewind(
    last_played_at: Option<i64>,
    now_millis: i64,
    threshold: Duration,
    interrupted: bool,
) -> bool {
    if interrupted {
        return true;
    }
    let threshold_millis = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    last_played_at.is_some_and(|played| now_millis.saturating_sub(played) >= threshold_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter {
                id: 0,
                start: 0.0,
                end: 600.0,
                title: "Opening".to_string(),
            },
            Chapter {
                id: 1,
                start: 600.0,
                end: 1200.0,
                title: "Chapter 1".to_string(),
            },
        ]
    }

    #[test]
    fn test_rewinds_by_interval_inside_chapter() {
        let position = smart_rewind_position(700.0, Duration::from_secs(30), &chapters());
        assert_eq!(position, 670.0);
    }

    #[test]
    fn test_never_rewinds_past_chapter_start() {
        let position = smart_rewind_position(610.0, Duration::from_secs(30), &chapters());
        assert_eq!(position, 600.0);
    }

    #[test]
    fn test_zero_interval_keeps_position() {
        assert_eq!(smart_rewind_position(610.0, Duration::ZERO, &chapters()), 610.0);
    }

    #[test]
    fn test_never_negative_without_chapters() {
        assert_eq!(smart_rewind_position(12.0, Duration::from_secs(30), &[]), 0.0);
        assert_eq!(smart_rewind_position(100.0, Duration::from_secs(30), &[]), 70.0);
    }

    #[test]
    fn test_position_at_end_uses_last_chapter() {
        let position = smart_rewind_position(1200.0, Duration::from_secs(900), &chapters());
        assert_eq!(position, 600.0);
    }

    #[test]
    fn test_should_rewind() {
        let threshold = Duration::from_secs(600);
        let now = 1_700_000_000_000;

        assert!(should_rewind(Some(now - 600_000), now, threshold, false));
        assert!(!should_rewind(Some(now - 599_999), now, threshold, false));
        assert!(!should_rewind(None, now, threshold, false));
        assert!(should_rewind(None, now, threshold, true));
    }
}
