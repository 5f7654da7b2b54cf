use chrono::{DateTime, Utc};

use crate::models::TodoStatus;

/// True when `expire_at` is strictly before `now`. An expiry equal to `now`
/// has not lapsed yet. The sweep query uses the same `<` comparison.
pub fn is_lapsed(expire_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expire_at, Some(at) if at < now)
}

/// Decide the status to store for a todo being created or edited.
///
/// An explicit status from the caller wins. Otherwise a lapsed expiry yields
/// `Expired` and everything else is `Pending`.
pub fn derive_status(
    expire_at: Option<DateTime<Utc>>,
    explicit: Option<TodoStatus>,
    now: DateTime<Utc>,
) -> TodoStatus {
    if let Some(status) = explicit {
        return status;
    }
    if is_lapsed(expire_at, now) {
        TodoStatus::Expired
    } else {
        TodoStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    #[test]
    fn no_expiry_is_pending() {
        assert_eq!(derive_status(None, None, t0()), TodoStatus::Pending);
    }

    #[test]
    fn past_expiry_is_expired() {
        let expire = t0() - Duration::seconds(1);
        assert_eq!(derive_status(Some(expire), None, t0()), TodoStatus::Expired);
    }

    #[test]
    fn expiry_equal_to_now_is_not_expired() {
        assert_eq!(derive_status(Some(t0()), None, t0()), TodoStatus::Pending);
        // one sweep interval later it has lapsed
        let later = t0() + Duration::minutes(1);
        assert_eq!(derive_status(Some(t0()), None, later), TodoStatus::Expired);
    }

    #[test]
    fn explicit_status_wins() {
        let expire = t0() - Duration::hours(2);
        assert_eq!(
            derive_status(Some(expire), Some(TodoStatus::Completed), t0()),
            TodoStatus::Completed
        );
        assert_eq!(
            derive_status(Some(expire), Some(TodoStatus::Pending), t0()),
            TodoStatus::Pending
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let expire = Some(t0() + Duration::hours(1));
        let first = derive_status(expire, None, t0());
        let second = derive_status(expire, None, t0());
        assert_eq!(first, second);
    }

    #[test]
    fn created_two_hours_early_then_lapses() {
        // due at T, expires at T+1h, created at T-2h
        let due = t0();
        let expire = due + Duration::hours(1);
        assert_eq!(
            derive_status(Some(expire), None, due - Duration::hours(2)),
            TodoStatus::Pending
        );
        assert!(is_lapsed(Some(expire), expire + Duration::seconds(1)));
    }
}
