use chrono::{DateTime, Utc};

/// The number of whole minutes between two milestones, rounded half-up.
///
/// Returns `None` when `to` precedes `from`; a negative duration means the milestones were
/// recorded out of order and must not be stored.
pub fn rounded_minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<i64> {
    let seconds = (to - from).num_seconds();
    if seconds < 0 {
        return None;
    }
    Some((seconds + 30) / 60)
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    #[test]
    fn durations_round_to_the_nearest_minute() {
        let start = Utc::now();
        assert_eq!(rounded_minutes_between(start, start + Duration::seconds(29)), Some(0));
        assert_eq!(rounded_minutes_between(start, start + Duration::seconds(30)), Some(1));
        assert_eq!(rounded_minutes_between(start, start + Duration::seconds(90)), Some(2));
        assert_eq!(rounded_minutes_between(start, start + Duration::minutes(25)), Some(25));
    }

    #[test]
    fn negative_durations_are_rejected() {
        let start = Utc::now();
        assert_eq!(rounded_minutes_between(start, start - Duration::seconds(1)), None);
    }
}
