//! Property-based test generators using proptest.

use crate::fixtures::Score;
use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;

/// Strategy for storage identifiers.
pub fn storage_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for collection keys.
pub fn collection_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9:_-]{1,24}").expect("Invalid regex")
}

/// Strategy for a timestamp within `max_hours` before `now`.
pub fn timestamp_before(now: DateTime<Utc>, max_hours: i64) -> impl Strategy<Value = DateTime<Utc>> {
    (0..=max_hours * 3_600_000).prop_map(move |ms| now - TimeDelta::milliseconds(ms))
}

/// Strategy for a score in `guild` stamped within `max_hours` before `now`.
pub fn score_strategy(
    guild: &'static str,
    now: DateTime<Utc>,
    max_hours: i64,
) -> impl Strategy<Value = Score> {
    ("u[0-9]{1,3}", any::<i32>(), timestamp_before(now, max_hours))
        .prop_map(move |(id, value, at)| Score::at(guild, &id, i64::from(value), at))
}

/// Strategy for a batch of scores in one guild.
pub fn scores_strategy(
    guild: &'static str,
    now: DateTime<Utc>,
    max_hours: i64,
    max_len: usize,
) -> impl Strategy<Value = Vec<Score>> {
    prop::collection::vec(score_strategy(guild, now, max_hours), 0..max_len)
}
