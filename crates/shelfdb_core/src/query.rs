//! Query engine.
//!
//! Queries run over an in-memory collection in three steps: filter, then
//! sort, then slice `[offset, offset + limit)`. The comparator is trusted
//! to be a total order. Sorting is stable, so equal elements keep their
//! stored order.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};

/// A record predicate.
pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A record ordering.
pub type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Query parameters.
///
/// # Example
///
/// ```rust,ignore
/// let options = QueryOptions::new()
///     .filter(|s: &Score| s.value > 10)
///     .sort_by(|a, b| b.value.cmp(&a.value))
///     .limit(10);
/// ```
pub struct QueryOptions<T> {
    filter: Option<Filter<T>>,
    sort: Option<Comparator<T>>,
    limit: Option<usize>,
    offset: usize,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            limit: None,
            offset: 0,
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("filter", &self.filter.is_some())
            .field("sort", &self.sort.is_some())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T> QueryOptions<T> {
    /// Creates options that return the whole collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only records matching `predicate`.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Orders records with `compare`.
    #[must_use]
    pub fn sort_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Box::new(compare));
        self
    }

    /// Orders records by a key.
    #[must_use]
    pub fn sort_by_key<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.sort_by(move |a, b| key(a).cmp(&key(b)))
    }

    /// Returns at most `limit` records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching records.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns true if `record` passes the filter.
    pub fn matches(&self, record: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(record))
    }

    /// Runs the query over `records`.
    pub fn execute(&self, records: Vec<T>) -> QueryResult<T> {
        let started = Instant::now();

        let mut matched: Vec<T> = match &self.filter {
            Some(f) => records.into_iter().filter(|r| f(r)).collect(),
            None => records,
        };
        if let Some(compare) = &self.sort {
            matched.sort_by(|a, b| compare(a, b));
        }

        let total_count = matched.len();
        let start = self.offset.min(total_count);
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(total_count),
            None => total_count,
        };
        let has_more = self
            .limit
            .is_some_and(|limit| self.offset.saturating_add(limit) < total_count);

        let entities: Vec<T> = matched.drain(start..end).collect();

        QueryResult {
            entities,
            total_count,
            has_more,
            execution_time: started.elapsed(),
        }
    }

    /// Counts records passing the filter, ignoring sort and pagination.
    pub fn count(&self, records: &[T]) -> usize {
        records.iter().filter(|r| self.matches(r)).count()
    }
}

/// Result of a query.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    /// The requested page.
    pub entities: Vec<T>,
    /// Matches after filtering, before pagination.
    pub total_count: usize,
    /// True if a limit was given and more matches follow this page.
    pub has_more: bool,
    /// Wall time spent filtering, sorting and slicing.
    pub execution_time: Duration,
}

impl<T> QueryResult<T> {
    /// Execution time in fractional milliseconds.
    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time.as_secs_f64() * 1000.0
    }

    /// Returns true if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builds a filter matching records whose serialized `field` equals `value`.
///
/// Records that fail to serialize, or lack the field, never match.
pub fn field_equals<T, V>(field: &str, value: V) -> Filter<T>
where
    T: Serialize,
    V: Serialize,
{
    let field = field.to_owned();
    let Ok(expected) = serde_json::to_value(value) else {
        return Box::new(|_: &T| false);
    };
    Box::new(move |record: &T| {
        serde_json::to_value(record)
            .ok()
            .and_then(|mut v| v.get_mut(&field).map(Value::take))
            .is_some_and(|actual| actual == expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Score {
        id: String,
        value: i64,
    }

    fn scores(values: &[i64]) -> Vec<Score> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Score {
                id: format!("u{i}"),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn no_options_returns_everything() {
        let result = QueryOptions::new().execute(scores(&[3, 1, 2]));
        assert_eq!(result.total_count, 3);
        assert_eq!(result.entities.len(), 3);
        assert!(!result.has_more);
        assert_eq!(result.entities[0].value, 3);
    }

    #[test]
    fn filter_sort_and_page() {
        let options = QueryOptions::new()
            .filter(|s: &Score| s.value % 2 == 0)
            .sort_by(|a, b| b.value.cmp(&a.value))
            .offset(1)
            .limit(2);

        let result = options.execute(scores(&[2, 8, 5, 4, 6, 1]));
        let values: Vec<i64> = result.entities.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![6, 4]);
        assert_eq!(result.total_count, 4);
        assert!(result.has_more);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let result = QueryOptions::new().offset(10).limit(5).execute(scores(&[1, 2]));
        assert!(result.is_empty());
        assert_eq!(result.total_count, 2);
        assert!(!result.has_more);
    }

    #[test]
    fn offset_without_limit_slices_to_end() {
        let result = QueryOptions::new().offset(1).execute(scores(&[1, 2, 3]));
        assert_eq!(result.entities.len(), 2);
        assert!(!result.has_more);
    }

    #[test]
    fn exact_last_page_has_no_more() {
        let result = QueryOptions::new().offset(2).limit(2).execute(scores(&[1, 2, 3, 4]));
        assert_eq!(result.entities.len(), 2);
        assert!(!result.has_more);
    }

    #[test]
    fn stable_sort_keeps_stored_order() {
        let result = QueryOptions::new()
            .sort_by_key(|s: &Score| s.value)
            .execute(scores(&[1, 0, 1, 0]));
        let ids: Vec<&str> = result.entities.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u3", "u0", "u2"]);
    }

    #[test]
    fn field_equals_matches_serialized_field() {
        let records = scores(&[5, 7, 5]);
        let options = QueryOptions::<Score>::new().filter(field_equals("value", 5));
        assert_eq!(options.count(&records), 2);

        let missing = QueryOptions::<Score>::new().filter(field_equals("nope", 5));
        assert_eq!(missing.count(&records), 0);
    }

    proptest! {
        #[test]
        fn page_is_slice_of_sorted_matches(
            values in prop::collection::vec(-50i64..50, 0..60),
            offset in 0usize..70,
            limit in prop::option::of(0usize..70),
        ) {
            let records = scores(&values);

            let mut options = QueryOptions::new()
                .filter(|s: &Score| s.value >= 0)
                .sort_by_key(|s: &Score| s.value)
                .offset(offset);
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            let result = options.execute(records.clone());

            let mut expected: Vec<Score> =
                records.into_iter().filter(|s| s.value >= 0).collect();
            expected.sort_by_key(|s| s.value);
            let total = expected.len();
            let start = offset.min(total);
            let end = limit.map_or(total, |l| (start + l).min(total));

            prop_assert_eq!(result.total_count, total);
            prop_assert_eq!(&result.entities[..], &expected[start..end]);
            prop_assert_eq!(result.has_more, limit.is_some_and(|l| offset + l < total));
        }
    }
}
