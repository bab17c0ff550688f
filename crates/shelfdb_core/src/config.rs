//! Repository configuration.

use shelfdb_codec::DocumentFormat;
use std::time::Duration;

/// Configuration for opening a repository.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store document if it doesn't exist.
    pub create_if_missing: bool,

    /// On-disk format of the store document.
    pub format: DocumentFormat,

    /// Write batching parameters.
    pub batch: BatchConfig,

    /// Durable-write retry parameters.
    pub retry: RetryConfig,

    /// Read cache parameters.
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            format: DocumentFormat::Json,
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the document format.
    #[must_use]
    pub const fn format(mut self, format: DocumentFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the batching parameters.
    #[must_use]
    pub const fn batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the retry parameters.
    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cache parameters.
    #[must_use]
    pub const fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Write batching parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Quiet period that closes a batch window. Each new write resets it.
    pub debounce: Duration,
    /// Maximum writes per durable flush.
    pub max_batch_size: usize,
    /// Capacity of the queue feeding the writer task.
    pub channel_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            max_batch_size: 100,
            channel_capacity: 1024,
        }
    }
}

impl BatchConfig {
    /// Sets the debounce window.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the maximum batch size. Values below 1 are treated as 1.
    #[must_use]
    pub const fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the writer queue capacity. Values below 1 are treated as 1.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

/// Retry behaviour for durable writes.
///
/// Backoff is linear: the wait after failed attempt `n` is `n * step`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of write attempts per batch.
    pub max_attempts: u32,
    /// Linear backoff step.
    pub backoff_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with the default backoff step.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the backoff step.
    #[must_use]
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Read cache parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default entry lifetime.
    pub ttl: Duration,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Share of entries dropped in one eviction pass when full.
    pub eviction_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            capacity: 1000,
            eviction_fraction: 0.2,
        }
    }
}

impl CacheConfig {
    /// Sets the entry lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the eviction fraction, clamped to `(0, 1]`.
    #[must_use]
    pub fn with_eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = if fraction.is_finite() && fraction > 0.0 {
            fraction.min(1.0)
        } else {
            CacheConfig::default().eviction_fraction
        };
        self
    }

    /// Number of entries one eviction pass removes from a full cache.
    pub fn eviction_batch(&self) -> usize {
        let count = (self.capacity as f64 * self.eviction_fraction).ceil() as usize;
        count.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert_eq!(config.format, DocumentFormat::Json);
        assert_eq!(config.batch.debounce, Duration::from_millis(50));
        assert_eq!(config.batch.max_batch_size, 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.capacity, 1000);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .format(DocumentFormat::Cbor)
            .batch(BatchConfig::default().with_max_batch_size(10))
            .cache(CacheConfig::default().with_capacity(5));

        assert!(!config.create_if_missing);
        assert_eq!(config.format, DocumentFormat::Cbor);
        assert_eq!(config.batch.max_batch_size, 10);
        assert_eq!(config.cache.capacity, 5);
    }

    #[test]
    fn linear_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }

    #[test]
    fn eviction_batch_is_a_fifth() {
        assert_eq!(CacheConfig::default().eviction_batch(), 200);
        assert_eq!(CacheConfig::default().with_capacity(3).eviction_batch(), 1);
        assert_eq!(
            CacheConfig::default()
                .with_capacity(10)
                .with_eviction_fraction(0.5)
                .eviction_batch(),
            5
        );
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(BatchConfig::default().with_max_batch_size(0).max_batch_size, 1);
    }
}
