//! Stress tests for ShelfDB.
//!
//! These helpers drive a repository from many tasks at once and report
//! throughput and write amplification.

use crate::fixtures::{register_scores, Score};
use shelfdb_core::Repository;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Durable writes the operations cost.
    pub durable_writes: u64,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, durable_writes: u64, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            durable_writes,
            duration,
            ops_per_second,
        }
    }

    /// Records per durable write.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.durable_writes == 0 {
            0.0
        } else {
            self.successful_ops as f64 / self.durable_writes as f64
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Durable writes: {}", self.durable_writes);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Stores issued per task.
    pub operations: usize,
    /// Number of concurrent tasks.
    pub tasks: usize,
    /// Number of distinct guilds written to.
    pub guilds: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            tasks: 4,
            guilds: 8,
        }
    }
}

/// Stores scores from `config.tasks` concurrent tasks.
///
/// `repo` must already have [`Score`] registered, or registration must be
/// possible.
pub async fn stress_concurrent_stores(repo: Arc<Repository>, config: &StressConfig) -> StressTestResult {
    let scores = register_scores(&repo);
    let writes_before = repo.stats().durable_writes;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(config.tasks);
    for task in 0..config.tasks {
        let repo = Arc::clone(&repo);
        let scores = scores.clone();
        let operations = config.operations;
        let guilds = config.guilds.max(1);
        handles.push(tokio::spawn(async move {
            let mut ok = 0;
            let mut failed = 0;
            for i in 0..operations {
                let guild = format!("g{}", (task + i) % guilds);
                let score = Score::new(&guild, &format!("t{task}-{i}"), i as i64);
                match repo.store(&scores, &score).await {
                    Ok(()) => ok += 1,
                    Err(_) => failed += 1,
                }
            }
            (ok, failed)
        }));
    }

    let mut successful = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok((ok, err)) => {
                successful += ok;
                failed += err;
            }
            Err(_) => failed += config.operations,
        }
    }

    let durable_writes = repo.stats().durable_writes - writes_before;
    StressTestResult::new(successful, failed, durable_writes, start.elapsed())
}

/// Issues `count` stores without awaiting between them and returns the
/// durable writes they cost.
pub async fn burst_store(repo: &Repository, guild: &str, count: usize) -> u64 {
    let scores = register_scores(repo);
    let writes_before = repo.stats().durable_writes;
    let items: Vec<Score> = (0..count)
        .map(|i| Score::new(guild, &format!("b{i}"), i as i64))
        .collect();
    let result = repo
        .bulk_store(&scores, &items)
        .await
        .expect("burst store failed");
    assert!(result.is_complete(), "burst store failures: {:?}", result.failures);
    repo.stats().durable_writes - writes_before
}
