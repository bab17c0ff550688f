//! Test fixtures and repository helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shelfdb_core::{Config, EntityType, Identified, Purgeable, Repository};
use shelfdb_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Sample per-guild score entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Partition key.
    pub guild_id: String,
    /// User id.
    pub id: String,
    /// Score value.
    pub value: i64,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl Score {
    /// Creates a score stamped with the current time.
    pub fn new(guild_id: &str, id: &str, value: i64) -> Self {
        Self::at(guild_id, id, value, Utc::now())
    }

    /// Creates a score stamped with `at`.
    pub fn at(guild_id: &str, id: &str, value: i64, at: DateTime<Utc>) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            id: id.to_string(),
            value,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl Identified for Score {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Purgeable for Score {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// Sample globally partitioned entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Random id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Profile {
    /// Creates a profile with a random id.
    pub fn new(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        }
    }
}

impl Identified for Profile {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Configuration used by fixtures: default batching, near-instant retries.
pub fn test_config() -> Config {
    Config::default().retry(
        shelfdb_core::RetryConfig::default().with_backoff_step(Duration::from_millis(1)),
    )
}

/// A test repository with automatic cleanup.
pub struct TestRepository {
    /// The repository.
    pub repo: Repository,
    /// Handle to the in-memory backend, for write counting.
    pub backend: Option<InMemoryBackend>,
    _temp_dir: Option<TempDir>,
}

impl TestRepository {
    /// Creates an in-memory repository.
    pub async fn memory() -> Self {
        Self::memory_with(test_config()).await
    }

    /// Creates an in-memory repository with `config`.
    pub async fn memory_with(config: Config) -> Self {
        let backend = InMemoryBackend::new();
        let repo = Repository::open_with_backend(config, Box::new(backend.clone()))
            .await
            .expect("Failed to open in-memory repository");
        Self {
            repo,
            backend: Some(backend),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed repository in a temporary directory.
    pub async fn file() -> Self {
        Self::file_with(test_config()).await
    }

    /// Creates a file-backed repository with `config`.
    pub async fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo = Repository::open(temp_dir.path().join("store.json"), config)
            .await
            .expect("Failed to open file repository");
        Self {
            repo,
            backend: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Path of the store document if file-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self.repo.path().map(Path::to_path_buf)
    }

    /// Durable writes seen by the in-memory backend.
    ///
    /// # Panics
    ///
    /// Panics for file-backed repositories.
    pub fn write_count(&self) -> u64 {
        self.backend
            .as_ref()
            .expect("write_count needs an in-memory repository")
            .write_count()
    }

    /// Registers [`Score`] partitioned by guild.
    pub fn scores(&self) -> EntityType<Score> {
        register_scores(&self.repo)
    }

    /// Registers [`Profile`] in a single global collection.
    pub fn profiles(&self) -> EntityType<Profile> {
        self.repo
            .register::<Profile, _>("profiles", |_| GLOBAL_KEY.to_string())
            .expect("Failed to register profiles")
    }

    /// Closes the repository and hands back the temp dir so the store can
    /// be reopened.
    pub async fn close_and_keep(self) -> Option<TempDir> {
        self.repo.close().await.expect("Failed to close repository");
        drop(self.repo);
        self._temp_dir
    }
}

impl std::ops::Deref for TestRepository {
    type Target = Repository;

    fn deref(&self) -> &Self::Target {
        &self.repo
    }
}

/// Collection key used for globally partitioned types.
pub const GLOBAL_KEY: &str = "global";

/// Registers [`Score`] on `repo` under `scores`, partitioned by guild.
pub fn register_scores(repo: &Repository) -> EntityType<Score> {
    repo.register::<Score, _>("scores", |s| s.guild_id.clone())
        .expect("Failed to register scores")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A repository with `count` scores spread over `guilds` guilds.
    pub async fn populated_repository(count: usize, guilds: usize) -> TestRepository {
        let test = TestRepository::memory().await;
        let scores = test.scores();
        let items: Vec<Score> = (0..count)
            .map(|i| Score::new(&format!("g{}", i % guilds.max(1)), &format!("u{i}"), i as i64))
            .collect();
        let result = test
            .bulk_store(&scores, &items)
            .await
            .expect("Failed to populate repository");
        assert!(result.is_complete(), "populate failed: {:?}", result.failures);
        test
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fixture() {
        let test = TestRepository::memory().await;
        let scores = test.scores();
        test.store(&scores, &Score::new("g1", "u1", 1)).await.unwrap();
        assert_eq!(test.write_count(), 1);
        assert!(test.path().is_none());
    }

    #[tokio::test]
    async fn file_fixture_reopens() {
        let test = TestRepository::file().await;
        let path = test.path().unwrap();
        let scores = test.scores();
        test.store(&scores, &Score::new("g1", "u1", 1)).await.unwrap();

        let _dir = test.close_and_keep().await;
        let repo = Repository::open(&path, test_config()).await.unwrap();
        let scores = register_scores(&repo);
        assert_eq!(repo.count(&scores, "g1").unwrap(), 1);
    }

    #[tokio::test]
    async fn populated_scenario() {
        let test = scenarios::populated_repository(30, 3).await;
        let scores = test.repo.entity_type::<Score>().unwrap();
        assert_eq!(test.count(&scores, "g0").unwrap(), 10);
        assert_eq!(test.write_count(), 1);
    }
}
