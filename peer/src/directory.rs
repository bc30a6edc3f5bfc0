//! Name registration and lookup used for peer discovery
//!
//! The coordinator only relies on the [`Directory`] contract. Two
//! implementations are provided: an in-process map for tests and demos, and
//! a file-backed store that lets several processes on one host find each
//! other.

use crate::error::DirectoryError;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait Directory: Send + Sync {
    async fn register(&self, name: &str, addr: SocketAddr) -> Result<(), DirectoryError>;

    async fn unregister(&self, name: &str) -> Result<(), DirectoryError>;

    /// Returns every registered name matching `pattern`, a prefix followed by `*`.
    async fn lookup(&self, pattern: &str) -> Result<Vec<String>, DirectoryError>;

    async fn resolve(&self, name: &str) -> Result<Option<SocketAddr>, DirectoryError>;
}

fn pattern_prefix(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

/// Directory kept in memory; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: Arc<RwLock<BTreeMap<String, SocketAddr>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn register(&self, name: &str, addr: SocketAddr) -> Result<(), DirectoryError> {
        debug!("Registering {} at {}", name, addr);
        self.entries.write().await.insert(name.to_string(), addr);
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<(), DirectoryError> {
        self.entries.write().await.remove(name);
        Ok(())
    }

    async fn lookup(&self, pattern: &str) -> Result<Vec<String>, DirectoryError> {
        let prefix = pattern_prefix(pattern);
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn resolve(&self, name: &str) -> Result<Option<SocketAddr>, DirectoryError> {
        Ok(self.entries.read().await.get(name).copied())
    }
}

/// Directory stored as one file per name, each holding the endpoint address.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    root: PathBuf,
}

impl FileDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Directory for FileDirectory {
    async fn register(&self, name: &str, addr: SocketAddr) -> Result<(), DirectoryError> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, addr.to_string()).await?;
        debug!("Registered {} at {} in {}", name, addr, path.display());
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<(), DirectoryError> {
        match tokio::fs::remove_file(self.root.join(name)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn lookup(&self, pattern: &str) -> Result<Vec<String>, DirectoryError> {
        let prefix = pattern_prefix(pattern);
        let (dir, stem) = match prefix.rfind('/') {
            Some(i) => (&prefix[..i], &prefix[i + 1..]),
            None => ("", prefix),
        };

        let mut entries = match tokio::fs::read_dir(self.root.join(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.starts_with(stem) || !entry.file_type().await?.is_file() {
                continue;
            }
            if dir.is_empty() {
                names.push(file_name);
            } else {
                names.push(format!("{}/{}", dir, file_name));
            }
        }
        names.sort();
        Ok(names)
    }

    async fn resolve(&self, name: &str) -> Result<Option<SocketAddr>, DirectoryError> {
        let record = match tokio::fs::read_to_string(self.root.join(name)).await {
            Ok(record) => record,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        record
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DirectoryError::MalformedRecord {
                name: name.to_string(),
                record,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn scratch_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("volley-dir-{}-{}", label, std::process::id()))
    }

    #[tokio::test]
    async fn test_memory_register_and_lookup() {
        let directory = MemoryDirectory::new();
        assert_ok!(directory.register("volley/player0001", addr(9001)).await);
        assert_ok!(directory.register("volley/player0002", addr(9002)).await);
        assert_ok!(directory.register("other/thing", addr(9003)).await);

        let names = directory.lookup("volley/player*").await.unwrap();
        assert_eq!(names, vec!["volley/player0001", "volley/player0002"]);
        assert_eq!(
            directory.resolve("volley/player0002").await.unwrap(),
            Some(addr(9002))
        );
    }

    #[tokio::test]
    async fn test_memory_unregister() {
        let directory = MemoryDirectory::new();
        directory.register("a1", addr(1)).await.unwrap();
        directory.unregister("a1").await.unwrap();
        directory.unregister("never-there").await.unwrap();

        assert_eq!(directory.len().await, 0);
        assert_eq!(directory.resolve("a1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_clones_share_entries() {
        let directory = MemoryDirectory::new();
        let other = directory.clone();
        directory.register("p0003", addr(3)).await.unwrap();
        assert_eq!(other.lookup("p*").await.unwrap(), vec!["p0003"]);
    }

    #[tokio::test]
    async fn test_file_directory_round_trip() {
        let root = scratch_root("roundtrip");
        let _ = std::fs::remove_dir_all(&root);
        let directory = FileDirectory::new(&root);

        directory
            .register("volley/player0004", addr(9004))
            .await
            .unwrap();
        directory
            .register("volley/player0009", addr(9009))
            .await
            .unwrap();
        directory
            .register("volley/observer", addr(9010))
            .await
            .unwrap();

        let names = directory.lookup("volley/player*").await.unwrap();
        assert_eq!(names, vec!["volley/player0004", "volley/player0009"]);
        assert_eq!(
            directory.resolve("volley/player0009").await.unwrap(),
            Some(addr(9009))
        );

        directory.unregister("volley/player0004").await.unwrap();
        let names = directory.lookup("volley/player*").await.unwrap();
        assert_eq!(names, vec!["volley/player0009"]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_file_directory_missing_root_is_empty() {
        let directory = FileDirectory::new(scratch_root("missing").join("nowhere"));
        assert!(directory.lookup("volley/player*").await.unwrap().is_empty());
        assert_eq!(directory.resolve("volley/player0001").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_directory_malformed_record() {
        let root = scratch_root("malformed");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("p0001"), "not an address").unwrap();

        let directory = FileDirectory::new(&root);
        let result = directory.resolve("p0001").await;
        assert!(matches!(
            result,
            Err(DirectoryError::MalformedRecord { .. })
        ));

        let _ = std::fs::remove_dir_all(&root);
    }
}
