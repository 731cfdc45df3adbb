//! Content stores
//!
//! Deployment scripts and documentation are opaque text blobs addressed
//! by slash-separated keys such as `deploy/aws/launch.sh`.

use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Content errors
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Source of text blobs by key
pub trait ContentStore: Send + Sync {
    /// Fetch the blob stored under `key`
    fn fetch(&self, key: &str) -> Result<String, ContentError>;

    /// All keys this store can serve, sorted
    fn keys(&self) -> Vec<String>;
}

/// Blobs compiled into the binary
static EMBEDDED: &[(&str, &str)] = &[
    ("deploy/aws/launch.sh", include_str!("../content/deploy/aws/launch.sh")),
    ("deploy/digitalocean/setup.sh", include_str!("../content/deploy/digitalocean/setup.sh")),
    ("deploy/docker/docker-compose.yml", include_str!("../content/deploy/docker/docker-compose.yml")),
    ("deploy/docker/run.sh", include_str!("../content/deploy/docker/run.sh")),
    ("deploy/telegram/bot-setup.txt", include_str!("../content/deploy/telegram/bot-setup.txt")),
    ("deploy/telegram/webapp.json", include_str!("../content/deploy/telegram/webapp.json")),
    ("docs/api.md", include_str!("../content/docs/api.md")),
    ("docs/configuration.env", include_str!("../content/docs/configuration.env")),
    ("docs/overview.md", include_str!("../content/docs/overview.md")),
    ("docs/security-firewall.sh", include_str!("../content/docs/security-firewall.sh")),
    ("docs/troubleshooting.sh", include_str!("../content/docs/troubleshooting.sh")),
];

/// Store backed by the blobs shipped with the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedContentStore;

impl EmbeddedContentStore {
    pub fn new() -> Self {
        Self
    }
}

impl ContentStore for EmbeddedContentStore {
    fn fetch(&self, key: &str) -> Result<String, ContentError> {
        EMBEDDED
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, blob)| blob.to_string())
            .ok_or_else(|| ContentError::NotFound(key.to_string()))
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = EMBEDDED.iter().map(|(k, _)| k.to_string()).collect();
        keys.sort();
        keys
    }
}

/// Store reading files under a root directory
#[derive(Debug, Clone)]
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, refusing anything that escapes the root
    fn resolve(&self, key: &str) -> Result<PathBuf, ContentError> {
        if key.is_empty() || key.split('/').any(str::is_empty) {
            return Err(ContentError::InvalidKey(key.to_string()));
        }

        let relative = Path::new(key);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ContentError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }

    fn collect(&self, dir: &Path, prefix: &str, keys: &mut Vec<String>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            if entry.file_type()?.is_dir() {
                self.collect(&entry.path(), &key, keys)?;
            } else {
                keys.push(key);
            }
        }
        Ok(())
    }
}

impl ContentStore for DirContentStore {
    fn fetch(&self, key: &str) -> Result<String, ContentError> {
        let path = self.resolve(key)?;
        // Directories are never keys
        if path.is_dir() {
            return Err(ContentError::NotFound(key.to_string()));
        }
        debug!("Reading content {} from {}", key, path.display());

        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(key.to_string()),
            _ => ContentError::Io(e),
        })
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Err(e) = self.collect(&self.root, "", &mut keys) {
            warn!("Failed to list content under {}: {}", self.root.display(), e);
        }
        keys.sort();
        keys
    }
}

/// Stores consulted in order; the first one holding a key wins
pub struct LayeredContentStore {
    layers: Vec<Box<dyn ContentStore>>,
}

impl LayeredContentStore {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer below the existing ones
    pub fn with_layer(mut self, store: impl ContentStore + 'static) -> Self {
        self.layers.push(Box::new(store));
        self
    }
}

impl Default for LayeredContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for LayeredContentStore {
    fn fetch(&self, key: &str) -> Result<String, ContentError> {
        for layer in &self.layers {
            match layer.fetch(key) {
                Err(ContentError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(ContentError::NotFound(key.to_string()))
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.layers.iter().flat_map(|l| l.keys()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_root() -> TempDir {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("deploy/aws")).unwrap();
        std::fs::write(root.path().join("deploy/aws/launch.sh"), "#!/bin/sh\necho custom\n").unwrap();
        std::fs::write(root.path().join("notes.txt"), "hello").unwrap();
        root
    }

    #[test]
    fn test_embedded_fetch() {
        let store = EmbeddedContentStore::new();
        let script = store.fetch("deploy/aws/launch.sh").unwrap();

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("wg-quick@wg0"));
    }

    #[test]
    fn test_embedded_not_found() {
        let store = EmbeddedContentStore::new();
        assert!(matches!(store.fetch("deploy/gcp/launch.sh"), Err(ContentError::NotFound(_))));
    }

    #[test]
    fn test_embedded_keys_sorted() {
        let keys = EmbeddedContentStore::new().keys();

        assert_eq!(keys.len(), EMBEDDED.len());
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_dir_store() {
        let root = temp_root();
        let store = DirContentStore::new(root.path());

        assert_eq!(store.fetch("notes.txt").unwrap(), "hello");
        assert!(matches!(store.fetch("missing.txt"), Err(ContentError::NotFound(_))));
        assert_eq!(store.keys(), vec!["deploy/aws/launch.sh", "notes.txt"]);
    }

    #[test]
    fn test_dir_store_directory_key_is_not_found() {
        let root = temp_root();
        let store = DirContentStore::new(root.path());

        assert!(!store.keys().contains(&"deploy".to_string()));
        assert!(matches!(store.fetch("deploy"), Err(ContentError::NotFound(_))));
        assert!(matches!(store.fetch("deploy/aws"), Err(ContentError::NotFound(_))));
    }

    #[test]
    fn test_dir_store_rejects_escapes() {
        let root = temp_root();
        let store = DirContentStore::new(root.path());

        for key in ["", "../etc/passwd", "/etc/passwd", "deploy//x", "./notes.txt", "a/../b"] {
            assert!(
                matches!(store.fetch(key), Err(ContentError::InvalidKey(_))),
                "key {:?} accepted",
                key
            );
        }
    }

    #[test]
    fn test_layered_override() {
        let root = temp_root();
        let store = LayeredContentStore::new()
            .with_layer(DirContentStore::new(root.path()))
            .with_layer(EmbeddedContentStore::new());

        assert!(store.fetch("deploy/aws/launch.sh").unwrap().contains("custom"));
        assert!(store.fetch("deploy/docker/run.sh").unwrap().contains("docker run"));
        assert!(matches!(store.fetch("nope"), Err(ContentError::NotFound(_))));

        let keys = store.keys();
        assert!(keys.contains(&"notes.txt".to_string()));
        assert_eq!(keys.iter().filter(|k| *k == "deploy/aws/launch.sh").count(), 1);
    }

    #[test]
    fn test_layered_falls_through_directory_key() {
        let root = temp_root();
        std::fs::create_dir_all(root.path().join("docs/api.md")).unwrap();
        let store = LayeredContentStore::new()
            .with_layer(DirContentStore::new(root.path()))
            .with_layer(EmbeddedContentStore::new());

        // A directory shadowing an embedded key must not hide it
        assert!(store.fetch("docs/api.md").unwrap().contains("/api/webhook"));
        assert!(matches!(store.fetch("deploy"), Err(ContentError::NotFound(_))));
    }
}
