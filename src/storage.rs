//! Atomic JSON persistence and the per-supplier file layout.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Serializes `value` and replaces `path` via write-to-temp then rename, so a
/// crash never leaves a half-written document behind.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(value).context("Failed to serialize state")?;
    let temp_path = temp_path_for(path);

    let result = (|| -> Result<()> {
        let mut file = std::fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(&json)
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all().context("Failed to sync temp file")?;
        drop(file);

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))
    })();

    if result.is_err() && temp_path.exists() {
        let _ = std::fs::remove_file(&temp_path);
    }

    trace!("Wrote {} bytes to {}", json.len(), path.display());
    result
}

/// Reads a JSON document. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Locations of one supplier's persistent files.
#[derive(Debug, Clone)]
pub struct SupplierPaths {
    dir: PathBuf,
}

impl SupplierPaths {
    pub fn new(data_dir: impl AsRef<Path>, supplier_key: &str) -> Self {
        Self { dir: data_dir.as_ref().join(supplier_key) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history(&self) -> PathBuf {
        self.dir.join("crawl_history.json")
    }

    pub fn suggestions(&self) -> PathBuf {
        self.dir.join("ai_suggestions.json")
    }

    pub fn state(&self) -> PathBuf {
        self.dir.join("processing_state.json")
    }

    pub fn linking(&self) -> PathBuf {
        self.dir.join("linking_map.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc { name: "garden".to_string(), count: 3 };

        write_json_atomic(&path, &doc).unwrap();
        let loaded: Doc = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Doc> = read_json(&dir.path().join("missing.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_corrupt_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_json::<Doc>(&path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse"));
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &Doc { name: "a".to_string(), count: 1 }).unwrap();
        write_json_atomic(&path, &Doc { name: "b".to_string(), count: 2 }).unwrap();

        let loaded: Doc = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded.name, "b");
    }

    #[test]
    fn test_supplier_paths() {
        let paths = SupplierPaths::new("/data", "shop.example.com");
        assert_eq!(paths.history(), PathBuf::from("/data/shop.example.com/crawl_history.json"));
        assert_eq!(paths.linking(), PathBuf::from("/data/shop.example.com/linking_map.json"));
        assert_eq!(paths.dir(), Path::new("/data/shop.example.com"));
    }
}
