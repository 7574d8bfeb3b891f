use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Stores original uploaded bytes on disk, one whole file per document
/// at `<root>/<id><ext>`. Writes are not fsynced or renamed into place;
/// a crash mid-write can leave truncated bytes under the expected path.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn open(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The path a blob for (id, ext) lives at, whether or not it exists.
    pub fn path(&self, id: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{id}{ext}"))
    }

    pub fn put(&self, id: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(id, ext);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn get(&self, id: &str, ext: &str) -> Result<Vec<u8>> {
        let path = self.path(id, ext);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound {
                    kind: "blob",
                    name: format!("{id}{ext}"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, id: &str, ext: &str) -> Result<()> {
        let path = self.path(id, ext);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound {
                    kind: "blob",
                    name: format!("{id}{ext}"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// SHA-256 of a byte slice as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, BlobStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::open(tmp.path().join("docs")).unwrap();
        (tmp, store)
    }

    #[test]
    fn put_then_get_roundtrip() {
        let (_tmp, store) = test_store();
        let path = store.put("abc123", ".txt", b"hello world").unwrap();
        assert!(path.ends_with("abc123.txt"));
        assert_eq!(store.get("abc123", ".txt").unwrap(), b"hello world");
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_tmp, store) = test_store();
        match store.get("nope", ".txt") {
            Err(Error::NotFound { kind: "blob", .. }) => {}
            other => panic!("expected blob NotFound, got {other:?}"),
        }
    }

    #[test]
    fn delete_removes_file() {
        let (_tmp, store) = test_store();
        store.put("abc", ".md", b"data").unwrap();
        store.delete("abc", ".md").unwrap();
        assert!(!store.path("abc", ".md").exists());
        assert!(store.delete("abc", ".md").is_err());
    }

    #[test]
    fn put_overwrites() {
        let (_tmp, store) = test_store();
        store.put("abc", ".txt", b"old").unwrap();
        store.put("abc", ".txt", b"new").unwrap();
        assert_eq!(store.get("abc", ".txt").unwrap(), b"new");
    }

    #[test]
    fn sha256_known_value() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
