use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The on-disk layout of a docstash state directory:
/// `docs/` for blobs, `docs.redb` for metadata, `index/` for the
/// search index, and `tags.json` for the tag registry.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCSTASH_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docstash/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("DOCSTASH_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docstash")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blob directory; one file per document, named `<id><ext>`.
    pub fn docs_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("docs");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }

    pub fn meta_db(&self) -> PathBuf {
        self.root.join("docs.redb")
    }

    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("index");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }

    pub fn tags_file(&self) -> PathBuf {
        self.root.join("tags.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.meta_db(), tmp.path().join("docs.redb"));
        assert_eq!(dir.tags_file(), tmp.path().join("tags.json"));
    }

    #[test]
    fn subdirectories_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        let docs = dir.docs_dir().unwrap();
        let index = dir.index_dir().unwrap();

        assert!(docs.exists());
        assert!(index.exists());
        assert_eq!(docs, tmp.path().join("docs"));
        assert_eq!(index, tmp.path().join("index"));
    }
}
