use std::path::PathBuf;

use crate::error::Result;

/// Advisory set of known tag names, persisted as a JSON array.
///
/// The registry is a suggestion list for the UI layer; assigning a tag
/// to a document is never validated against it. Names are
/// case-sensitive, listed sorted case-insensitively.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    path: PathBuf,
}

impl TagRegistry {
    pub fn open(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            std::fs::write(&path, "[]")?;
        }
        Ok(Self { path })
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(&self.path)?;
        let names: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names.dedup();
        Ok(names)
    }

    pub fn add(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let mut names = self.list()?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            names.sort_by_key(|n| n.to_lowercase());
        }
        self.save(&names)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let name = name.trim();
        let names: Vec<String> =
            self.list()?.into_iter().filter(|n| n != name).collect();
        self.save(&names)
    }

    fn save(&self, names: &[String]) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_string(names)?)?;
        Ok(())
    }
}
