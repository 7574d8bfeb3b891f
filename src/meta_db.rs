use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");

/// The authoritative record of one managed document.
///
/// `tag` is the only field that changes after creation; `updated_at`
/// advances with it. Everything else is fixed when the blob is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub ext: String,
    pub size: u64,
    pub tag: String,
    pub sha256: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DocumentRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Authoritative metadata store, one redb table keyed by document id.
/// Every operation is a single auto-committed transaction touching one
/// row; concurrent tag updates are last-writer-wins.
pub struct MetaDb {
    db: Database,
}

impl MetaDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure the table exists by opening it in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn insert(&self, record: &DocumentRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(record.id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(DocumentRecord::from_bytes(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Set the tag on a row and advance its `updated_at`.
    /// Returns false if no such document exists.
    pub fn set_tag(&self, id: &str, tag: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(DOCUMENTS)?;
            let existing = table.get(id)?.map(|g| g.value().to_vec());
            match existing {
                None => false,
                Some(bytes) => {
                    let mut record = DocumentRecord::from_bytes(&bytes)?;
                    record.tag = tag.to_string();
                    record.updated_at = unix_now();
                    table.insert(id, record.to_bytes()?.as_slice())?;
                    true
                }
            }
        };
        txn.commit()?;
        Ok(updated)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.remove(id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All records, most recently updated first. Ties within one second
    /// break on id so listings stay deterministic.
    pub fn list_all(&self) -> Result<Vec<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            records.push(DocumentRecord::from_bytes(v.value())?);
        }
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }
}

impl std::fmt::Debug for MetaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, MetaDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = MetaDb::open(&tmp.path().join("docs.redb")).unwrap();
        (tmp, db)
    }

    fn make_record(id: &str, updated_at: u64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            filename: format!("{id}.txt"),
            title: id.to_string(),
            ext: ".txt".to_string(),
            size: 42,
            tag: String::new(),
            sha256: "00".repeat(32),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn insert_then_get() {
        let (_tmp, db) = test_db();
        let record = make_record("abc123", 1000);
        db.insert(&record).unwrap();

        assert_eq!(db.get("abc123").unwrap(), Some(record));
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn set_tag_advances_updated_at() {
        let (_tmp, db) = test_db();
        db.insert(&make_record("abc", 1000)).unwrap();

        assert!(db.set_tag("abc", "finance").unwrap());
        let record = db.get("abc").unwrap().unwrap();
        assert_eq!(record.tag, "finance");
        assert!(record.updated_at >= record.created_at);

        assert!(!db.set_tag("missing", "finance").unwrap());
    }

    #[test]
    fn remove_row() {
        let (_tmp, db) = test_db();
        db.insert(&make_record("abc", 1000)).unwrap();

        assert!(db.remove("abc").unwrap());
        assert!(!db.remove("abc").unwrap());
        assert_eq!(db.get("abc").unwrap(), None);
    }

    #[test]
    fn list_all_orders_by_updated_at_desc() {
        let (_tmp, db) = test_db();
        db.insert(&make_record("old", 1000)).unwrap();
        db.insert(&make_record("new", 3000)).unwrap();
        db.insert(&make_record("mid", 2000)).unwrap();

        let ids: Vec<_> =
            db.list_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn list_all_breaks_ties_on_id() {
        let (_tmp, db) = test_db();
        db.insert(&make_record("bbb", 1000)).unwrap();
        db.insert(&make_record("aaa", 1000)).unwrap();

        let ids: Vec<_> =
            db.list_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["aaa", "bbb"]);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docs.redb");

        {
            let db = MetaDb::open(&path).unwrap();
            db.insert(&make_record("abc", 1000)).unwrap();
        }

        {
            let db = MetaDb::open(&path).unwrap();
            let record = db.get("abc").unwrap().unwrap();
            assert_eq!(record.filename, "abc.txt");
        }
    }

    #[test]
    fn record_roundtrip() {
        let record = make_record("abc", 1234);
        let bytes = record.to_bytes().unwrap();
        assert_eq!(DocumentRecord::from_bytes(&bytes).unwrap(), record);
    }
}
