use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    blob_store::{BlobStore, sha256_hex},
    config::{UploadPolicy, split_filename},
    data_dir::DataDir,
    doc_id::DocumentId,
    error::{Error, Result},
    meta_db::{DocumentRecord, MetaDb, unix_now},
    tag_registry::TagRegistry,
    tantivy_index::{Hit, IndexEntry, SearchIndex},
};

/// The consistency orchestrator over the blob store, the metadata store
/// and the search index.
///
/// Per operation, the metadata store is the authoritative step: a blob
/// write failing aborts Create before metadata exists, and index writes
/// are best-effort everywhere except the explicit reindex. There is no
/// rollback across stores; a swallowed index failure leaves drift that
/// only [`DocStore::reindex`] repairs.
pub struct DocStore {
    blobs: BlobStore,
    meta: MetaDb,
    index: SearchIndex,
    tags: TagRegistry,
    policy: UploadPolicy,
}

/// Map the UI's "all" sentinel (any case) and surrounding whitespace to
/// the untagged empty string.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    if tag.eq_ignore_ascii_case("all") {
        String::new()
    } else {
        tag.to_string()
    }
}

/// Turn a tag filter argument into an actual filter: empty and "all"
/// mean no filtering.
fn tag_filter(tag: Option<&str>) -> Option<&str> {
    match tag {
        Some(t) => {
            let t = t.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("all") {
                None
            } else {
                Some(t)
            }
        }
        None => None,
    }
}

/// Outcome of a [`DocStore::verify`] pass. Never mutates anything.
#[derive(Debug, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    MissingBlob {
        id: String,
    },
    SizeMismatch {
        id: String,
        expected: u64,
        actual: u64,
    },
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },
}

impl DocStore {
    /// Open all stores under the given data directory.
    pub fn open(data_dir: &DataDir, policy: UploadPolicy) -> Result<Self> {
        Ok(Self {
            blobs: BlobStore::open(data_dir.docs_dir()?)?,
            meta: MetaDb::open(&data_dir.meta_db())?,
            index: SearchIndex::open(&data_dir.index_dir()?)?,
            tags: TagRegistry::open(data_dir.tags_file())?,
            policy,
        })
    }

    /// Store a new document: validate, write the blob, record metadata,
    /// then index best-effort.
    ///
    /// Validation rejects before any write. A blob write failure aborts
    /// with nothing recorded. A metadata failure leaves the blob
    /// orphaned on disk (logged, not cleaned up). An index failure is
    /// swallowed so the document stays usable for browsing and export.
    pub fn create(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<DocumentRecord> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(Error::Validation("filename is required".into()));
        }
        let (title, ext) = split_filename(filename);
        if !self.policy.allows_ext(&ext) {
            return Err(Error::Validation(format!(
                "unsupported file type: {}",
                if ext.is_empty() { "(none)" } else { &ext }
            )));
        }
        if bytes.len() as u64 > self.policy.max_bytes {
            return Err(Error::Validation(format!(
                "file too large: {} bytes (limit {})",
                bytes.len(),
                self.policy.max_bytes
            )));
        }

        let id = DocumentId::generate();
        let blob_path = self.blobs.put(id.as_str(), &ext, bytes)?;

        // Size and checksum come from the stored blob, not the request
        // payload, so the record describes what is actually on disk.
        let stored = self.blobs.get(id.as_str(), &ext)?;
        let now = unix_now();
        let record = DocumentRecord {
            id: id.to_string(),
            filename: filename.to_string(),
            title,
            ext,
            size: stored.len() as u64,
            tag: String::new(),
            sha256: sha256_hex(&stored),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.meta.insert(&record) {
            warn!(
                id = %record.id,
                blob = %blob_path.display(),
                "metadata insert failed; blob left orphaned"
            );
            return Err(err);
        }

        if let Err(err) = self.index.upsert(&IndexEntry::from_record(&record))
        {
            warn!(
                id = %record.id,
                error = %err,
                "search index update failed; document remains available, \
                 run reindex to repair"
            );
        }

        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<DocumentRecord> {
        self.meta.get(id)?.ok_or_else(|| Error::NotFound {
            kind: "document",
            name: id.to_string(),
        })
    }

    /// Fetch a record together with its blob bytes. A record whose blob
    /// has gone missing surfaces here as a blob NotFound; the metadata
    /// row is left untouched.
    pub fn read_content(&self, id: &str) -> Result<(DocumentRecord, Vec<u8>)> {
        let record = self.get(id)?;
        let bytes = self.blobs.get(&record.id, &record.ext)?;
        Ok((record, bytes))
    }

    /// Where the blob for a record lives, for download/export callers.
    pub fn blob_path(&self, record: &DocumentRecord) -> PathBuf {
        self.blobs.path(&record.id, &record.ext)
    }

    /// All records, most recently updated first, optionally filtered to
    /// an exact (case-insensitive) tag. A filter of "all" lists
    /// everything.
    pub fn list(&self, tag: Option<&str>) -> Result<Vec<DocumentRecord>> {
        let records = self.meta.list_all()?;
        Ok(match tag_filter(tag) {
            None => records,
            Some(t) => records
                .into_iter()
                .filter(|r| r.tag.eq_ignore_ascii_case(t))
                .collect(),
        })
    }

    /// Re-tag a document. "all" (any case) clears the tag. The index
    /// update is best-effort, as in [`DocStore::create`].
    pub fn set_tag(&self, id: &str, tag: &str) -> Result<DocumentRecord> {
        self.get(id)?;
        let value = normalize_tag(tag);
        self.meta.set_tag(id, &value)?;
        let record = self.get(id)?;

        if let Err(err) = self.index.upsert(&IndexEntry::from_record(&record))
        {
            warn!(
                id = %record.id,
                error = %err,
                "search index update failed; document remains available, \
                 run reindex to repair"
            );
        }

        Ok(record)
    }

    /// Remove a document. Deleting the metadata row is the one
    /// authoritative step; blob and index removal are advisory cleanups
    /// whose failures are tolerated.
    pub fn delete(&self, id: &str) -> Result<()> {
        let record = self.get(id)?;

        match self.blobs.delete(&record.id, &record.ext) {
            Ok(()) => {}
            Err(Error::NotFound { .. }) => {
                debug!(id = %record.id, "blob already missing on delete");
            }
            Err(err) => {
                warn!(id = %record.id, error = %err, "blob removal failed");
            }
        }

        self.meta.remove(id)?;

        if let Err(err) = self.index.delete(id) {
            warn!(
                id = %record.id,
                error = %err,
                "search index removal failed; run reindex to repair"
            );
        }

        Ok(())
    }

    /// Rebuild the search index from the metadata store: the sole
    /// repair mechanism for index drift. Unlike the per-document
    /// operations, index failures here are surfaced to the caller.
    pub fn reindex(&self) -> Result<usize> {
        let entries: Vec<IndexEntry> = self
            .meta
            .list_all()?
            .iter()
            .map(IndexEntry::from_record)
            .collect();
        self.index.rebuild_from(&entries)
    }

    pub fn search(
        &self,
        query: &str,
        tag: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Hit>> {
        self.index.search(query, tag_filter(tag), limit)
    }

    /// Check every record against its blob: existence, size, checksum.
    /// Purely diagnostic; repairing is left to the operator.
    pub fn verify(&self) -> Result<IntegrityReport> {
        let records = self.meta.list_all()?;
        let mut report = IntegrityReport {
            checked: records.len(),
            issues: Vec::new(),
        };

        for record in &records {
            let bytes = match self.blobs.get(&record.id, &record.ext) {
                Ok(bytes) => bytes,
                Err(Error::NotFound { .. }) => {
                    report.issues.push(IntegrityIssue::MissingBlob {
                        id: record.id.clone(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            if bytes.len() as u64 != record.size {
                report.issues.push(IntegrityIssue::SizeMismatch {
                    id: record.id.clone(),
                    expected: record.size,
                    actual: bytes.len() as u64,
                });
            }
            let actual = sha256_hex(&bytes);
            if actual != record.sha256 {
                report.issues.push(IntegrityIssue::ChecksumMismatch {
                    id: record.id.clone(),
                    expected: record.sha256.clone(),
                    actual,
                });
            }
        }

        Ok(report)
    }

    pub fn tag_registry(&self) -> &TagRegistry {
        &self.tags
    }
}

impl std::fmt::Debug for DocStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStore").finish_non_exhaustive()
    }
}
