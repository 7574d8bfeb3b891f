//! docstash - a personal document stash with full-text search.
//!
//! Files are stored as blobs on disk, described by an authoritative
//! metadata store ([redb](https://github.com/cberner/redb)) and made
//! searchable through a derived, always-rebuildable
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index. The
//! [`DocStore`] orchestrator sequences writes across the three stores
//! and owns the failure policy: metadata is authoritative, index writes
//! are best-effort, and a full reindex repairs any drift.
//!
//! # Quick start
//!
//! ```no_run
//! use docstash::{DataDir, DocStore, UploadPolicy};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = DocStore::open(&data_dir, UploadPolicy::default()).unwrap();
//!
//! let record = store.create("report.pdf", b"...pdf bytes...").unwrap();
//! store.set_tag(&record.id, "finance").unwrap();
//!
//! for hit in store.search("report", Some("finance"), 10).unwrap() {
//!     println!("{} {} ({})", hit.id, hit.title, hit.filename);
//! }
//! ```

pub mod backup;
pub mod blob_store;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod doc_id;
pub mod error;
pub mod meta_db;
pub mod store;
pub mod tag_registry;
pub mod tantivy_index;

pub use blob_store::BlobStore;
pub use config::UploadPolicy;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use error::{Error, Result};
pub use meta_db::{DocumentRecord, MetaDb};
pub use store::DocStore;
pub use tag_registry::TagRegistry;
pub use tantivy_index::SearchIndex;
