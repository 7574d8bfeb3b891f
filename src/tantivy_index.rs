use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use serde::Serialize;
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::*,
    tokenizer::{
        LowerCaser,
        RawTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{error::Result, meta_db::DocumentRecord};

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const FILENAME: &str = "filename";
    pub const TAG: &str = "tag";
    pub const CONTENT: &str = "content";
}

/// A derived, non-authoritative projection of a document, upserted into
/// the index keyed by id. `content` is indexed but never stored and is
/// currently always written empty (extraction is an external concern).
#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub tag: String,
    pub content: String,
}

impl IndexEntry {
    /// Project a metadata record into an index entry with empty content.
    pub fn from_record(record: &DocumentRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            filename: record.filename.clone(),
            tag: record.tag.clone(),
            content: String::new(),
        }
    }
}

/// A ranked match from the index.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub score: f32,
    pub id: String,
    pub title: String,
    pub filename: String,
    pub tag: String,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    title: Field,
    filename: Field,
    tag: Field,
    content: Field,
}

/// Derived full-text index over title, filename and tag.
///
/// All mutations go through a single writer behind a mutex;
/// [`SearchIndex::rebuild_from`] holds it across the whole
/// clear-then-rewrite sequence so a concurrent upsert or delete can
/// neither be dropped by the clear nor resurrect a removed document.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
    writer: Mutex<IndexWriter>,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);

    let stem_opts = || {
        TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("en_stem")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored()
    };
    let title = builder.add_text_field(fields::TITLE, stem_opts());
    let filename = builder.add_text_field(fields::FILENAME, stem_opts());

    let tag_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("tag")
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();
    let tag = builder.add_text_field(fields::TAG, tag_opts);

    let content_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let content = builder.add_text_field(fields::CONTENT, content_opts);

    let schema = builder.build();
    let fields = SchemaFields {
        id,
        title,
        filename,
        tag,
        content,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);

    // Tags match exactly, case-insensitively: one lowercased token.
    let tag = TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register("tag", tag);
}

impl SearchIndex {
    /// Open or create a search index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index, schema)
    }

    /// Create an in-memory search index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: Schema) -> Result<Self> {
        register_tokenizers(&index);
        let reader = index.reader()?;
        let writer = index.writer(WRITER_MEMORY_BUDGET)?;

        Ok(Self {
            index,
            reader,
            schema,
            writer: Mutex::new(writer),
        })
    }

    fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            id: f(fields::ID),
            title: f(fields::TITLE),
            filename: f(fields::FILENAME),
            tag: f(fields::TAG),
            content: f(fields::CONTENT),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, IndexWriter> {
        // A poisoned lock means a prior panic mid-mutation; the writer
        // itself stays usable, uncommitted changes are simply lost.
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn add_entry(
        &self,
        writer: &IndexWriter,
        entry: &IndexEntry,
    ) -> Result<()> {
        let f = self.fields();

        // Delete any existing document with this id first: an upsert is
        // keyed by id and at most one live entry per id may exist.
        let term = tantivy::Term::from_field_text(f.id, &entry.id);
        writer.delete_term(term);

        writer.add_document(doc!(
            f.id => entry.id.as_str(),
            f.title => entry.title.as_str(),
            f.filename => entry.filename.as_str(),
            f.tag => entry.tag.as_str(),
            f.content => entry.content.as_str(),
        ))?;

        Ok(())
    }

    /// Insert or replace the entry for `entry.id`.
    pub fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut writer = self.lock_writer();
        self.add_entry(&writer, entry)?;
        writer.commit()?;
        Ok(())
    }

    /// Remove the entry for `id`, if any.
    pub fn delete(&self, id: &str) -> Result<()> {
        let f = self.fields();
        let mut writer = self.lock_writer();
        let term = tantivy::Term::from_field_text(f.id, id);
        writer.delete_term(term);
        writer.commit()?;
        Ok(())
    }

    /// Wipe the index back to an empty state.
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.lock_writer();
        writer.delete_all_documents()?;
        writer.commit()?;
        Ok(())
    }

    /// Clear the index and write one entry per given record projection,
    /// all under a single writer lock and a single commit.
    pub fn rebuild_from(&self, entries: &[IndexEntry]) -> Result<usize> {
        let mut writer = self.lock_writer();
        writer.delete_all_documents()?;
        for entry in entries {
            self.add_entry(&writer, entry)?;
        }
        writer.commit()?;
        Ok(entries.len())
    }

    /// Search with BM25 scoring over title, filename and content, with
    /// an optional exact (case-insensitive) tag filter. The `title`
    /// field is boosted 2x.
    pub fn search(
        &self,
        query_str: &str,
        tag: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Hit>> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let mut parser = QueryParser::for_index(
            &self.index,
            vec![f.title, f.filename, f.content],
        );
        parser.set_field_boost(f.title, 2.0);

        let (user_query, _errors) = parser.parse_query_lenient(query_str);

        let query: Box<dyn tantivy::query::Query> = if let Some(tag) = tag {
            let tag_term =
                tantivy::Term::from_field_text(f.tag, &tag.to_lowercase());
            let tag_query = tantivy::query::TermQuery::new(
                tag_term,
                IndexRecordOption::Basic,
            );
            Box::new(tantivy::query::BooleanQuery::new(vec![
                (tantivy::query::Occur::Must, user_query),
                (tantivy::query::Occur::Must, Box::new(tag_query)),
            ]))
        } else {
            user_query
        };

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(Hit {
                score,
                id: extract_text(&doc, f.id),
                title: extract_text(&doc, f.title),
                filename: extract_text(&doc, f.filename),
                tag: extract_text(&doc, f.tag),
            });
        }

        Ok(results)
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
