//! Knowledge store backed by SQLite and sqlite-vec.
//!
//! Items live in `knowledge_items`; their embeddings live in the
//! `item_embeddings` vec0 table under the same id. Ingestion is
//! skip-if-present per kind: if any email (or any document chunk) is
//! already stored, the corresponding ingest call writes nothing and reports
//! the existing count. [`KnowledgeStore::reset`] is the only way to rebuild.
//!
//! The embedding width and provider are recorded in `meta`. Opening a store
//! with a different embedder marks it stale: queries return nothing and
//! ingestion fails until the store is reset.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use replydesk_llm::SharedEmbedder;

use crate::chunker::Chunker;
use crate::error::{ExtractFailure, ExtractionError, KnowledgeError, Result};
use crate::extract::ExtractorRegistry;
use crate::types::{
    DocumentIngestReport, EmailPair, IngestOutcome, ItemKind, KnowledgeItem, KnowledgeStats,
    SourceDocument,
};
use crate::vector;

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Texts embedded per embedder call during ingestion.
const EMBED_BATCH_SIZE: usize = 32;

/// One nearest-neighbour result with its raw distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub item: KnowledgeItem,
    pub distance: f32,
}

/// Persistent vector index of historical emails and document chunks.
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
    embedder: SharedEmbedder,
    chunker: Chunker,
    extractors: ExtractorRegistry,
    stale: AtomicBool,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("embedder", &self.embedder.name())
            .field("dimensions", &self.embedder.dimensions())
            .field("chunker", &self.chunker)
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl KnowledgeStore {
    /// Open or create a store at `path`, embedding with `embedder`.
    pub fn open(path: impl AsRef<Path>, embedder: SharedEmbedder) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        vector::init_vector_extension();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self::from_connection(conn, embedder)?;
        info!(path = %path.display(), "Knowledge store opened");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory(embedder: SharedEmbedder) -> Result<Self> {
        vector::init_vector_extension();
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, embedder)
    }

    fn from_connection(conn: Connection, embedder: SharedEmbedder) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            embedder,
            chunker: Chunker::default(),
            extractors: ExtractorRegistry::default(),
            stale: AtomicBool::new(false),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Replace the chunker used for document ingestion.
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Replace the extractor registry used by the folder loader.
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        create_schema(&conn)?;
        self.init_vectors(&conn)
    }

    /// Create the vec0 table for the current embedder, or flag the store as
    /// stale if it was built with another one.
    fn init_vectors(&self, conn: &Connection) -> Result<()> {
        let dims = self.embedder.dimensions();
        let provider = self.embedder.name();

        if let Some((stored_dims, stored_provider)) = stored_embedding_meta(conn)?
            && (stored_dims != dims || stored_provider != provider)
        {
            warn!(
                stored_dims,
                stored_provider = %stored_provider,
                configured_dims = dims,
                configured_provider = provider,
                "Embedder changed since the knowledge index was built. \
                 Search disabled until reset. Run `replydesk ingest --reset`."
            );
            self.stale.store(true, Ordering::Relaxed);
            return Ok(());
        }

        vector::create_vector_table(conn, dims)?;
        write_embedding_meta(conn, dims, provider)?;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current_version >= SCHEMA_VERSION {
        debug!(version = current_version, "Knowledge schema up to date");
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_items (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('email', 'doc')),
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_knowledge_items_kind
            ON knowledge_items(kind);

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(version = SCHEMA_VERSION, "Knowledge schema created");
    Ok(())
}

fn stored_embedding_meta(conn: &Connection) -> Result<Option<(usize, String)>> {
    let get = |key: &str| -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    };

    let Some(dims) = get("embedding.dimensions")? else {
        return Ok(None);
    };
    let dims = dims
        .parse::<usize>()
        .map_err(|_| KnowledgeError::InvalidData(format!("bad embedding.dimensions: {dims}")))?;
    let provider = get("embedding.provider")?.unwrap_or_default();
    Ok(Some((dims, provider)))
}

fn write_embedding_meta(conn: &Connection, dims: usize, provider: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.dimensions', ?1)",
        params![dims.to_string()],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding.provider', ?1)",
        params![provider],
    )?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingestion
// ─────────────────────────────────────────────────────────────────────────────

impl KnowledgeStore {
    /// Index historical query/reply pairs as `email_{i}` in input order.
    ///
    /// No-op when any email is already stored.
    pub async fn ingest_emails(&self, pairs: &[EmailPair]) -> Result<IngestOutcome> {
        let existing = self.count(ItemKind::Email)?;
        if existing > 0 {
            info!(existing, "Emails already indexed, skipping ingestion");
            return Ok(IngestOutcome::AlreadyPresent(existing));
        }
        self.ensure_fresh()?;

        let items: Vec<KnowledgeItem> = pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| KnowledgeItem::email(i, pair))
            .collect();
        let inserted = self.insert_items(&items).await?;

        info!(inserted, "Indexed historical emails");
        Ok(IngestOutcome::Inserted(inserted))
    }

    /// Extract, chunk and index documents as `chunk_{n}`, numbered
    /// sequentially across files in filename order.
    ///
    /// Files with no registered extractor are skipped. A file that fails to
    /// extract becomes a warning in the report. No-op when any document
    /// chunk is already stored.
    pub async fn ingest_documents(&self, docs: &[SourceDocument]) -> Result<DocumentIngestReport> {
        if let Some(report) = self.documents_already_present()? {
            return Ok(report);
        }
        self.index_documents(docs, Vec::new()).await
    }

    /// Load every supported file in `folder` and index it.
    ///
    /// A missing folder indexes nothing. Unreadable files become warnings.
    pub async fn ingest_folder(&self, folder: impl AsRef<Path>) -> Result<DocumentIngestReport> {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            info!(folder = %folder.display(), "Document folder not found, skipping");
            return Ok(DocumentIngestReport::default());
        }
        if let Some(report) = self.documents_already_present()? {
            return Ok(report);
        }

        let entries = std::fs::read_dir(folder).map_err(|source| KnowledgeError::Folder {
            path: folder.to_path_buf(),
            source,
        })?;

        let mut docs = Vec::new();
        let mut warnings = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| KnowledgeError::Folder {
                path: folder.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !self.extractors.supports(&filename) {
                debug!(file = %filename, "Unsupported extension, skipping");
                continue;
            }
            match std::fs::read(&path) {
                Ok(bytes) => docs.push(SourceDocument::new(filename, bytes)),
                Err(e) => {
                    warn!(file = %filename, error = %e, "Failed to read document");
                    warnings.push(ExtractionError::new(filename, ExtractFailure::Io(e)));
                }
            }
        }

        self.index_documents(&docs, warnings).await
    }

    fn documents_already_present(&self) -> Result<Option<DocumentIngestReport>> {
        let existing = self.count(ItemKind::DocChunk)?;
        if existing == 0 {
            return Ok(None);
        }
        info!(existing, "Document chunks already indexed, skipping ingestion");
        Ok(Some(DocumentIngestReport {
            already_present: Some(existing),
            ..Default::default()
        }))
    }

    async fn index_documents(
        &self,
        docs: &[SourceDocument],
        mut warnings: Vec<ExtractionError>,
    ) -> Result<DocumentIngestReport> {
        if docs.is_empty() {
            return Ok(DocumentIngestReport {
                warnings,
                ..Default::default()
            });
        }
        self.ensure_fresh()?;

        let mut ordered: Vec<&SourceDocument> = docs.iter().collect();
        ordered.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut items = Vec::new();
        let mut files = 0;
        for doc in ordered {
            let text = match self.extractors.extract(doc) {
                None => {
                    debug!(file = %doc.filename, "Unsupported extension, skipping");
                    continue;
                }
                Some(Err(e)) => {
                    warn!(file = %e.filename, error = %e.source, "Failed to extract document text");
                    warnings.push(e);
                    continue;
                }
                Some(Ok(text)) => text,
            };

            let before = items.len();
            for chunk in self.chunker.chunk(&text) {
                if chunk.trim().is_empty() {
                    continue;
                }
                items.push(KnowledgeItem::doc_chunk(items.len(), chunk, &doc.filename));
            }
            if items.len() > before {
                files += 1;
            }
            debug!(file = %doc.filename, chunks = items.len() - before, "Chunked document");
        }

        let chunks = self.insert_items(&items).await?;
        info!(files, chunks, warnings = warnings.len(), "Indexed documents");
        Ok(DocumentIngestReport {
            files,
            chunks,
            already_present: None,
            warnings,
        })
    }

    /// Embed and insert items in one transaction.
    async fn insert_items(&self, items: &[KnowledgeItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut embeddings = Vec::with_capacity(items.len());
        for batch in items.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|item| item.text.as_str()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).await?);
        }
        if embeddings.len() != items.len() {
            return Err(KnowledgeError::InvalidData(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                items.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimensions(embedding)?;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (item, embedding) in items.iter().zip(&embeddings) {
            tx.execute(
                "INSERT INTO knowledge_items (id, kind, source, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![item.id, item.kind.as_str(), item.source, item.text, now],
            )?;
            vector::insert_embedding(&tx, &item.id, embedding)?;
        }
        tx.commit()?;

        Ok(items.len())
    }

    fn ensure_fresh(&self) -> Result<()> {
        if !self.is_stale() {
            return Ok(());
        }
        let conn = self.conn.lock();
        let (stored_dims, stored_provider) = stored_embedding_meta(&conn)?.unwrap_or_default();
        Err(KnowledgeError::StaleIndex {
            stored_dims,
            stored_provider,
        })
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(KnowledgeError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query
// ─────────────────────────────────────────────────────────────────────────────

impl KnowledgeStore {
    /// Up to `top_k` items nearest to `text`, ascending by distance.
    ///
    /// An empty or stale store returns no results without calling the
    /// embedder.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<Neighbor>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if self.is_stale() {
            warn!("Knowledge index is stale, returning no results");
            return Ok(Vec::new());
        }

        let total = {
            let conn = self.conn.lock();
            vector::count_embeddings(&conn)?
        };
        if total == 0 {
            debug!("Knowledge store is empty");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(text).await?;
        self.check_dimensions(&embedding)?;

        let conn = self.conn.lock();
        let hits = vector::search_similar(&conn, &embedding, top_k.min(total))?;

        let mut stmt =
            conn.prepare("SELECT id, kind, source, text FROM knowledge_items WHERE id = ?1")?;
        let mut neighbors = Vec::with_capacity(hits.len());
        for hit in hits {
            let item = stmt
                .query_row(params![hit.item_id], row_to_item)
                .optional()?;
            match item {
                Some(item) => neighbors.push(Neighbor {
                    item,
                    distance: hit.distance,
                }),
                None => warn!(id = %hit.item_id, "Embedding has no matching item"),
            }
        }
        Ok(neighbors)
    }

    /// Fetch one item by id.
    pub fn get(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, kind, source, text FROM knowledge_items WHERE id = ?1",
                params![id],
                row_to_item,
            )
            .optional()?)
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    let kind: String = row.get(1)?;
    let kind = ItemKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown item kind: {kind}").into(),
        )
    })?;
    Ok(KnowledgeItem {
        id: row.get(0)?,
        kind,
        source: row.get(2)?,
        text: row.get(3)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance
// ─────────────────────────────────────────────────────────────────────────────

impl KnowledgeStore {
    /// Number of stored items of `kind`.
    pub fn count(&self, kind: ItemKind) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM knowledge_items WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// True when the stored embeddings came from a different embedder.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Result<KnowledgeStats> {
        let emails = self.count(ItemKind::Email)?;
        let doc_chunks = self.count(ItemKind::DocChunk)?;
        let stale = self.is_stale();

        let conn = self.conn.lock();
        let (dimensions, provider) = stored_embedding_meta(&conn)?
            .unwrap_or_else(|| (self.embedder.dimensions(), self.embedder.name().to_string()));
        let embeddings = if stale {
            emails + doc_chunks
        } else {
            vector::count_embeddings(&conn)?
        };

        Ok(KnowledgeStats {
            emails,
            doc_chunks,
            embeddings,
            dimensions,
            provider,
            stale,
        })
    }

    /// Chunk counts per source file, by file name.
    pub fn doc_sources(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM knowledge_items
             WHERE kind = 'doc' GROUP BY source ORDER BY source",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, count as usize))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete every item and rebuild the vector table for the current
    /// embedder. Clears the stale flag.
    pub fn reset(&self) -> Result<()> {
        let dims = self.embedder.dimensions();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM knowledge_items", [])?;
        vector::drop_vector_table(&tx)?;
        vector::create_vector_table(&tx, dims)?;
        write_embedding_meta(&tx, dims, self.embedder.name())?;
        tx.commit()?;

        self.stale.store(false, Ordering::Relaxed);
        info!(dims, provider = self.embedder.name(), "Knowledge store reset");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
