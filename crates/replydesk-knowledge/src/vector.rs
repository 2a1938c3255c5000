//! sqlite-vec plumbing for the knowledge index.
//!
//! Embeddings live in a `vec0` virtual table keyed by the knowledge item id,
//! so a nearest-neighbour query returns ids that join straight back onto
//! `knowledge_items`.

use rusqlite::{Connection, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::Result;

/// Upper bound sqlite-vec accepts for a KNN `LIMIT`.
pub const MAX_KNN_LIMIT: usize = 4096;

/// Register sqlite-vec for every connection opened afterwards.
///
/// `sqlite3_auto_extension` is process-global; calling it more than once
/// is harmless.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Version string reported by the loaded extension.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS item_embeddings USING vec0(
            item_id TEXT PRIMARY KEY,
            embedding float[{dims}]
        )
        "#
    );
    conn.execute_batch(&sql)?;

    debug!(dims, "item_embeddings table ready");
    Ok(())
}

pub fn drop_vector_table(conn: &Connection) -> Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS item_embeddings")?;
    info!("Dropped item_embeddings table");
    Ok(())
}

/// Insert the embedding for a new item.
///
/// Items are immutable, so there is no replace path.
pub fn insert_embedding(conn: &Connection, item_id: &str, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "INSERT INTO item_embeddings (item_id, embedding) VALUES (?1, ?2)",
        params![item_id, embedding.as_bytes()],
    )?;
    Ok(())
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub item_id: String,
    /// L2 distance from the query vector (lower = more similar).
    pub distance: f32,
}

/// Top-`limit` items nearest to `query_embedding`, ascending by distance.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<SimilarityResult>> {
    let limit = limit.min(MAX_KNN_LIMIT);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT item_id, distance
        FROM item_embeddings
        WHERE embedding MATCH ?1
        ORDER BY distance
        LIMIT ?2
        "#,
    )?;

    let rows = stmt.query_map(params![query_embedding.as_bytes(), limit as i64], |row| {
        Ok(SimilarityResult {
            item_id: row.get(0)?,
            distance: row.get(1)?,
        })
    })?;
    let results = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(found = results.len(), limit, "Vector search complete");
    Ok(results)
}

pub fn count_embeddings(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM item_embeddings", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}
