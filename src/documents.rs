//! Knowledge documents: free text stored with an embedding and retrieved by
//! cosine similarity.
//!
//! Documents are deduplicated on the SHA-256 of their content; saving the
//! same text twice returns the existing row. Search is brute force over
//! every stored vector, which is fine for a college-sized corpus.

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_one, vec_to_blob};
use crate::embedding::{EmbeddingProvider, InputKind};
use crate::models::{DocumentMatch, KnowledgeDocument};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct SavedDocument {
    pub document: KnowledgeDocument,
    /// False when identical content was already stored.
    pub created: bool,
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn save_document(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    content: &str,
    metadata: Value,
) -> Result<SavedDocument> {
    if content.trim().is_empty() {
        bail!("Document content must not be empty");
    }

    let hash = content_hash(content);
    if let Some(existing) = find_by_hash(pool, &hash).await? {
        debug!(id = %existing.id, "document already stored");
        return Ok(SavedDocument {
            document: existing,
            created: false,
        });
    }

    let embedding = embed_one(provider, content, InputKind::Document).await?;
    if provider.dims() > 0 && embedding.len() != provider.dims() {
        bail!(
            "Embedding has {} dimensions, expected {}",
            embedding.len(),
            provider.dims()
        );
    }

    let metadata = match metadata {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let document = KnowledgeDocument {
        id: Uuid::new_v4().to_string(),
        content: content.to_string(),
        metadata,
        created_at: Utc::now().timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO documents (id, content, metadata_json, embedding, model, dims, content_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document.id)
    .bind(&document.content)
    .bind(serde_json::to_string(&document.metadata)?)
    .bind(vec_to_blob(&embedding))
    .bind(provider.model_name())
    .bind(embedding.len() as i64)
    .bind(&hash)
    .bind(document.created_at)
    .execute(pool)
    .await?;

    Ok(SavedDocument {
        document,
        created: true,
    })
}

/// Documents most similar to `query`, best first.
pub async fn search_documents(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    limit: usize,
) -> Result<Vec<DocumentMatch>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_one(provider, query, InputKind::Query).await?;

    let rows = sqlx::query("SELECT id, content, metadata_json, embedding FROM documents")
        .fetch_all(pool)
        .await?;

    let mut matches: Vec<DocumentMatch> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            DocumentMatch {
                id: row.get("id"),
                content: row.get("content"),
                metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
                score: cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64,
            }
        })
        .collect();

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(limit);
    Ok(matches)
}

pub async fn count_documents(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn find_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<KnowledgeDocument>> {
    let row = sqlx::query(
        "SELECT id, content, metadata_json, created_at FROM documents WHERE content_hash = ?",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let metadata_json: String = row.get("metadata_json");
        KnowledgeDocument {
            id: row.get("id"),
            content: row.get("content"),
            metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
            created_at: row.get("created_at"),
        }
    }))
}
