//! Lecture storage and the time-limited lecture cache.
//!
//! Lectures are read through the [`LectureSource`] trait so the chat
//! pipeline does not care where the timetable lives. [`SqliteLectureStore`]
//! is the production backend; [`InMemoryLectures`] serves tests and
//! embedders that already hold the timetable.
//!
//! [`LectureCache`] keeps the most recent fetch for a fixed TTL. If a
//! refresh fails, the previous list keeps being served (stale) and the next
//! call tries again.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::CachedData;
use crate::clock::Clock;
use crate::models::Lecture;

/// A read-only supplier of timetable rows.
#[async_trait]
pub trait LectureSource: Send + Sync {
    /// Up to `limit` lectures in storage order.
    async fn fetch(&self, limit: i64) -> Result<Vec<Lecture>>;
}

// ============ SQLite ============

pub struct SqliteLectureStore {
    pool: SqlitePool,
}

impl SqliteLectureStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append lectures in one transaction. Returns the number inserted.
    pub async fn insert_lectures(&self, lectures: &[Lecture]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for lecture in lectures {
            sqlx::query(
                r#"
                INSERT INTO lectures
                    (department, lecture_time, day, level, lecture_title, instructor, room, study_type)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&lecture.department)
            .bind(&lecture.lecture_time)
            .bind(&lecture.day)
            .bind(&lecture.level)
            .bind(&lecture.lecture_title)
            .bind(&lecture.instructor)
            .bind(&lecture.room)
            .bind(&lecture.study_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(lectures.len() as u64)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lectures")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete every lecture. Returns the number removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lectures")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LectureSource for SqliteLectureStore {
    async fn fetch(&self, limit: i64) -> Result<Vec<Lecture>> {
        let rows = sqlx::query(
            r#"
            SELECT department, lecture_time, day, level, lecture_title, instructor, room, study_type
            FROM lectures
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Lecture {
                department: row.get("department"),
                lecture_time: row.get("lecture_time"),
                day: row.get("day"),
                level: row.get("level"),
                lecture_title: row.get("lecture_title"),
                instructor: row.get("instructor"),
                room: row.get("room"),
                study_type: row.get("study_type"),
            })
            .collect())
    }
}

/// Read a JSON array of lecture objects. Missing fields default to blank.
pub fn read_lectures_file(path: &Path) -> Result<Vec<Lecture>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lectures file: {}", path.display()))?;
    let lectures: Vec<Lecture> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse lectures file: {}", path.display()))?;
    Ok(lectures)
}

// ============ In memory ============

#[derive(Debug, Default, Clone)]
pub struct InMemoryLectures {
    lectures: Vec<Lecture>,
}

impl InMemoryLectures {
    pub fn new(lectures: Vec<Lecture>) -> Self {
        Self { lectures }
    }
}

#[async_trait]
impl LectureSource for InMemoryLectures {
    async fn fetch(&self, limit: i64) -> Result<Vec<Lecture>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.lectures.iter().take(limit).cloned().collect())
    }
}

// ============ Cache ============

pub struct LectureCache {
    source: Arc<dyn LectureSource>,
    ttl: Duration,
    limit: i64,
    state: Mutex<Option<CachedData<Arc<Vec<Lecture>>>>>,
}

impl LectureCache {
    pub fn new(source: Arc<dyn LectureSource>, ttl: Duration, limit: i64) -> Self {
        Self {
            source,
            ttl,
            limit,
            state: Mutex::new(None),
        }
    }

    /// The current lecture list, refreshed from the source when stale.
    ///
    /// Concurrent callers wait on the same refresh instead of each hitting
    /// the source. Never fails: a source error yields the previous list, or
    /// an empty one when nothing was ever fetched.
    pub async fn get(&self, clock: &dyn Clock) -> Arc<Vec<Lecture>> {
        let now = clock.now_utc();
        let mut state = self.state.lock().await;

        if let Some(ref cached) = *state {
            if cached.is_fresh(now, self.ttl) {
                return Arc::clone(&cached.data);
            }
        }

        match self.source.fetch(self.limit).await {
            Ok(lectures) => {
                debug!(count = lectures.len(), "refreshed lecture cache");
                let lectures = Arc::new(lectures);
                *state = Some(CachedData::new(Arc::clone(&lectures), now));
                lectures
            }
            Err(e) => match *state {
                Some(ref stale) => {
                    warn!(error = %e, "lecture refresh failed; serving stale list");
                    Arc::clone(&stale.data)
                }
                None => {
                    warn!(error = %e, "lecture refresh failed; no cached list");
                    Arc::new(Vec::new())
                }
            },
        }
    }

    /// Force the next [`get`](Self::get) to refetch.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}
