//! Record Store - rusqlite 기반 레코드 저장소
//!
//! 평탄화된 레코드를 저장하고 FTS5 키워드 검색을 제공합니다.
//! 저장 위치: ~/.vidsearch-rag/records.db

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use serde::Serialize;

use super::record::{FlatRecord, SearchMode};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.vidsearch-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vidsearch-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 비디오별 레코드 수
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub video_name: String,
    pub record_count: usize,
    pub chunk_count: usize,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub record_count: usize,
    pub video_count: usize,
    pub total_text_bytes: usize,
}

const RECORD_COLUMNS: &str =
    "id, video_name, source, text, start_timestamp_millis, end_timestamp_millis";

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store - 동기 레코드 저장소
///
/// SQLite 기반 레코드 저장 및 FTS5 키워드 검색을 제공합니다.
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl KnowledgeStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기존 저장소를 읽기 전용으로 열기
    ///
    /// 파일을 만들거나 스키마를 초기화하지 않습니다.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database (read-only)")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                video_name TEXT NOT NULL,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                start_timestamp_millis INTEGER,
                end_timestamp_millis INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_video ON records(video_name);
            CREATE INDEX IF NOT EXISTS idx_records_source ON records(source);
            CREATE INDEX IF NOT EXISTS idx_records_timestamps
                ON records(start_timestamp_millis, end_timestamp_millis);
            "#,
        )
        .context("Failed to create records table")?;

        // FTS5 가상 테이블 (키워드 검색용)
        // ref: https://www.sqlite.org/fts5.html
        conn.execute_batch(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
                text,
                content=records,
                content_rowid=seq
            );

            CREATE TRIGGER IF NOT EXISTS records_ai AFTER INSERT ON records BEGIN
                INSERT INTO records_fts(rowid, text) VALUES (new.seq, new.text);
            END;

            CREATE TRIGGER IF NOT EXISTS records_ad AFTER DELETE ON records BEGIN
                INSERT INTO records_fts(records_fts, rowid, text)
                VALUES('delete', old.seq, old.text);
            END;
            "#,
        )
        .context("Failed to create FTS5 index")?;

        tracing::debug!("Record store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 연결 확인
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Store ping failed")?;
        Ok(())
    }

    /// 레코드 일괄 저장 (단일 트랜잭션)
    pub fn insert_records(&self, records: &[FlatRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO records
                 (id, video_name, source, text, start_timestamp_millis, end_timestamp_millis, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                stmt.execute(params![
                    record.id,
                    record.video_name,
                    record.source,
                    record.text,
                    record.start_timestamp_millis,
                    record.end_timestamp_millis,
                    now,
                ])
                .with_context(|| format!("Failed to insert record {}", record.source))?;
            }
        }

        tx.commit().context("Failed to commit records")?;
        tracing::debug!("Inserted {} records", records.len());

        Ok(records.len())
    }

    /// ID 목록으로 레코드 조회 (입력 순서 유지, 없는 ID는 제외)
    pub fn get_records(&self, ids: &[String]) -> Result<Vec<FlatRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM records WHERE id IN ({})",
            RECORD_COLUMNS, placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut by_id: HashMap<String, FlatRecord> = stmt
            .query_map(params_from_iter(ids.iter()), record_from_row)?
            .map(|r| r.map(|record| (record.id.clone(), record)))
            .collect::<rusqlite::Result<_>>()
            .context("Failed to decode stored record")?;

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// 모드 필터에 맞는 레코드 수
    pub fn count_by_mode(&self, mode: SearchMode) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE source LIKE ?1 ESCAPE '\\'",
            params![mode.like_pattern()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// FTS5 키워드 검색 (모드 필터 적용)
    ///
    /// BM25 순으로 최대 `limit`개를 반환합니다.
    /// ref: https://www.sqlite.org/fts5.html#the_bm25_function
    pub fn search_fts(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Result<Vec<FlatRecord>> {
        let match_query = build_fts5_query(query);
        if match_query.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                r.id, r.video_name, r.source, r.text,
                r.start_timestamp_millis, r.end_timestamp_millis
            FROM records_fts
            JOIN records r ON r.seq = records_fts.rowid
            WHERE records_fts MATCH ?1
              AND r.source LIKE ?2 ESCAPE '\'
            ORDER BY bm25(records_fts)
            LIMIT ?3
            "#,
        )?;

        let results = stmt
            .query_map(
                params![match_query, mode.like_pattern(), sql_limit(limit)],
                record_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode FTS result")?;

        Ok(results)
    }

    /// 비디오 목록 (레코드 수 포함)
    pub fn list_videos(&self, limit: usize) -> Result<Vec<VideoSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT video_name,
                    COUNT(*),
                    SUM(CASE WHEN source LIKE '%transcript\\_chunk%' ESCAPE '\\' THEN 1 ELSE 0 END)
             FROM records
             GROUP BY video_name
             ORDER BY MAX(created_at) DESC
             LIMIT ?1",
        )?;

        let videos = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok(VideoSummary {
                    video_name: row.get(0)?,
                    record_count: row.get::<_, i64>(1)? as usize,
                    chunk_count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to decode video summary")?;

        Ok(videos)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (count, videos, total_size): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT video_name), COALESCE(SUM(LENGTH(text)), 0)
             FROM records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            record_count: count as usize,
            video_count: videos as usize,
            total_text_bytes: total_size as usize,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FlatRecord> {
    Ok(FlatRecord {
        id: row.get(0)?,
        video_name: row.get(1)?,
        source: row.get(2)?,
        text: row.get(3)?,
        embedding: Vec::new(),
        start_timestamp_millis: row.get(4)?,
        end_timestamp_millis: row.get(5)?,
    })
}

/// SQL `LIMIT` 값 (음수는 무제한이므로 `i64::MAX`에서 포화)
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// FTS5 MATCH 쿼리 생성
///
/// 특수 문자를 제거한 단어를 각각 인용하고 OR로 연결합니다 (어느 단어든 일치).
/// ref: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn build_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================
