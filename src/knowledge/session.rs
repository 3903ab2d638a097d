//! 저장소 세션 - SQLite 레코드 저장소 + LanceDB 벡터 저장소 묶음
//!
//! 요청(또는 수집 1회) 단위로 열고 끝나면 버립니다.
//! 수집 경로는 저장소를 생성하며 열고, 검색/조회 경로는 읽기 전용으로 엽니다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::RetryPolicy;
use crate::error::VideoSearchError;

use super::lance::LanceVectorStore;
use super::record::SearchMode;
use super::store::KnowledgeStore;
use super::vector::{MemoryVectorStore, VectorStore};

const RECORDS_DB: &str = "records.db";
const VECTORS_DIR: &str = "vectors.lance";

/// 세션 통계 (status 명령어)
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub record_count: usize,
    pub video_count: usize,
    pub scene_records: usize,
    pub transcript_records: usize,
    pub vector_count: usize,
    pub total_text_bytes: usize,
}

/// 열린 저장소 세션
#[derive(Clone)]
pub struct StoreSession {
    pub store: KnowledgeStore,
    pub vector: Arc<dyn VectorStore>,
}

impl StoreSession {
    /// 레코드 DB 경로
    pub fn records_db_path(data_dir: &Path) -> PathBuf {
        data_dir.join(RECORDS_DB)
    }

    /// 세션 열기 (1회 시도, 없으면 생성)
    pub async fn open(data_dir: &Path, dimension: usize) -> Result<Self> {
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir)
                .await
                .context("Failed to create data directory")?;
        }

        let store = KnowledgeStore::open(&Self::records_db_path(data_dir))
            .context("Failed to open record store")?;
        store.ping()?;

        let vector = LanceVectorStore::open(&data_dir.join(VECTORS_DIR), dimension)
            .await
            .context("Failed to open vector store")?;

        Ok(Self {
            store,
            vector: Arc::new(vector),
        })
    }

    /// 기존 저장소를 읽기 전용으로 열기 (1회 시도)
    ///
    /// 디스크에 아무것도 만들지 않습니다. 레코드 DB가 없으면 에러,
    /// 벡터 디렉토리가 없으면 빈 벡터 저장소로 취급합니다.
    async fn open_existing(data_dir: &Path, dimension: usize) -> Result<Self> {
        let db_path = Self::records_db_path(data_dir);
        if !db_path.exists() {
            anyhow::bail!(
                "No record store at {} (run `ingest` first)",
                db_path.display()
            );
        }

        let store = KnowledgeStore::open_read_only(&db_path)
            .context("Failed to open record store")?;
        store.ping()?;

        let vectors_path = data_dir.join(VECTORS_DIR);
        let vector: Arc<dyn VectorStore> = if vectors_path.exists() {
            Arc::new(
                LanceVectorStore::open(&vectors_path, dimension)
                    .await
                    .context("Failed to open vector store")?,
            )
        } else {
            tracing::debug!("No vector store at {:?}, vector leg is empty", vectors_path);
            Arc::new(MemoryVectorStore::new())
        };

        Ok(Self { store, vector })
    }

    /// 고정 간격 재시도로 세션 열기 (수집/초기화 경로)
    ///
    /// 모든 시도가 실패하면 `StoreConnectivity` 에러를 반환합니다.
    pub async fn open_with_retry(
        data_dir: &Path,
        dimension: usize,
        policy: &RetryPolicy,
    ) -> crate::error::Result<Self> {
        connect(policy, || Self::open(data_dir, dimension)).await
    }

    /// 검색/조회 경로용 읽기 전용 세션 (재시도 없음)
    pub async fn open_for_query(data_dir: &Path, dimension: usize) -> crate::error::Result<Self> {
        connect(&RetryPolicy::single_attempt(), || {
            Self::open_existing(data_dir, dimension)
        })
        .await
    }

    /// 레코드/벡터 통계
    pub async fn stats(&self) -> Result<SessionStats> {
        let store_stats = self.store.stats()?;

        Ok(SessionStats {
            record_count: store_stats.record_count,
            video_count: store_stats.video_count,
            scene_records: self.store.count_by_mode(SearchMode::Scene)?,
            transcript_records: self.store.count_by_mode(SearchMode::Transcripts)?,
            vector_count: self.vector.count().await?,
            total_text_bytes: store_stats.total_text_bytes,
        })
    }
}

async fn connect<F, Fut>(policy: &RetryPolicy, mut opener: F) -> crate::error::Result<StoreSession>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<StoreSession>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match opener().await {
            Ok(session) => {
                if attempt > 1 {
                    tracing::info!("Store connected after {} attempt(s)", attempt);
                }
                return Ok(session);
            }
            Err(e) if attempt < policy.max_attempts => {
                tracing::warn!(
                    "Store connection attempt {}/{} failed: {:#}. Retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    e,
                    policy.backoff
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                return Err(VideoSearchError::StoreConnectivity {
                    attempts: attempt,
                    message: format!("{:#}", e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::record::FlatRecord;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(id: &str, source: &str, text: &str) -> FlatRecord {
        FlatRecord {
            id: id.to_string(),
            video_name: "demo".to_string(),
            source: source.to_string(),
            text: text.to_string(),
            embedding: vec![],
            start_timestamp_millis: None,
            end_timestamp_millis: None,
        }
    }

    #[tokio::test]
    async fn test_open_creates_stores() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");

        let session = StoreSession::open_with_retry(&data_dir, 8, &RetryPolicy::single_attempt())
            .await
            .unwrap();

        assert!(data_dir.join(RECORDS_DB).exists());
        assert_eq!(session.store.stats().unwrap().record_count, 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_attempts() {
        let temp_dir = TempDir::new().unwrap();
        // 파일 경로를 데이터 디렉토리로 사용하면 항상 실패
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let err = StoreSession::open_with_retry(&blocker, 8, &policy)
            .await
            .err()
            .unwrap();

        match err {
            VideoSearchError::StoreConnectivity { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_query_session_does_not_create_files() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("fresh");

        let err = StoreSession::open_for_query(&data_dir, 8).await.err().unwrap();

        assert!(matches!(
            err,
            VideoSearchError::StoreConnectivity { attempts: 1, .. }
        ));
        assert!(!data_dir.exists());
    }

    #[tokio::test]
    async fn test_query_session_reads_ingested_records() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path();

        let store = KnowledgeStore::open(&StoreSession::records_db_path(data_dir)).unwrap();
        store
            .insert_records(&[
                record("s1", "video_summary", "A cat."),
                record("t1", "chapter_0_transcript_chunk_0", "Meow."),
            ])
            .unwrap();
        drop(store);

        let session = StoreSession::open_for_query(data_dir, 8).await.unwrap();
        // 벡터 디렉토리는 만들지 않음
        assert!(!data_dir.join(VECTORS_DIR).exists());

        let stats = session.stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.video_count, 1);
        assert_eq!(stats.scene_records, 1);
        assert_eq!(stats.transcript_records, 1);
        assert_eq!(stats.vector_count, 0);

        // 읽기 전용 연결은 쓰기 거부
        assert!(session
            .store
            .insert_records(&[record("s2", "video_summary", "A dog.")])
            .is_err());
    }
}
