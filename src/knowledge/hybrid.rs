//! 하이브리드 검색 - 벡터 검색 + FTS5 키워드 검색
//!
//! 두 경로를 동시에 실행하고 결과를 경로별로 돌려줍니다.
//! 통합(중복 제거)은 `merge`, 최종 순위는 리랭커가 담당합니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, VideoSearchError};

use super::record::{SearchMode, SearchResult, SearchType};
use super::session::StoreSession;
use super::store::KnowledgeStore;
use super::vector::VectorStore;

/// 벡터 후보 배수 (모드 필터 전 top_k * N개 조회)
pub const VECTOR_OVERFETCH: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 경로별 검색 결과
#[derive(Debug, Clone, Default)]
pub struct HybridResults {
    /// 벡터 경로 결과 (유사도 순)
    pub vector: Vec<SearchResult>,
    /// 텍스트 경로 결과 (BM25 순)
    pub text: Vec<SearchResult>,
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// SQLite FTS5 (키워드) + 벡터 저장소 (코사인 유사도)
pub struct HybridRetriever {
    store: KnowledgeStore,
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl HybridRetriever {
    pub fn new(
        store: KnowledgeStore,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            vector,
            embedder,
        }
    }

    /// 열린 세션으로 생성
    pub fn from_session(session: &StoreSession, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(session.store.clone(), session.vector.clone(), embedder)
    }

    /// 하이브리드 검색
    ///
    /// 벡터 경로와 텍스트 경로를 동시에 실행합니다. 어느 한쪽이라도 실패하면
    /// 검색 전체가 실패합니다.
    ///
    /// # Arguments
    /// * `query` - 검색어
    /// * `mode` - 출처 필터
    /// * `top_k` - 경로별 최대 결과 수
    pub async fn search(&self, query: &str, mode: SearchMode, top_k: usize) -> Result<HybridResults> {
        let (vector, text) = tokio::join!(
            self.search_vector(query, mode, top_k),
            async { self.search_text(query, mode, top_k) }
        );

        let results = HybridResults {
            vector: vector?,
            text: text?,
        };

        tracing::info!(
            "Hybrid search '{}' ({}): vector={}, text={}",
            query,
            mode,
            results.vector.len(),
            results.text.len()
        );

        Ok(results)
    }

    /// 벡터 경로
    ///
    /// `top_k * VECTOR_OVERFETCH`개를 조회한 뒤 모드 필터를 적용하고 `top_k`개로 자릅니다.
    /// 필터 후 후보가 부족하면 `top_k`보다 적게 반환됩니다.
    pub async fn search_vector(
        &self,
        query: &str,
        mode: SearchMode,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(vec![]);
        }

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(VideoSearchError::embedding)?;

        if embedding.is_empty() {
            tracing::debug!("Empty query embedding, skipping vector search");
            return Ok(vec![]);
        }

        let hits = self
            .vector
            .search(&embedding, top_k.saturating_mul(VECTOR_OVERFETCH))
            .await
            .map_err(VideoSearchError::store)?;

        let ids: Vec<String> = hits
            .into_iter()
            .filter(|hit| mode.matches(&hit.source))
            .take(top_k)
            .map(|hit| hit.record_id)
            .collect();

        let records = self
            .store
            .get_records(&ids)
            .map_err(VideoSearchError::store)?;

        if records.len() < ids.len() {
            tracing::warn!(
                "{} vector hit(s) have no stored record",
                ids.len() - records.len()
            );
        }

        Ok(records
            .into_iter()
            .map(|r| SearchResult::from_record(r, SearchType::Vector))
            .collect())
    }

    /// 텍스트 경로 (FTS5, 모드 필터 적용)
    pub fn search_text(
        &self,
        query: &str,
        mode: SearchMode,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let results = self
            .store
            .search_fts(query, mode, top_k)
            .map_err(VideoSearchError::store)?;

        Ok(results
            .into_iter()
            .map(|r| SearchResult::from_record(r, SearchType::Text))
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::record::FlatRecord;
    use crate::knowledge::vector::{MemoryVectorStore, VectorEntry};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 키워드 존재 여부로 벡터를 만드는 결정적 임베더
    struct KeywordEmbedder {
        fail: bool,
        empty: bool,
    }

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        vec![
            if lower.contains("cat") { 1.0 } else { 0.0 },
            if lower.contains("dog") { 1.0 } else { 0.0 },
            if lower.contains("car") { 1.0 } else { 0.0 },
            0.1,
        ]
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            if self.fail {
                anyhow::bail!("embedding service unavailable");
            }
            if self.empty {
                return Ok(vec![]);
            }
            Ok(keyword_vector(text))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn record(id: &str, source: &str, text: &str) -> FlatRecord {
        FlatRecord {
            id: id.to_string(),
            video_name: "demo".into(),
            source: source.to_string(),
            text: text.to_string(),
            embedding: keyword_vector(text),
            start_timestamp_millis: Some(0),
            end_timestamp_millis: Some(1000),
        }
    }

    async fn setup(
        records: &[FlatRecord],
        embedder: KeywordEmbedder,
    ) -> (TempDir, HybridRetriever) {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(&temp_dir.path().join("records.db")).unwrap();
        store.insert_records(records).unwrap();

        let vector = Arc::new(MemoryVectorStore::new());
        let entries: Vec<VectorEntry> = records
            .iter()
            .map(|r| VectorEntry {
                record_id: r.id.clone(),
                video_name: r.video_name.clone(),
                source: r.source.clone(),
                embedding: r.embedding.clone(),
            })
            .collect();
        vector.insert_batch(&entries).await.unwrap();

        let retriever = HybridRetriever::new(store, vector, Arc::new(embedder));
        (temp_dir, retriever)
    }

    fn ok_embedder() -> KeywordEmbedder {
        KeywordEmbedder {
            fail: false,
            empty: false,
        }
    }

    #[tokio::test]
    async fn test_search_both_legs_respect_mode() {
        let records = vec![
            record("s1", "video_summary", "A cat sits on a sofa."),
            record("s2", "chapter_0_summary", "A dog runs in a park."),
            record("t1", "chapter_0_transcript_chunk_0", "The cat purrs loudly."),
        ];
        let (_dir, retriever) = setup(&records, ok_embedder()).await;

        let results = retriever.search("cat", SearchMode::Scene, 1).await.unwrap();
        assert_eq!(results.vector.len(), 1);
        assert_eq!(results.vector[0].id, "s1");
        assert_eq!(results.vector[0].search_type, SearchType::Vector);
        assert_eq!(results.text.len(), 1);
        assert_eq!(results.text[0].id, "s1");
        assert_eq!(results.text[0].search_type, SearchType::Text);

        let results = retriever
            .search("cat", SearchMode::Transcripts, 5)
            .await
            .unwrap();
        assert!(results
            .vector
            .iter()
            .chain(results.text.iter())
            .all(|r| r.source.contains("transcript_chunk")));
        assert_eq!(results.text.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_filter_applies_after_overfetch() {
        // 상위 3개(top_k=1 * 3)가 모두 트랜스크립트 → scene 벡터 결과 없음
        let records = vec![
            record("t1", "chapter_0_transcript_chunk_0", "cat cat"),
            record("t2", "chapter_0_transcript_chunk_1", "the cat"),
            record("t3", "chapter_0_transcript_chunk_2", "a cat"),
            record("s1", "video_summary", "A car on the road."),
        ];
        let (_dir, retriever) = setup(&records, ok_embedder()).await;

        let vector = retriever
            .search_vector("cat", SearchMode::Scene, 1)
            .await
            .unwrap();
        assert!(vector.is_empty());

        let vector = retriever
            .search_vector("cat", SearchMode::Scene, 2)
            .await
            .unwrap();
        assert_eq!(vector.len(), 1);
        assert_eq!(vector[0].id, "s1");
    }

    #[tokio::test]
    async fn test_empty_query_embedding_skips_vector_leg() {
        let records = vec![record("s1", "video_summary", "A cat sits on a sofa.")];
        let (_dir, retriever) = setup(
            &records,
            KeywordEmbedder {
                fail: false,
                empty: true,
            },
        )
        .await;

        let results = retriever.search("cat", SearchMode::Scene, 10).await.unwrap();
        assert!(results.vector.is_empty());
        assert_eq!(results.text.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_search() {
        let records = vec![record("s1", "video_summary", "A cat sits on a sofa.")];
        let (_dir, retriever) = setup(
            &records,
            KeywordEmbedder {
                fail: true,
                empty: false,
            },
        )
        .await;

        let err = retriever
            .search("cat", SearchMode::Scene, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VideoSearchError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_vector_hit_without_record_is_skipped() {
        let records = vec![record("s1", "video_summary", "A cat sits on a sofa.")];
        let (_dir, retriever) = setup(&records, ok_embedder()).await;

        retriever
            .vector
            .insert_batch(&[VectorEntry {
                record_id: "orphan".into(),
                video_name: "demo".into(),
                source: "chapter_3_summary".into(),
                embedding: keyword_vector("cat"),
            }])
            .await
            .unwrap();

        let vector = retriever
            .search_vector("cat", SearchMode::Scene, 10)
            .await
            .unwrap();
        assert_eq!(vector.len(), 1);
        assert_eq!(vector[0].id, "s1");
    }

    #[tokio::test]
    async fn test_huge_top_k_does_not_overflow() {
        let records = vec![
            record("s1", "video_summary", "A cat sits on a sofa."),
            record("t1", "chapter_0_transcript_chunk_0", "The cat purrs loudly."),
        ];
        let (_dir, retriever) = setup(&records, ok_embedder()).await;

        let results = retriever
            .search("cat", SearchMode::Scene, usize::MAX)
            .await
            .unwrap();
        assert_eq!(results.vector.len(), 1);
        assert_eq!(results.text.len(), 1);
    }
}
