//! 수집 파이프라인
//!
//! 분석 문서 → 청킹 → 임베딩 → 평탄화 → SQLite + 벡터 저장소

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::{embed_input, EmbeddingProvider, TextInput};
use crate::error::{Result, VideoSearchError};

use super::chunker::Chunker;
use super::document::AnalysisDocument;
use super::flatten::{flatten, EmbeddedChapter, EmbeddedDocument, EmbeddedText, TextChunk};
use super::session::StoreSession;
use super::store::KnowledgeStore;
use super::vector::{VectorEntry, VectorStore};

/// 수집 결과 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub video_name: String,
    pub total_chapters: usize,
    pub total_chunks: usize,
    pub total_records: usize,
    /// 벡터 색인된 레코드 수 (빈 텍스트는 제외)
    pub vector_records: usize,
}

/// 문서 수집기
pub struct Ingestor {
    store: KnowledgeStore,
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl Ingestor {
    pub fn new(
        store: KnowledgeStore,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            store,
            vector,
            embedder,
            chunker,
        }
    }

    /// 열린 세션으로 생성
    pub fn from_session(
        session: &StoreSession,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self::new(session.store.clone(), session.vector.clone(), embedder, chunker)
    }

    /// 문서 조립: 트랜스크립트 청킹 + 모든 텍스트 임베딩
    ///
    /// 임베딩이 하나라도 실패하면 수집 전체를 중단합니다.
    pub async fn assemble(&self, document: &AnalysisDocument) -> Result<EmbeddedDocument> {
        let mut chapters = Vec::with_capacity(document.chapters.len());

        for chapter in &document.chapters {
            let chunk_texts = self.chunker.chunk(chapter.transcript.as_str());
            tracing::debug!(
                "Chapter {}: {} chunk(s) via {}",
                chapter.chapter_index,
                chunk_texts.len(),
                self.chunker.name()
            );

            let embeddings = self
                .embedder
                .embed_batch(&chunk_texts)
                .await
                .map_err(VideoSearchError::embedding)?;

            if embeddings.len() != chunk_texts.len() {
                return Err(VideoSearchError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    chunk_texts.len(),
                    embeddings.len()
                )));
            }

            let transcript_chunks = chunk_texts
                .into_iter()
                .zip(embeddings)
                .enumerate()
                .map(|(i, (text, embedding))| TextChunk {
                    chunk_index: i as u32,
                    text,
                    embedding,
                })
                .collect();

            let summary = self.embed_text(&chapter.summary_text).await?;

            chapters.push(EmbeddedChapter {
                chapter_index: chapter.chapter_index,
                start_timestamp_millis: chapter.start_timestamp_millis,
                end_timestamp_millis: chapter.end_timestamp_millis,
                summary,
                transcript_chunks,
            });
        }

        let video_summary = self.embed_text(&document.video_summary).await?;

        Ok(EmbeddedDocument {
            video_name: document.video_name.clone(),
            video_summary,
            chapters,
        })
    }

    async fn embed_text(&self, text: &str) -> Result<EmbeddedText> {
        let embedding = embed_input(self.embedder.as_ref(), &TextInput::from(text))
            .await
            .map_err(VideoSearchError::embedding)?;

        Ok(EmbeddedText {
            text: text.to_string(),
            embedding,
        })
    }

    /// 문서 수집
    ///
    /// 레코드를 SQLite에 먼저 저장한 뒤, 임베딩이 있는 레코드만 벡터 저장소에 넣습니다.
    /// 두 저장소 사이의 원자성은 보장하지 않습니다.
    pub async fn ingest(&self, document: &AnalysisDocument) -> Result<IngestReport> {
        let embedded = self.assemble(document).await?;
        let records = flatten(&embedded);

        self.store
            .insert_records(&records)
            .map_err(VideoSearchError::store)?;

        let entries: Vec<VectorEntry> = records
            .iter()
            .filter(|r| !r.embedding.is_empty())
            .map(|r| VectorEntry {
                record_id: r.id.clone(),
                video_name: r.video_name.clone(),
                source: r.source.clone(),
                embedding: r.embedding.clone(),
            })
            .collect();

        if entries.len() < records.len() {
            tracing::warn!(
                "{} record(s) without embedding are not vector-indexed",
                records.len() - entries.len()
            );
        }

        let vector_records = self
            .vector
            .insert_batch(&entries)
            .await
            .map_err(VideoSearchError::store)?;

        let report = IngestReport {
            video_name: embedded.video_name.clone(),
            total_chapters: embedded.chapters.len(),
            total_chunks: embedded.total_chunks(),
            total_records: records.len(),
            vector_records,
        };

        tracing::info!(
            "Ingested {}: chapters={}, chunks={}, records={}",
            report.video_name,
            report.total_chapters,
            report.total_chunks,
            report.total_records
        );

        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================
