//! 문서 평탄화
//!
//! 임베딩이 붙은 분석 문서를 독립적으로 검색 가능한 `FlatRecord` 목록으로 변환합니다.
//! 임베딩은 문서 조립 단계(`ingest`)에서 이미 계산되어 있어야 합니다.

use uuid::Uuid;

use super::record::{FlatRecord, RecordSource};

// ============================================================================
// Embedded Document
// ============================================================================

/// 텍스트 + 임베딩
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedText {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// 트랜스크립트 청크
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// 챕터 내 0-based 순번
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// 임베딩이 계산된 챕터
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChapter {
    pub chapter_index: u32,
    pub start_timestamp_millis: Option<i64>,
    pub end_timestamp_millis: Option<i64>,
    pub summary: EmbeddedText,
    pub transcript_chunks: Vec<TextChunk>,
}

/// 임베딩이 계산된 문서
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    pub video_name: String,
    pub video_summary: EmbeddedText,
    pub chapters: Vec<EmbeddedChapter>,
}

impl EmbeddedDocument {
    /// 전체 청크 수
    pub fn total_chunks(&self) -> usize {
        self.chapters.iter().map(|c| c.transcript_chunks.len()).sum()
    }
}

// ============================================================================
// Flatten
// ============================================================================

/// 문서를 레코드 목록으로 평탄화
///
/// 순서: `video_summary` → 챕터별 (`chapter_<i>_summary` → `chapter_<i>_transcript_chunk_<j>`...)
/// 레코드 수는 항상 `1 + 챕터 수 + 전체 청크 수`입니다.
pub fn flatten(document: &EmbeddedDocument) -> Vec<FlatRecord> {
    let mut records = Vec::with_capacity(1 + document.chapters.len() + document.total_chunks());

    records.push(FlatRecord {
        id: new_record_id(),
        video_name: document.video_name.clone(),
        source: RecordSource::VideoSummary.to_string(),
        text: document.video_summary.text.clone(),
        embedding: document.video_summary.embedding.clone(),
        start_timestamp_millis: None,
        end_timestamp_millis: None,
    });

    for chapter in &document.chapters {
        records.push(FlatRecord {
            id: new_record_id(),
            video_name: document.video_name.clone(),
            source: RecordSource::ChapterSummary {
                chapter: chapter.chapter_index,
            }
            .to_string(),
            text: chapter.summary.text.clone(),
            embedding: chapter.summary.embedding.clone(),
            start_timestamp_millis: chapter.start_timestamp_millis,
            end_timestamp_millis: chapter.end_timestamp_millis,
        });

        for chunk in &chapter.transcript_chunks {
            records.push(FlatRecord {
                id: new_record_id(),
                video_name: document.video_name.clone(),
                source: RecordSource::TranscriptChunk {
                    chapter: chapter.chapter_index,
                    chunk: chunk.chunk_index,
                }
                .to_string(),
                text: chunk.text.clone(),
                embedding: chunk.embedding.clone(),
                start_timestamp_millis: chapter.start_timestamp_millis,
                end_timestamp_millis: chapter.end_timestamp_millis,
            });
        }
    }

    records
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Tests
// ============================================================================
