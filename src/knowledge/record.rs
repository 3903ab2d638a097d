//! 검색 단위 레코드 타입
//!
//! 비디오 요약 / 챕터 요약 / 트랜스크립트 청크가 각각 하나의 `FlatRecord`가 되며,
//! `source` 태그로 출처를 구분합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VideoSearchError;

// ============================================================================
// Record Source
// ============================================================================

/// 레코드 출처 태그
///
/// 문자열 표현:
/// - `video_summary`
/// - `chapter_<i>_summary`
/// - `chapter_<i>_transcript_chunk_<j>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordSource {
    VideoSummary,
    ChapterSummary { chapter: u32 },
    TranscriptChunk { chapter: u32, chunk: u32 },
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoSummary => write!(f, "video_summary"),
            Self::ChapterSummary { chapter } => write!(f, "chapter_{}_summary", chapter),
            Self::TranscriptChunk { chapter, chunk } => {
                write!(f, "chapter_{}_transcript_chunk_{}", chapter, chunk)
            }
        }
    }
}

// ============================================================================
// Flat Record
// ============================================================================

/// 저장/검색 단위 레코드
///
/// 수집 시 한 번 생성되고 이후 수정되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub id: String,
    pub video_name: String,
    pub source: String,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub start_timestamp_millis: Option<i64>,
    pub end_timestamp_millis: Option<i64>,
}

// ============================================================================
// Search Mode
// ============================================================================

/// 검색 모드 (출처 기반 필터)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// 비디오/챕터 요약 (`source`가 `summary`로 끝남)
    Scene,
    /// 트랜스크립트 청크 (`source`에 `transcript_chunk` 포함)
    Transcripts,
}

impl SearchMode {
    /// 출처 태그가 이 모드에 해당하는지
    pub fn matches(&self, source: &str) -> bool {
        match self {
            Self::Scene => source.ends_with("summary"),
            Self::Transcripts => source.contains("transcript_chunk"),
        }
    }

    /// SQL `LIKE` 패턴 (`ESCAPE '\'` 와 함께 사용)
    pub fn like_pattern(&self) -> &'static str {
        match self {
            Self::Scene => "%summary",
            Self::Transcripts => "%transcript\\_chunk%",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Transcripts => "transcripts",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = VideoSearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scene" => Ok(Self::Scene),
            "transcripts" => Ok(Self::Transcripts),
            other => Err(VideoSearchError::InvalidMode(other.to_string())),
        }
    }
}

// ============================================================================
// Search Result
// ============================================================================

/// 검색 경로 (vector / text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Text,
}

/// 검색 결과 (요청 단위로 생성/폐기)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub video_name: String,
    pub source: String,
    pub text: String,
    pub start_timestamp_millis: Option<i64>,
    pub end_timestamp_millis: Option<i64>,
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relevance_score: Option<f32>,
}

impl SearchResult {
    /// 레코드에서 결과 생성 (검색 경로 태그 부착)
    pub fn from_record(record: FlatRecord, search_type: SearchType) -> Self {
        Self {
            id: record.id,
            video_name: record.video_name,
            source: record.source,
            text: record.text,
            start_timestamp_millis: record.start_timestamp_millis,
            end_timestamp_millis: record.end_timestamp_millis,
            search_type,
            relevance_score: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
