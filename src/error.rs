//! 에러 타입 정의
//!
//! 검색/수집 파이프라인 경계에서 사용하는 에러 분류입니다.
//! 내부 어댑터(SQLite, LanceDB, HTTP 프로바이더)는 `anyhow`를 사용하고,
//! 파이프라인 경계에서 아래 variant로 변환합니다.

use thiserror::Error;

/// 비디오 검색 에러
#[derive(Error, Debug)]
pub enum VideoSearchError {
    /// 검색어 누락 (클라이언트 에러)
    #[error("Missing query parameter")]
    MissingQuery,

    /// 잘못된 검색 모드 (클라이언트 에러)
    #[error("Invalid or missing mode parameter. Must be \"scene\" or \"transcripts\" (got: {0})")]
    InvalidMode(String),

    /// 허용 범위를 넘는 결과 수 (클라이언트 에러)
    #[error("Invalid top_k parameter: {requested} (maximum {max})")]
    InvalidTopK { requested: usize, max: usize },

    /// 임베딩 생성 실패
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// 리랭크 실패
    #[error("Rerank failed: {0}")]
    Rerank(String),

    /// 저장소 연결 실패 (재시도 소진)
    #[error("Store connectivity failed after {attempts} attempt(s): {message}")]
    StoreConnectivity { attempts: u32, message: String },

    /// 저장소 조회/저장 실패
    #[error("Store error: {0}")]
    Store(String),

    /// 기타
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VideoSearchError {
    /// 클라이언트 입력 에러 여부 (재시도 없이 그대로 반환)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingQuery | Self::InvalidMode(_) | Self::InvalidTopK { .. }
        )
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    pub(crate) fn rerank(err: anyhow::Error) -> Self {
        Self::Rerank(format!("{:#}", err))
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }
}

/// 파이프라인 결과 타입
pub type Result<T> = std::result::Result<T, VideoSearchError>;
