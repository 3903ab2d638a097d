//! 설정 - 환경 변수 기반 런타임 설정
//!
//! 모든 값은 기본값이 있으며, 잘못된 값은 경고 후 기본값으로 대체합니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::embedding::DEFAULT_DIMENSION;
use crate::knowledge::{get_data_dir, ChunkConfig};

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 10;

/// 경로별 최대 검색 결과 수
pub const MAX_TOP_K: usize = 100;

/// 저장소 연결 재시도 횟수
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;

/// 재시도 간 대기 시간 (초)
pub const DEFAULT_CONNECT_BACKOFF_SECS: u64 = 30;

// ============================================================================
// RetryPolicy
// ============================================================================

/// 고정 간격 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최소 1)
    pub max_attempts: u32,
    /// 시도 간 대기 시간
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// 재시도 없이 1회만 시도
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONNECT_RETRIES,
            Duration::from_secs(DEFAULT_CONNECT_BACKOFF_SECS),
        )
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 데이터 디렉토리 (records.db, vectors.lance)
    pub data_dir: PathBuf,
    pub embedding_dimension: usize,
    pub chunk: ChunkConfig,
    pub top_k: usize,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            embedding_dimension: DEFAULT_DIMENSION,
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    ///
    /// - `VIDSEARCH_DATA_DIR`
    /// - `VIDSEARCH_EMBEDDING_DIM`
    /// - `VIDSEARCH_CHUNK_MAX` / `VIDSEARCH_CHUNK_MIN`
    /// - `VIDSEARCH_TOP_K`
    /// - `VIDSEARCH_CONNECT_RETRIES` / `VIDSEARCH_CONNECT_BACKOFF_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키 조회 함수로 설정 로드
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup("VIDSEARCH_DATA_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let chunk = ChunkConfig {
            max_characters: parse_or(&lookup, "VIDSEARCH_CHUNK_MAX", defaults.chunk.max_characters),
            min_characters: parse_or(&lookup, "VIDSEARCH_CHUNK_MIN", defaults.chunk.min_characters),
        };
        chunk.validate()?;

        let retry = RetryPolicy::new(
            parse_or(&lookup, "VIDSEARCH_CONNECT_RETRIES", DEFAULT_CONNECT_RETRIES),
            Duration::from_secs(parse_or(
                &lookup,
                "VIDSEARCH_CONNECT_BACKOFF_SECS",
                DEFAULT_CONNECT_BACKOFF_SECS,
            )),
        );

        Ok(Self {
            data_dir,
            embedding_dimension: parse_or(&lookup, "VIDSEARCH_EMBEDDING_DIM", defaults.embedding_dimension),
            chunk,
            top_k: parse_or(&lookup, "VIDSEARCH_TOP_K", defaults.top_k).clamp(1, MAX_TOP_K),
            retry,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {}={:?}, using default {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}

// ============================================================================
// Tests
// ============================================================================
