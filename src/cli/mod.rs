//! CLI 모듈
//!
//! vidsearch-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::embedding::{create_embedder, has_api_key};
use crate::knowledge::{
    sentence_chunker, video_name_from_key, AnalysisDocument, HybridRetriever, Ingestor,
    KnowledgeStore, SearchType, StoreSession,
};
use crate::rerank::{CohereRerank, Reranker};
use crate::search::{validate_request, SearchRequest, VideoSearch};
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "vidsearch-rag")]
#[command(version, about = "비디오 분석 결과 하이브리드 검색", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.vidsearch-rag)
    #[arg(long, global = true, env = "VIDSEARCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 분석 결과 JSON을 수집
    Ingest {
        /// 분석 결과 파일 경로
        #[arg(short, long)]
        file: PathBuf,

        /// 오브젝트 키 (비디오 이름 추출용)
        #[arg(short, long)]
        key: Option<String>,

        /// 비디오 이름 직접 지정
        #[arg(long)]
        video_name: Option<String>,
    },

    /// 검색
    Query {
        /// 검색어
        query: String,

        /// 검색 모드 (scene | transcripts)
        #[arg(short, long, default_value = "scene")]
        mode: String,

        /// 경로별 결과 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// JSON 응답 출력
        #[arg(long)]
        json: bool,
    },

    /// HTTP 검색 서버 실행
    Serve {
        /// 바인드 주소 (host:port)
        #[arg(long, env = "VIDSEARCH_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// 수집된 비디오 목록
    Videos {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Ingest {
            file,
            key,
            video_name,
        } => cmd_ingest(&config, &file, key, video_name).await,
        Commands::Query {
            query,
            mode,
            top_k,
            json,
        } => cmd_query(&config, query, mode, top_k, json).await,
        Commands::Serve { bind } => cmd_serve(config, &bind).await,
        Commands::Videos { limit } => cmd_videos(&config, limit),
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn ensure_embedding_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "임베딩 API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &AppConfig,
    file: &Path,
    key: Option<String>,
    video_name: Option<String>,
) -> Result<()> {
    ensure_embedding_key()?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("분석 결과 JSON 파싱 실패")?;

    let fallback_name = match (video_name, key) {
        (Some(name), _) => name,
        (None, Some(key)) => video_name_from_key(&key),
        (None, None) => video_name_from_key(&file.to_string_lossy()),
    };
    let document = AnalysisDocument::from_json(&value, &fallback_name);

    println!(
        "[*] 수집 중: {} ({} 챕터)",
        document.video_name,
        document.chapters.len()
    );

    let session =
        StoreSession::open_with_retry(&config.data_dir, config.embedding_dimension, &config.retry)
            .await?;
    let embedder = Arc::new(create_embedder(config.embedding_dimension)?);
    let ingestor = Ingestor::from_session(&session, embedder, sentence_chunker(config.chunk));

    let report = ingestor.ingest(&document).await?;

    println!("[OK] 수집 완료");
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(
    config: &AppConfig,
    query: String,
    mode: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let request = SearchRequest {
        query: Some(query),
        mode: Some(mode),
        top_k,
    };
    let query = validate_request(&request, config.top_k)?;

    ensure_embedding_key()?;
    let embedder = Arc::new(create_embedder(config.embedding_dimension)?);
    let rerank = Arc::new(CohereRerank::from_env()?);

    let session = StoreSession::open_for_query(&config.data_dir, config.embedding_dimension).await?;

    let retriever = HybridRetriever::from_session(&session, embedder);
    let search = VideoSearch::new(retriever, Reranker::new(rerank));
    let response = search.search(&query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.frontend_results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", response.frontend_results.len());

    for (i, result) in response.frontend_results.iter().enumerate() {
        let type_str = match result.search_type {
            SearchType::Vector => "VEC",
            SearchType::Text => "TXT",
        };

        println!(
            "{}. [{}] [관련도: {:.4}] {} / {}",
            i + 1,
            type_str,
            result.relevance_score.unwrap_or_default(),
            result.video_name,
            result.source
        );

        if let (Some(start), Some(end)) =
            (result.start_timestamp_millis, result.end_timestamp_millis)
        {
            println!("   구간: {} - {}", format_millis(start), format_millis(end));
        }

        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(config: AppConfig, bind: &str) -> Result<()> {
    ensure_embedding_key()?;

    let state = AppState {
        embedder: Arc::new(create_embedder(config.embedding_dimension)?),
        rerank: Arc::new(CohereRerank::from_env()?),
        config: Arc::new(config),
    };

    server::serve(bind, state).await
}

/// 비디오 목록 명령어 (videos)
fn cmd_videos(config: &AppConfig, limit: usize) -> Result<()> {
    let db_path = StoreSession::records_db_path(&config.data_dir);
    if !db_path.exists() {
        println!("[!] 수집된 비디오가 없습니다.");
        return Ok(());
    }

    let store = KnowledgeStore::open_read_only(&db_path).context("KnowledgeStore 열기 실패")?;

    let videos = store.list_videos(limit).context("비디오 목록 조회 실패")?;

    if videos.is_empty() {
        println!("[!] 수집된 비디오가 없습니다.");
        return Ok(());
    }

    println!("[OK] 수집된 비디오 ({} 건):\n", videos.len());

    for video in videos {
        println!(
            "  {:<40} 레코드 {:>5} | 청크 {:>5}",
            truncate_text(&video.video_name, 40),
            video.record_count,
            video.chunk_count
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("vidsearch-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 임베딩 차원: {}", config.embedding_dimension);

    if has_api_key() {
        println!("[OK] 임베딩 API 키: 설정됨");
    } else {
        println!("[!] 임베딩 API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    if std::env::var("COHERE_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
        println!("[OK] 리랭크 API 키: 설정됨");
    } else {
        println!("[!] 리랭크 API 키: 미설정");
        println!("    설정: export COHERE_API_KEY=your-key");
    }

    let session = match StoreSession::open_for_query(&config.data_dir, config.embedding_dimension)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            println!("[!] 저장소 열기 실패: {}", e);
            return Ok(());
        }
    };

    match session.stats().await {
        Ok(stats) => {
            println!(
                "[OK] 저장된 레코드: {} 건 ({} 비디오)",
                stats.record_count, stats.video_count
            );
            println!(
                "     scene {} 건 | transcripts {} 건",
                stats.scene_records, stats.transcript_records
            );
            println!("     총 텍스트: {}", format_bytes(stats.total_text_bytes));
            println!("[OK] 벡터 인덱스: {} 레코드", stats.vector_count);
        }
        Err(e) => println!("[!] 통계 조회 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 밀리초 → mm:ss.mmm
fn format_millis(millis: i64) -> String {
    let total_secs = millis / 1000;
    format!(
        "{:02}:{:02}.{:03}",
        total_secs / 60,
        total_secs % 60,
        millis % 1000
    )
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "00:00.000");
        assert_eq!(format_millis(61_250), "01:01.250");
        assert_eq!(format_millis(3_600_000), "60:00.000");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "vidsearch-rag",
            "query",
            "a cat jumps",
            "--mode",
            "transcripts",
            "-k",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                query, mode, top_k, json,
            } => {
                assert_eq!(query, "a cat jumps");
                assert_eq!(mode, "transcripts");
                assert_eq!(top_k, Some(5));
                assert!(!json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_ingest_command() {
        let cli = Cli::try_parse_from([
            "vidsearch-rag",
            "--data-dir",
            "/tmp/vs",
            "ingest",
            "--file",
            "result.json",
            "--key",
            "video_input/demo.mp4/uuid/result.json",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/vs")));
        assert!(matches!(cli.command, Commands::Ingest { .. }));
    }
}
