//! Text Chunking Module
//!
//! 트랜스크립트 텍스트를 문장 경계에서 분할합니다.
//! 청크 경계는 항상 문장 종결 부호(`.`, `!`, `?`) 뒤에만 생깁니다.

use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최소 청크 크기 (문자 수) - 미달 버퍼는 버려짐
    pub min_characters: usize,
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_characters: 100,
            max_characters: 500,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증 (min < max)
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_characters == 0 {
            anyhow::bail!("max_characters must be greater than 0");
        }
        if self.min_characters >= self.max_characters {
            anyhow::bail!(
                "min_characters ({}) must be smaller than max_characters ({})",
                self.min_characters,
                self.max_characters
            );
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 경계 청커
///
/// 문장을 순서대로 버퍼에 누적하고, 다음 문장을 붙이면 최대 크기를 넘는 순간
/// 버퍼를 닫습니다. 닫히는 버퍼가 최소 크기에 못 미치면 앞 청크에 병합하지 않고 버립니다.
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (max 500, min 100)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.max_characters, self.config.min_characters)
    }

    fn name(&self) -> &'static str {
        "SentenceChunker"
    }
}

/// 문장 종결 부호 + 뒤따르는 공백
fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s*").expect("valid sentence regex"))
}

/// 텍스트를 문장 단위로 분할
///
/// 종결 부호는 해당 문장 끝에 다시 붙이고, 부호 뒤의 공백은 제거합니다.
/// 마지막 부호 뒤에 남은 텍스트도 하나의 문장으로 취급합니다.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in sentence_end_re().find_iter(text) {
        // 매치의 첫 글자가 종결 부호 (모두 1바이트 ASCII)
        let punct_end = m.start() + 1;
        sentences.push(text[last..punct_end].to_string());
        last = m.end();
    }

    if last < text.len() {
        sentences.push(text[last..].to_string());
    }

    sentences
}

/// 문장 경계 청킹
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `max_size` - 청크 최대 문자 수
/// * `min_size` - 청크 최소 문자 수 (미달 청크는 버려짐)
///
/// # Returns
/// 순서가 유지된 비어 있지 않은 청크 목록
pub fn chunk_text(text: &str, max_size: usize, min_size: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        if sentence.trim().is_empty() {
            continue;
        }

        let sentence_len = sentence.chars().count();

        if !current.is_empty() && current_len + sentence_len + 1 > max_size {
            if current_len >= min_size {
                chunks.push(current.trim().to_string());
            } else {
                tracing::debug!("Dropping undersized chunk ({} chars)", current_len);
            }
            current = sentence;
            current_len = sentence_len;
        } else if current.is_empty() {
            current = sentence;
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_len += sentence_len + 1;
        }
    }

    if !current.is_empty() && current_len >= min_size {
        chunks.push(current.trim().to_string());
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SentenceChunker::with_defaults())
}

/// 문장 청커 생성 (설정 지정)
pub fn sentence_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(SentenceChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = SentenceChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\t ").is_empty());
    }

    #[test]
    fn test_input_shorter_than_min_is_dropped() {
        let chunks = chunk_text("Hello world. This is a test.", 500, 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_ingestion_scenario_small_min() {
        let chunks = chunk_text("Hello world. This is a test.", 500, 5);
        assert_eq!(chunks, vec!["Hello world. This is a test.".to_string()]);
    }

    #[test]
    fn test_split_sentences_reattaches_punctuation() {
        let sentences = split_sentences("Hi there! How are you?  Fine.No trailing");
        assert_eq!(
            sentences,
            vec!["Hi there!", "How are you?", "Fine.", "No trailing"]
        );
    }

    #[test]
    fn test_split_sentences_repeated_punctuation() {
        let sentences = split_sentences("Wait... ok.");
        assert_eq!(sentences, vec!["Wait.", ".", ".", "ok."]);
    }

    #[test]
    fn test_chunk_boundaries_at_sentence_end() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let chunks = chunk_text(text, 30, 5);

        assert_eq!(
            chunks,
            vec![
                "One two three. Four five six.",
                "Seven eight nine.",
                "Ten eleven twelve.",
            ]
        );
        for chunk in &chunks {
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn test_length_bounds() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunks = chunk_text(&text, 200, 50);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let len = chunk.chars().count();
            assert!(len >= 50, "chunk too short: {}", len);
            assert!(len <= 200, "chunk too long: {}", len);
        }
    }

    #[test]
    fn test_single_long_sentence_exceeds_max() {
        let long = format!("{}.", "a".repeat(80));
        let text = format!("Short one here. {} Tail sentence here.", long);
        let chunks = chunk_text(&text, 40, 10);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], long);
        assert!(chunks[1].chars().count() > 40);
    }

    #[test]
    fn test_undersized_middle_buffer_dropped_not_merged() {
        // "Hi." 는 다음 문장이 넘칠 때 min 미달이라 버려짐
        let text = format!("Hi. {}. End of the text here.", "b".repeat(30));
        let chunks = chunk_text(&text, 30, 10);

        assert!(chunks.iter().all(|c| !c.contains("Hi.")));
        assert_eq!(chunks[0], format!("{}.", "b".repeat(30)));
    }

    #[test]
    fn test_undersized_tail_dropped() {
        let text = format!("{}. Bye.", "c".repeat(40));
        let chunks = chunk_text(&text, 42, 10);

        assert_eq!(chunks, vec![format!("{}.", "c".repeat(40))]);
    }

    #[test]
    fn test_reconstruction_modulo_whitespace() {
        let text = "Alpha beta gamma.   Delta epsilon!\nZeta eta theta? Iota kappa lambda.";
        let chunks = chunk_text(text, 40, 1);

        assert_eq!(normalize(&chunks.join(" ")), normalize(text));
    }

    #[test]
    fn test_character_count_not_bytes() {
        // 한글은 UTF-8에서 3바이트지만 문자 수로 계산
        let text = "가나다라마바사. 아자차카타파하.";
        let chunks = chunk_text(text, 20, 5);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::default().validate().is_ok());
        assert!(ChunkConfig {
            min_characters: 500,
            max_characters: 500
        }
        .validate()
        .is_err());
        assert!(ChunkConfig {
            min_characters: 0,
            max_characters: 0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_factory() {
        let chunker = sentence_chunker(ChunkConfig {
            min_characters: 5,
            max_characters: 100,
        });
        assert_eq!(chunker.name(), "SentenceChunker");
        assert_eq!(chunker.chunk("Hello world.").len(), 1);
        assert_eq!(default_chunker().name(), "SentenceChunker");
    }
}
