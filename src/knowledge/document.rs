//! 비디오 분석 문서 모델
//!
//! 외부 분석 서비스의 출력(비디오 요약 + 챕터 + 트랜스크립트)을 해석합니다.
//! 선택 필드가 없어도 실패하지 않고 빈 값으로 대체합니다.

use std::path::Path;

use serde_json::Value;

use crate::embedding::TextInput;

// ============================================================================
// Types
// ============================================================================

/// 분석 문서 (수집 1회당 한 번 소비, 수정 없음)
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisDocument {
    pub video_name: String,
    pub video_summary: String,
    pub chapters: Vec<Chapter>,
}

/// 챕터
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// 문서 내 고유 인덱스 (순서 유지)
    pub chapter_index: u32,
    pub start_timestamp_millis: Option<i64>,
    pub end_timestamp_millis: Option<i64>,
    pub summary_text: String,
    /// 분할 전 원본 트랜스크립트
    pub transcript: TextInput,
}

// ============================================================================
// Parsing
// ============================================================================

impl AnalysisDocument {
    /// JSON 분석 결과에서 문서 생성
    ///
    /// 두 가지 형태를 받습니다:
    /// - 정규 형태: `video_name`, `video_summary.text`, `chapters[]`
    /// - 분석 서비스 원본 출력: `video.summary`, `chapters[]`
    ///
    /// # Arguments
    /// * `value` - 분석 결과 JSON
    /// * `fallback_video_name` - 문서에 `video_name`이 없을 때 사용할 이름
    pub fn from_json(value: &Value, fallback_video_name: &str) -> Self {
        let video_name = value
            .get("video_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_video_name)
            .to_string();

        let chapters: Vec<Chapter> = value
            .get("chapters")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(Chapter::from_json).collect())
            .unwrap_or_default();

        let video_summary = value
            .pointer("/video_summary/text")
            .or_else(|| value.pointer("/video/summary"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                // 비디오 요약이 없으면 첫 번째 요약 있는 챕터 사용
                value
                    .get("chapters")
                    .and_then(Value::as_array)
                    .and_then(|arr| {
                        arr.iter()
                            .find_map(|c| c.get("summary").and_then(Value::as_str))
                    })
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Self {
            video_name,
            video_summary,
            chapters,
        }
    }
}

impl Chapter {
    fn from_json(value: &Value) -> Self {
        let chapter_index = value
            .get("chapter_index")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(0);

        let summary_text = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            chapter_index,
            start_timestamp_millis: value.get("start_timestamp_millis").and_then(Value::as_i64),
            end_timestamp_millis: value.get("end_timestamp_millis").and_then(Value::as_i64),
            summary_text,
            transcript: transcript_from_value(value.get("transcript").unwrap_or(&Value::Null)),
        }
    }
}

/// 트랜스크립트 필드 해석
///
/// `representation.text`가 있으면 우선 사용하고, 나머지는 `TextInput::from_value`를 따릅니다.
/// 텍스트가 없는 객체는 직렬화하지 않고 빈 트랜스크립트로 취급합니다.
fn transcript_from_value(value: &Value) -> TextInput {
    if let Some(text) = value.pointer("/representation/text").and_then(Value::as_str) {
        return TextInput::StructuredText {
            text: text.to_string(),
        };
    }

    match TextInput::from_value(value) {
        TextInput::PlainText(_) if value.is_object() => TextInput::default(),
        input => input,
    }
}

/// 오브젝트 키에서 비디오 이름 추출
///
/// `video_input/<video>/<uuid>/0/standard_output/0/result.json` 형태면 두 번째 세그먼트,
/// 아니면 마지막 세그먼트의 확장자를 뗀 이름을 사용합니다.
pub fn video_name_from_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() >= 2 && !parts[1].is_empty() {
        return parts[1].to_string();
    }

    let file_name = parts.last().copied().unwrap_or(key);
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_canonical_document() {
        let value = json!({
            "video_name": "demo",
            "video_summary": {"text": "A cat."},
            "chapters": [{
                "chapter_index": 0,
                "summary": "Intro.",
                "transcript": "Hello world. This is a test.",
                "start_timestamp_millis": 0,
                "end_timestamp_millis": 5000
            }]
        });

        let doc = AnalysisDocument::from_json(&value, "fallback");
        assert_eq!(doc.video_name, "demo");
        assert_eq!(doc.video_summary, "A cat.");
        assert_eq!(doc.chapters.len(), 1);

        let chapter = &doc.chapters[0];
        assert_eq!(chapter.summary_text, "Intro.");
        assert_eq!(chapter.transcript.as_str(), "Hello world. This is a test.");
        assert_eq!(chapter.start_timestamp_millis, Some(0));
        assert_eq!(chapter.end_timestamp_millis, Some(5000));
    }

    #[test]
    fn test_parse_raw_analysis_output() {
        let value = json!({
            "video": {"summary": "A documentary about cats."},
            "chapters": [
                {
                    "chapter_index": 1,
                    "summary": "Cats sleeping.",
                    "transcript": {"representation": {"text": "They sleep a lot."}},
                    "start_timestamp_millis": 1000,
                    "end_timestamp_millis": 9000
                },
                {
                    "chapter_index": 2,
                    "transcript": {"text": "Plain text field."}
                }
            ]
        });

        let doc = AnalysisDocument::from_json(&value, "cats");
        assert_eq!(doc.video_name, "cats");
        assert_eq!(doc.video_summary, "A documentary about cats.");
        assert_eq!(
            doc.chapters[0].transcript,
            TextInput::StructuredText {
                text: "They sleep a lot.".into()
            }
        );
        assert_eq!(doc.chapters[1].transcript.as_str(), "Plain text field.");
        assert_eq!(doc.chapters[1].summary_text, "");
        assert_eq!(doc.chapters[1].start_timestamp_millis, None);
    }

    #[test]
    fn test_video_summary_falls_back_to_chapter() {
        let value = json!({
            "chapters": [
                {"chapter_index": 0},
                {"chapter_index": 1, "summary": "Second chapter summary."}
            ]
        });

        let doc = AnalysisDocument::from_json(&value, "v");
        assert_eq!(doc.video_summary, "Second chapter summary.");
    }

    #[test]
    fn test_missing_fields_degrade() {
        let doc = AnalysisDocument::from_json(&json!({}), "empty");
        assert_eq!(doc.video_name, "empty");
        assert_eq!(doc.video_summary, "");
        assert!(doc.chapters.is_empty());

        let doc = AnalysisDocument::from_json(
            &json!({"chapters": [{"transcript": {"speakers": []}}]}),
            "v",
        );
        assert_eq!(doc.chapters[0].chapter_index, 0);
        assert!(doc.chapters[0].transcript.is_blank());

        // 문자열이 아닌 스칼라는 직렬화 문자열
        let doc = AnalysisDocument::from_json(&json!({"chapters": [{"transcript": 42}]}), "v");
        assert_eq!(doc.chapters[0].transcript.as_str(), "42");
    }

    #[test]
    fn test_video_name_from_key() {
        assert_eq!(
            video_name_from_key("video_input/Friends.mp4/uuid/0/standard_output/0/result.json"),
            "Friends.mp4"
        );
        assert_eq!(video_name_from_key("endemo3.mp4"), "endemo3");
        assert_eq!(video_name_from_key("result.json"), "result");
    }
}
