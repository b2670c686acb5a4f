//! Prompt construction for repository analysis.

use crate::evidence::record::{META_LANGUAGES, META_PRIMARY_LANGUAGE, META_TOPICS};
use crate::evidence::EvidenceRecord;
use crate::llms::base_llm::LLMMessage;
use crate::synthesis::narrative::Tone;
use crate::utilities::string_utils::truncate_chars;

/// Characters of raw content included in a prompt.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 8000;

const ANALYST_PROMPT: &str = r#"You are a senior software engineer auditing ONE repository.
Use only the evidence in the user message. Do not guess about other repositories.

Respond with a single JSON object and nothing else:
{
  "summary": "<two or three sentences on what the repository is and does>",
  "complexity_score": <integer 1-10, technical difficulty>,
  "tech_signals": [{"technology": "<name>", "confidence": <0.0-1.0>}],
  "claims": [
    {
      "text": "<one factual statement about the developer's work>",
      "confidence": <0.0-1.0>,
      "citations": [{"field": "raw_content | source_uri | metadata.<key>", "quote": "<verbatim span of that field>"}],
      "role": {"kind": "primary_language | primary_framework | specialization | domain", "value": "<value>"}
    }
  ]
}

Rules:
- Every claim needs at least one citation whose quote appears verbatim in the cited field.
- If you cannot cite a statement, leave it out.
- "role" is optional; use it only when the claim states a primary language, framework, specialization or domain.
- Confidence values must be between 0 and 1."#;

/// System message: analyst instructions plus tone and custom instructions.
pub fn analyst_system_prompt(tone: Tone, custom_instructions: Option<&str>) -> String {
    let mut prompt = ANALYST_PROMPT.to_string();
    if let Some(directive) = tone.prompt_directive() {
        prompt.push_str("\n\n");
        prompt.push_str(&directive);
    }
    if let Some(custom) = custom_instructions.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nUser custom instructions:\n");
        prompt.push_str(custom.trim());
    }
    prompt
}

/// User message describing exactly one evidence record.
pub fn evidence_context(record: &EvidenceRecord, max_content_chars: usize) -> String {
    let meta = |key: &str| {
        record
            .meta(key)
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    };

    let mut lines = vec![
        format!("Repository: {}", record.subject_id()),
        format!("Source: {}", record.source_uri()),
        format!("Description: {}", record.description().unwrap_or("none")),
        format!("Primary language: {}", meta(META_PRIMARY_LANGUAGE)),
        format!("Languages: {}", meta(META_LANGUAGES)),
        format!("Topics: {}", meta(META_TOPICS)),
        format!("Stars: {}", record.stars()),
        String::new(),
        "Metadata fields:".to_string(),
    ];
    for (key, value) in record.metadata() {
        lines.push(format!("- metadata.{key}: {value}"));
    }

    let content = record.raw_content();
    let truncated = truncate_chars(content, max_content_chars);
    lines.push(String::new());
    lines.push("README content (field raw_content):".to_string());
    lines.push(truncated.to_string());
    if truncated.len() < content.len() {
        lines.push("[... README truncated ...]".to_string());
    }
    lines.join("\n")
}

/// Full conversation for one analysis attempt.
pub fn analysis_messages(
    record: &EvidenceRecord,
    tone: Tone,
    custom_instructions: Option<&str>,
    max_content_chars: usize,
) -> Vec<LLMMessage> {
    vec![
        LLMMessage::system(analyst_system_prompt(tone, custom_instructions)),
        LLMMessage::user(evidence_context(record, max_content_chars)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::record::META_STARS;
    use crate::evidence::EvidenceKind;

    #[test]
    fn test_system_prompt_includes_tone_and_custom_instructions() {
        let plain = analyst_system_prompt(Tone::Professional, None);
        assert!(!plain.contains("TONE"));

        let roast = analyst_system_prompt(Tone::Roast, Some("Focus on testing practices"));
        assert!(roast.contains("TONE: Roast"));
        assert!(roast.ends_with("Focus on testing practices"));
    }

    #[test]
    fn test_context_truncates_readme() {
        let readme = "x".repeat(50);
        let record = EvidenceRecord::new(EvidenceKind::Repository, "a/b", readme, "https://github.com/a/b")
            .with_metadata(META_STARS, 7);
        let context = evidence_context(&record, 10);
        assert!(context.contains(&"x".repeat(10)));
        assert!(!context.contains(&"x".repeat(11)));
        assert!(context.contains("[... README truncated ...]"));
        assert!(context.contains("- metadata.stars: 7"));
    }

    #[test]
    fn test_context_mentions_only_its_record() {
        let record = EvidenceRecord::new(EvidenceKind::Repository, "a/only", "hello", "");
        let messages = analysis_messages(&record, Tone::Professional, None, DEFAULT_MAX_CONTENT_CHARS);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Repository: a/only"));
        assert!(!messages[1].content.contains("truncated"));
    }
}
