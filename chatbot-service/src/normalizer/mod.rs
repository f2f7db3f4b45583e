//! Response normalization.
//!
//! Raw model output is cleaned by an ordered pipeline of pure stages. Each
//! stage takes the previous stage's output, so the order is part of the
//! contract: the punctuation guarantee must see the sentence-trimmed text,
//! and the quality gates must see the final candidate answer.

use std::collections::HashSet;

use crate::config::NormalizerConfig;

/// Markers of the model drifting into a new speaker turn or label.
pub const DEFAULT_STOP_PHRASES: &[&str] = &[
    "답변:",
    "답변을:",
    "지원장:",
    "대답:",
    "지원자의:",
    "답변이:",
    "싶습니네:",
    "지원사:",
    "말씀:",
    "네:",
];

/// Substituted when the answer is dominated by repeated words.
pub const REPETITION_FALLBACK: &str =
    "질문에 대해 정확한 답변을 제공하기 어려웠습니다. 다시 질문해주세요.";

/// Substituted when nothing usable survives the pipeline.
pub const REPHRASE_FALLBACK: &str = "잘 이해하지 못했습니다. 다시 질문해주세요.";

const SENTENCE_ENDINGS: [char; 3] = ['.', '?', '!'];

/// Why a fallback message replaced the generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Repetition,
    Degenerate,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Repetition => "repetition",
            FallbackReason::Degenerate => "degenerate",
        }
    }
}

/// Cleaned, user-presentable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAnswer {
    text: String,
    fallback: Option<FallbackReason>,
}

impl NormalizedAnswer {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Set when the generated text was discarded in favour of a fixed message.
    pub fn fallback(&self) -> Option<FallbackReason> {
        self.fallback
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Configured normalization pipeline.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stop_phrases: Vec<String>,
    sentence_trim_threshold: usize,
    min_unique_ratio: f64,
    min_answer_chars: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            stop_phrases: config.stop_phrases.clone(),
            sentence_trim_threshold: config.sentence_trim_threshold,
            min_unique_ratio: config.min_unique_ratio,
            min_answer_chars: config.min_answer_chars,
        }
    }

    /// Run every stage in order over `raw`, the model output for `query`.
    pub fn normalize(&self, raw: &str, query: &str) -> NormalizedAnswer {
        let text = strip_echo(raw, query);
        let text = strip_leading_separator(text);
        let text = truncate_at_stop_phrases(text, &self.stop_phrases);
        let text = trim_to_last_sentence(text, self.sentence_trim_threshold);
        let text = ensure_terminal_period(text);

        if is_repetitive(&text, self.min_unique_ratio) {
            return NormalizedAnswer {
                text: REPETITION_FALLBACK.to_string(),
                fallback: Some(FallbackReason::Repetition),
            };
        }

        if is_degenerate(&text, self.min_answer_chars) {
            return NormalizedAnswer {
                text: REPHRASE_FALLBACK.to_string(),
                fallback: Some(FallbackReason::Degenerate),
            };
        }

        NormalizedAnswer {
            text,
            fallback: None,
        }
    }
}

/// Normalize with the default stop phrases and thresholds.
pub fn normalize(raw: &str, query: &str) -> NormalizedAnswer {
    Normalizer::default().normalize(raw, query)
}

/// Stage 1: drop the prompt if the model echoed it back.
pub fn strip_echo<'a>(raw: &'a str, query: &str) -> &'a str {
    let text = raw.trim();
    match text.strip_prefix(query) {
        Some(rest) => rest.trim(),
        None => text,
    }
}

/// Stage 2: drop a single leading `:` left behind by an echoed label.
pub fn strip_leading_separator(text: &str) -> &str {
    match text.strip_prefix(':') {
        Some(rest) => rest.trim(),
        None => text,
    }
}

/// Stage 3: cut everything from the first occurrence of each stop phrase.
///
/// Phrases are tried in list order, each against the output of the previous
/// cut.
pub fn truncate_at_stop_phrases<'a, S: AsRef<str>>(text: &'a str, phrases: &[S]) -> &'a str {
    phrases.iter().fold(text, |current, phrase| {
        let phrase = phrase.as_ref();
        if phrase.is_empty() {
            return current;
        }
        match current.find(phrase) {
            Some(idx) => current[..idx].trim(),
            None => current,
        }
    })
}

/// Stage 4: for long text, discard the dangling fragment after the last
/// sentence ending.
pub fn trim_to_last_sentence(text: &str, threshold: usize) -> &str {
    if text.chars().count() <= threshold {
        return text;
    }
    match text.rfind(SENTENCE_ENDINGS) {
        // Sentence endings are single-byte, so idx + 1 is a char boundary.
        Some(idx) => text[..=idx].trim(),
        None => text,
    }
}

/// Stage 5: make sure the answer ends with a period.
pub fn ensure_terminal_period(text: &str) -> String {
    if text.ends_with('.') {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

/// Stage 6 check: fewer distinct words than `min_unique_ratio` of all words.
pub fn is_repetitive(text: &str, min_unique_ratio: f64) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let unique: HashSet<&str> = tokens.iter().copied().collect();
    (unique.len() as f64) < (tokens.len() as f64) * min_unique_ratio
}

/// Stage 7 check: too short or blank to be an answer.
pub fn is_degenerate(text: &str, min_chars: usize) -> bool {
    text.chars().count() < min_chars || text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_and_colon_are_stripped() {
        let query = "팀 프로젝트에서 갈등을 해결한 경험이 있습니다";
        let raw = format!("{}: 그때 어떤 역할을 맡으셨나요", query);

        let answer = normalize(&raw, query);
        assert_eq!(answer.as_str(), "그때 어떤 역할을 맡으셨나요.");
        assert_eq!(answer.fallback(), None);
    }

    #[test]
    fn test_actual_answer_after_echo() {
        let answer = normalize("hello there: actual answer", "hello there");
        assert_eq!(answer.as_str(), "actual answer.");
    }

    #[test]
    fn test_strip_echo_leaves_unrelated_text() {
        assert_eq!(strip_echo("  something else  ", "query"), "something else");
        assert_eq!(strip_echo("query rest", "query"), "rest");
    }

    #[test]
    fn test_strip_leading_separator_only_once() {
        assert_eq!(strip_leading_separator(": answer"), "answer");
        assert_eq!(strip_leading_separator("::answer"), ":answer");
        assert_eq!(strip_leading_separator("answer: x"), "answer: x");
    }

    #[test]
    fn test_stop_phrase_truncates_and_trims() {
        let answer = normalize("어떤 기술을 사용하셨나요 답변: 저는 러스트를", "질문");
        assert_eq!(answer.as_str(), "어떤 기술을 사용하셨나요.");
    }

    #[test]
    fn test_stop_phrases_apply_to_truncated_text_in_order() {
        // "대답:" cuts first; "네:" is then searched in the shortened text only.
        let text = "처음 문장 네: 중간 대답: 끝 네: 꼬리";
        let cut = truncate_at_stop_phrases(text, DEFAULT_STOP_PHRASES);
        assert_eq!(cut, "처음 문장");

        let phrases = ["B:", "A:"];
        assert_eq!(truncate_at_stop_phrases("x A: y B: z", &phrases), "x");
    }

    #[test]
    fn test_stop_phrase_at_start_empties_text() {
        assert_eq!(truncate_at_stop_phrases("답변: 전부", DEFAULT_STOP_PHRASES), "");
        let answer = normalize("답변: 전부", "질문");
        assert_eq!(answer.as_str(), REPHRASE_FALLBACK);
        assert_eq!(answer.fallback(), Some(FallbackReason::Degenerate));
    }

    #[test]
    fn test_long_text_trimmed_to_last_sentence() {
        let text = "This is the first sentence of the answer. And here is a second one that got cut";
        assert!(text.chars().count() > 50);
        assert_eq!(
            trim_to_last_sentence(text, 50),
            "This is the first sentence of the answer."
        );
    }

    #[test]
    fn test_rightmost_of_any_ending_wins() {
        let text = "Is this the question you wanted to ask me? Yes! I think so and then some more";
        assert_eq!(
            trim_to_last_sentence(text, 50),
            "Is this the question you wanted to ask me? Yes!"
        );
    }

    #[test]
    fn test_short_text_is_not_sentence_trimmed() {
        let text = "Short. but dangling";
        assert_eq!(trim_to_last_sentence(text, 50), text);
    }

    #[test]
    fn test_threshold_counts_characters_not_bytes() {
        // 30 Hangul syllables are 90 bytes but only 30 characters.
        let text = format!("{}. 꼬리", "가".repeat(30));
        assert_eq!(trim_to_last_sentence(&text, 50), text);
    }

    #[test]
    fn test_long_text_without_endings_is_kept() {
        let text = "a".repeat(60);
        assert_eq!(trim_to_last_sentence(&text, 50), text);
    }

    #[test]
    fn test_period_appended_literally() {
        assert_eq!(ensure_terminal_period("done."), "done.");
        assert_eq!(ensure_terminal_period("really?"), "really?.");
        assert_eq!(ensure_terminal_period(""), ".");
    }

    #[test]
    fn test_repetition_uses_fallback() {
        let answer = normalize("네 네 네 네 네", "질문");
        assert_eq!(answer.as_str(), REPETITION_FALLBACK);
        assert_eq!(answer.fallback(), Some(FallbackReason::Repetition));
    }

    #[test]
    fn test_repetition_threshold_boundary() {
        // 7 distinct of 10 is exactly 70%: kept.
        assert!(!is_repetitive("a b c d e f g a a a", 0.7));
        // 6 distinct of 10 falls below.
        assert!(is_repetitive("a b c d e f a a a a", 0.7));
        assert!(!is_repetitive("", 0.7));
    }

    #[test]
    fn test_short_output_uses_rephrase_fallback() {
        let answer = normalize("응", "질문");
        assert_eq!(answer.as_str(), REPHRASE_FALLBACK);

        let answer = normalize("   ", "질문");
        assert_eq!(answer.as_str(), REPHRASE_FALLBACK);
    }

    #[test]
    fn test_pure_echo_becomes_rephrase_fallback() {
        let answer = normalize("같은 말", "같은 말");
        assert_eq!(answer.as_str(), REPHRASE_FALLBACK);
    }

    #[test]
    fn test_answers_always_terminated() {
        let samples = [
            "그 경험에서 무엇을 배우셨나요",
            "What did you learn from that experience? I wonder what the next step",
            "Tell me more!",
            "",
            "네 네 네",
        ];
        for raw in samples {
            let answer = normalize(raw, "query");
            assert!(!answer.as_str().is_empty());
            assert!(answer.as_str().ends_with(SENTENCE_ENDINGS), "{:?}", answer);
        }
    }

    #[test]
    fn test_custom_config_is_respected() {
        let config = NormalizerConfig {
            stop_phrases: vec!["Q:".to_string()],
            sentence_trim_threshold: 10,
            min_unique_ratio: 0.5,
            min_answer_chars: 3,
        };
        let normalizer = Normalizer::new(&config);

        let answer = normalizer.normalize("Fine. Thanks for asking Q: next", "hi");
        assert_eq!(answer.as_str(), "Fine.");
    }
}
