//! Answer composition: retrieved chunks → bounded prompt → generated answer.
//!
//! The whole prompt (system text, instructions, question and context)
//! never exceeds `max_context_chars`; the context gets whatever the fixed
//! parts leave over. Chunks go in by rank; the first one that does not fit is cut to the
//! remaining budget and everything ranked below it is left out. The
//! answer's sources are the distinct document names of the chunks that
//! actually made it into the prompt, in rank order.

use std::sync::Arc;

use tracing::info;

use crate::error::PipelineError;
use crate::generation::{Generator, Prompt};
use crate::models::{Answer, ScoredChunk};
use crate::retrieve::Retriever;

const SYSTEM_PROMPT: &str =
    "You are an expert assistant that answers questions using only the documents provided to you.";

const INSTRUCTIONS: &str = "\
Answer the question using only the documents below.

Rules:
- Use only information found in the documents.
- If the documents do not contain the answer, say so plainly.
- Mention the names of the documents you relied on.
- Be concise and use bullet points for lists.";

/// Prompt context built from ranked chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedContext {
    pub text: String,
    pub sources: Vec<String>,
    pub chunks_used: usize,
    pub truncated: bool,
}

/// Lay out `chunks` (best first) within `budget` characters.
pub fn compose_context(chunks: &[ScoredChunk], budget: usize) -> ComposedContext {
    let mut text = String::new();
    let mut used = 0usize;
    let mut sources: Vec<String> = Vec::new();
    let mut chunks_used = 0usize;
    let mut truncated = false;

    for (i, c) in chunks.iter().enumerate() {
        let header = format!("[Document {} - {}]\n", i + 1, c.chunk.document);
        let header_len = header.chars().count();
        let body_len = c.chunk.text.chars().count();
        let block_len = header_len + body_len + 2;
        let remaining = budget - used;

        let body: String = if block_len <= remaining {
            c.chunk.text.clone()
        } else {
            truncated = true;
            let room = remaining.saturating_sub(header_len + 2);
            if room == 0 {
                break;
            }
            c.chunk.text.chars().take(room).collect()
        };

        used += header_len + body.chars().count() + 2;
        text.push_str(&header);
        text.push_str(&body);
        text.push_str("\n\n");
        chunks_used += 1;
        if !sources.contains(&c.chunk.document) {
            sources.push(c.chunk.document.clone());
        }
        if truncated {
            break;
        }
    }

    ComposedContext {
        text,
        sources,
        chunks_used,
        truncated,
    }
}

pub fn build_prompt(question: &str, context: &str) -> Prompt {
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "{}\n\nDocuments:\n{}\nQuestion: {}\n\nAnswer:",
            INSTRUCTIONS,
            context,
            question.trim()
        ),
    }
}

/// Characters left for context once the fixed prompt parts and the
/// question are counted against `max_prompt_chars`.
pub fn context_budget(question: &str, max_prompt_chars: usize) -> usize {
    let frame = build_prompt(question, "");
    let fixed = frame.system.chars().count() + frame.user.chars().count();
    max_prompt_chars.saturating_sub(fixed)
}

pub struct AnswerComposer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    max_context_chars: usize,
}

impl AnswerComposer {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, max_context_chars: usize) -> Self {
        Self {
            retriever,
            generator,
            max_context_chars,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` from the index.
    ///
    /// No generation call is made when nothing relevant is retrieved.
    pub async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let chunks = self.retriever.retrieve(question).await?;
        let budget = context_budget(question, self.max_context_chars);
        let context = compose_context(&chunks, budget);
        if context.chunks_used == 0 {
            return Err(PipelineError::NoRelevantContext);
        }

        let prompt = build_prompt(question, &context.text);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(PipelineError::GenerationService)?;

        info!(
            chunks = context.chunks_used,
            truncated = context.truncated,
            sources = context.sources.len(),
            "answered"
        );
        Ok(Answer {
            text,
            sources: context.sources,
            grounded: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(document: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                document: document.to_string(),
                chunk_index: 0,
                char_offset: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            source: "fs:t".to_string(),
            score,
            seq: 0,
        }
    }

    #[test]
    fn test_context_fits_entirely() {
        let chunks = vec![scored("a.pdf", "alpha", 0.9), scored("b.txt", "beta", 0.8)];
        let ctx = compose_context(&chunks, 10_000);
        assert_eq!(
            ctx.text,
            "[Document 1 - a.pdf]\nalpha\n\n[Document 2 - b.txt]\nbeta\n\n"
        );
        assert_eq!(ctx.sources, vec!["a.pdf", "b.txt"]);
        assert!(!ctx.truncated);
    }

    #[test]
    fn test_first_overflowing_chunk_is_cut_and_rest_dropped() {
        let chunks = vec![
            scored("a", &"x".repeat(50), 0.9),
            scored("b", &"y".repeat(50), 0.8),
            scored("c", "tiny", 0.7),
        ];
        let budget = 100;
        let ctx = compose_context(&chunks, budget);
        assert!(ctx.text.chars().count() <= budget);
        assert!(ctx.truncated);
        assert_eq!(ctx.chunks_used, 2);
        assert_eq!(ctx.sources, vec!["a", "b"]);
        assert!(!ctx.text.contains("tiny"));
        assert!(ctx.text.contains(&"x".repeat(50)));
    }

    #[test]
    fn test_sources_are_distinct_in_rank_order() {
        let chunks = vec![
            scored("b", "one", 0.9),
            scored("a", "two", 0.8),
            scored("b", "three", 0.7),
        ];
        let ctx = compose_context(&chunks, 10_000);
        assert_eq!(ctx.sources, vec!["b", "a"]);
        assert_eq!(ctx.chunks_used, 3);
    }

    #[test]
    fn test_budget_too_small_for_any_text() {
        let chunks = vec![scored("long-document-name.pdf", "content", 0.9)];
        let ctx = compose_context(&chunks, 10);
        assert_eq!(ctx.chunks_used, 0);
        assert!(ctx.sources.is_empty());
        assert!(ctx.text.is_empty());
    }

    #[test]
    fn test_whole_prompt_stays_within_budget() {
        let chunks = vec![
            scored("a", &"x".repeat(400), 0.9),
            scored("b", &"y".repeat(400), 0.8),
        ];
        let max = 1000;
        for question in ["short?", &"why ".repeat(60)] {
            let ctx = compose_context(&chunks, context_budget(question, max));
            let prompt = build_prompt(question, &ctx.text);
            let total = prompt.system.chars().count() + prompt.user.chars().count();
            assert!(total <= max, "{} > {}", total, max);
            assert!(ctx.chunks_used >= 1);
        }
    }

    #[test]
    fn test_long_question_shrinks_context_budget() {
        let short = context_budget("short?", 2000);
        let long = context_budget(&"why ".repeat(100), 2000);
        assert_eq!(short - long, "why ".repeat(100).trim().chars().count() - "short?".len());
        assert_eq!(context_budget(&"q".repeat(5000), 2000), 0);
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("  What is X? ", "[Document 1 - a]\nX is Y\n\n");
        assert!(prompt.user.contains("[Document 1 - a]\nX is Y"));
        assert!(prompt.user.ends_with("Question: What is X?\n\nAnswer:"));
        assert!(prompt.system.contains("documents"));
    }
}
