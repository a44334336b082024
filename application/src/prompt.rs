use domain::models::{Prompt, Query, RetrievalResult};
use tracing::debug;

pub const NO_CONTEXT_MARKER: &str = "[no relevant context found]";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Builds the single generation request sent to the model.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_context_chars: usize,
}

impl PromptAssembler {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// Chunk texts go in relevance order. When the budget is exceeded the
    /// lowest-scoring hits are dropped first.
    pub fn assemble(&self, result: &RetrievalResult, query: &Query) -> Prompt {
        let mut texts: Vec<&str> = result.texts().collect();
        let mut total = context_len(&texts);
        while total > self.max_context_chars {
            let Some(dropped) = texts.pop() else { break };
            debug!(chars = dropped.chars().count(), "dropping lowest-scoring chunk from context");
            total = context_len(&texts);
        }

        if texts.is_empty() {
            return self.without_context(query);
        }
        Prompt {
            text: render(&texts.join(CONTEXT_SEPARATOR), query, false),
            context_chunks: texts.len(),
            has_context: true,
        }
    }

    /// Use raw document text as context, cut to the budget.
    pub fn assemble_from_text(&self, text: &str, query: &Query) -> Prompt {
        let context: String = text.chars().take(self.max_context_chars).collect();
        if context.trim().is_empty() {
            return self.without_context(query);
        }
        Prompt {
            text: render(&context, query, false),
            context_chunks: 0,
            has_context: true,
        }
    }

    pub fn without_context(&self, query: &Query) -> Prompt {
        Prompt {
            text: render(NO_CONTEXT_MARKER, query, true),
            context_chunks: 0,
            has_context: false,
        }
    }
}

fn context_len(texts: &[&str]) -> usize {
    let body: usize = texts.iter().map(|t| t.chars().count()).sum();
    body + CONTEXT_SEPARATOR.len() * texts.len().saturating_sub(1)
}

fn render(context: &str, query: &Query, empty: bool) -> String {
    let instruction = if empty {
        "Answer the user's question. No relevant context was found in the document; \
         say so plainly instead of guessing."
    } else {
        "Answer the user's question."
    };
    format!(
        "{instruction}\nContext: {context}\nQuestion: {}",
        query.as_str()
    )
}
