//! Grounded answer generation

use std::sync::Arc;

use tracing::warn;

use hrag_core::{
    ContextBundle, Degradation, GenerationConfig, LLMProvider, INSUFFICIENT_INFORMATION,
};

/// Build the instruction prompt for one question and its context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful hospital information assistant. Answer the question using only \
the context below. If the context does not contain the answer, reply exactly: \
\"{refusal}\"\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:",
        refusal = INSUFFICIENT_INFORMATION,
        context = context,
        question = question.trim(),
    )
}

/// Answer text plus the reason it fell back, if it did.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub degradation: Option<Degradation>,
}

impl GeneratedAnswer {
    fn fallback(reason: String) -> Self {
        Self {
            text: INSUFFICIENT_INFORMATION.to_string(),
            degradation: Some(Degradation::GenerationFailed { reason }),
        }
    }
}

/// Turns a question and its assembled context into an answer.
///
/// Generation never fails the query: provider errors and empty output are
/// replaced by the refusal phrase.
pub struct AnswerGenerator {
    llm: Arc<dyn LLMProvider>,
    config: GenerationConfig,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        let config = GenerationConfig {
            model_id: llm.model_id().to_string(),
            ..GenerationConfig::default()
        };
        Self { llm, config }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub async fn answer(&self, question: &str, bundle: &ContextBundle) -> GeneratedAnswer {
        let prompt = build_prompt(question, &bundle.context);

        match self.llm.generate_with_config(&prompt, &self.config).await {
            Ok(result) if !result.text.trim().is_empty() => GeneratedAnswer {
                text: result.text.trim().to_string(),
                degradation: None,
            },
            Ok(_) => {
                warn!(model = %self.config.model_id, "model returned an empty answer");
                GeneratedAnswer::fallback("empty model output".to_string())
            }
            Err(e) => {
                warn!(model = %self.config.model_id, error = %e, "answer generation failed");
                GeneratedAnswer::fallback(e.to_string())
            }
        }
    }
}
