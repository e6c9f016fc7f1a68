//! Gemini client implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use hrag_core::{
    DenseVector, EmbeddingProvider, EmbeddingTask, Error, GenerationConfig, GenerationResult,
    LLMProvider, Result,
};

use crate::config::GeminiConfig;

/// Gemini client: dense embeddings and text generation over the REST API
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
pub(crate) struct Part {
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<&'static str>,
    pub(crate) parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmbedContentRequest {
    pub(crate) model: String,
    pub(crate) content: Content,
    pub(crate) task_type: &'static str,
    pub(crate) output_dimensionality: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentEmbedding {
    #[serde(default)]
    pub(crate) values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbedContentResponse {
    pub(crate) embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationParams {
    pub(crate) max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,
    pub(crate) generation_config: GenerationParams,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponsePart {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub(crate) parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub(crate) total_token_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,
    #[serde(default)]
    pub(crate) usage_metadata: Option<UsageMetadata>,
}

impl GeminiClient {
    /// Model constants
    pub const GEMINI_EMBEDDING_001: &'static str = "gemini-embedding-001";
    pub const GEMINI_1_5_FLASH: &'static str = "gemini-1.5-flash";

    /// Create a new Gemini client from configuration
    pub fn new(config: GeminiConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Create a new Gemini client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = GeminiConfig::from_env()?;
        Self::new(config)
    }

    /// Set the model to use for generation
    pub fn with_generation_model(mut self, model_id: impl Into<String>) -> Self {
        self.config.generation_model = model_id.into();
        self
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// `models/<name>`, accepting names with or without the prefix.
    pub(crate) fn model_path(model: &str) -> String {
        format!("models/{}", model.trim_start_matches("models/"))
    }

    pub(crate) fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.api_url.trim_end_matches('/'),
            Self::model_path(model),
            method
        )
    }

    pub(crate) fn embed_request(&self, text: &str, task: EmbeddingTask) -> EmbedContentRequest {
        EmbedContentRequest {
            model: Self::model_path(&self.config.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text: text.to_string() }],
            },
            task_type: task.as_str(),
            output_dimensionality: self.config.embedding_dimension,
        }
    }

    pub(crate) fn generation_request(prompt: &str, config: &GenerationConfig) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationParams {
                max_output_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                stop_sequences: config.stop_sequences.clone(),
            },
        }
    }

    /// Pull the embedding out of a response, refusing anything that would
    /// corrupt a cosine search.
    pub(crate) fn vector_from_response(
        response: EmbedContentResponse,
        expected_dimension: usize,
    ) -> Result<DenseVector> {
        let values = response
            .embedding
            .map(|e| e.values)
            .unwrap_or_default();

        if values.is_empty() {
            return Err(Error::Embedding("Empty embedding in Gemini response".to_string()));
        }

        if values.len() != expected_dimension {
            return Err(Error::Embedding(format!(
                "Expected {} dimensions, got {}",
                expected_dimension,
                values.len()
            )));
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Embedding("Embedding contains non-finite values".to_string()));
        }

        Ok(values)
    }

    /// Concatenate the text parts of the first candidate.
    pub(crate) fn text_from_response(response: &GenerateContentResponse) -> Option<String> {
        let content = response.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();

        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(e.to_string())
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Perform the actual generation request
    async fn perform_generation(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let url = self.endpoint(&config.model_id, "generateContent");
        let request_body = Self::generation_request(prompt, config);

        let response: GenerateContentResponse = self.post_json(&url, &request_body).await?;

        let text = Self::text_from_response(&response).ok_or_else(|| {
            Error::LLMProvider("Empty response from Gemini API".to_string())
        })?;

        Ok(GenerationResult {
            text,
            model_id: config.model_id.clone(),
            tokens_used: response.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<DenseVector> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
        }

        let url = self.endpoint(&self.config.embedding_model, "embedContent");
        let request_body = self.embed_request(text, task);

        debug!(model = %self.config.embedding_model, task = task.as_str(), "requesting embedding");
        let response: EmbedContentResponse = self.post_json(&url, &request_body).await?;

        Self::vector_from_response(response, self.config.embedding_dimension)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }
}

#[async_trait]
impl LLMProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let config = GenerationConfig {
            model_id: self.config.generation_model.clone(),
            ..Default::default()
        };
        self.generate_with_config(prompt, &config).await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let generation_future = self.perform_generation(prompt, config);

        match timeout(config.timeout, generation_future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("Request timed out".to_string())),
        }
    }

    fn model_id(&self) -> &str {
        &self.config.generation_model
    }
}
