//! Gemini configuration

use serde::{Deserialize, Serialize};
use std::env;
use hrag_core::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 3072;

/// Configuration for the Gemini client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub embedding_dimension: usize,
}

impl GeminiConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .map_err(|_| Error::Configuration(
                "GOOGLE_API_KEY or GEMINI_API_KEY environment variable not found".to_string()
            ))?;

        let api_url = env::var("GEMINI_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let embedding_model = env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let generation_model = env::var("GENERATION_MODEL")
            .unwrap_or_else(|_| DEFAULT_GENERATION_MODEL.to_string());

        let embedding_dimension = match env::var("EMBEDDING_DIMENSION") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| Error::Configuration(
                format!("EMBEDDING_DIMENSION must be a positive integer: {}", e)
            ))?,
            Err(_) => DEFAULT_EMBEDDING_DIMENSION,
        };

        let config = Self {
            api_key,
            api_url,
            embedding_model,
            generation_model,
            embedding_dimension,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration with explicit values
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Configuration("Gemini API key is empty".to_string()));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::Configuration("embedding dimension cannot be zero".to_string()));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| Error::Configuration(format!("invalid Gemini API URL '{}': {}", self.api_url, e)))?;
        Ok(())
    }
}
