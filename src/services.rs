//! Remote model seams. The orchestrator only talks to these traits; the
//! Gemini-compatible client in [`crate::gemini`] is the production backing.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::UpstreamError;
use crate::models::{NarrativeOut, StyleDna};

/// Already-sanitized inputs for one slide's narrative.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NarrativeRequest {
    pub slide: u32,
    pub guidance: String,
    pub context: Option<String>,
    pub emotion: Vec<String>,
    /// Set when a previous answer lost its subject to sanitizing.
    pub retry_reason: Option<String>,
}

#[async_trait]
pub trait IntelligenceModel: Send + Sync {
    async fn analyze_reference_image(&self, image_url: &str, model: &str) -> Result<StyleDna, UpstreamError>;

    async fn generate_narrative(&self, request: &NarrativeRequest, model: &str) -> Result<NarrativeOut, UpstreamError>;
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Returns a URL (possibly a `data:` URL) for the generated image.
    async fn generate_image(&self, prompt: &str, model: &str, aspect_ratio: Option<&str>) -> Result<String, UpstreamError>;
}
