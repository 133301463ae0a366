mod client;
pub(crate) mod types;

pub use types::{Candidate, Content, GenerateContentResponse, Part};

use crate::error::Result;
use client::GeminiClient;
use types::GenerateContentRequest;

// =============================================================================
// Gemini
// =============================================================================

/// Stateless Gemini client. Every call is an independent single-turn request,
/// so one instance can be shared across concurrent tasks.
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    http: reqwest::Client,
    base_url: Option<String>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Send a single user prompt to `model` and return the raw response,
    /// candidates included. An empty candidate list is not an error here.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<GenerateContentResponse> {
        let request = GenerateContentRequest::user_text(prompt);
        self.client().generate_content(model, &request).await
    }
}
