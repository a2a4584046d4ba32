use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::VisionProvider;
use crate::models::ImageAttachment;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, image: &ImageAttachment) -> anyhow::Result<String> {
        anyhow::ensure!(!self.api_key.is_empty(), "GEMINI_API_KEY is not set");

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": image.data_base64,
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "priceRange": { "type": "STRING" },
                        "planRecommendation": { "type": "STRING" },
                        "reasoning": { "type": "STRING" }
                    },
                    "required": ["priceRange", "planRecommendation", "reasoning"]
                }
            }
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call Gemini API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Gemini response")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API error ({}): {}", status, data);
        }

        let text: String = data["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("missing text in Gemini response");
        }

        Ok(text)
    }
}
