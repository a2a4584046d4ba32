use std::time::Duration;

use crate::models::{Estimate, ImageAttachment};
use crate::services::ai::VisionProvider;

pub const DEFAULT_DESCRIPTION: &str = "不用品回収の依頼です。";

const ESTIMATE_PROMPT: &str = r#"You are a professional junk removal estimator. Analyze the provided image and the user's description.

Based on the volume and type of items visible in the image (or described), estimate the cost and recommend a truck plan.

Our Plans:
1. 軽トラパック (Light Truck Plan, small volume, approx 10,000 - 20,000 JPY)
2. 1tトラックパック (1-Ton Truck Plan, medium volume, approx 25,000 - 45,000 JPY)
3. 2tトラックパック (2-Ton Truck Plan, large volume, approx 50,000 - 80,000 JPY)

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "priceRange": "estimated price range, e.g. 15,000円 - 20,000円",
  "planRecommendation": "the plan that fits best, e.g. 軽トラパック",
  "reasoning": "brief explanation of the estimate, in Japanese, max 100 characters"
}
"#;

pub struct Estimator {
    provider: Box<dyn VisionProvider>,
    timeout: Duration,
}

impl Estimator {
    pub fn new(provider: Box<dyn VisionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn estimate(&self, image: &ImageAttachment, description: &str) -> Estimate {
        let prompt = build_prompt(description);

        let response =
            match tokio::time::timeout(self.timeout, self.provider.generate(&prompt, image)).await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "estimation call failed, using fallback");
                    return Estimate::fallback();
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.timeout.as_secs_f32(),
                        "estimation call timed out, using fallback"
                    );
                    return Estimate::fallback();
                }
            };

        match parse_estimate_response(&response) {
            Some(estimate) => {
                tracing::info!(
                    plan = %estimate.plan_recommendation,
                    price_range = %estimate.price_range,
                    "estimate produced"
                );
                estimate
            }
            None => {
                tracing::warn!("failed to parse estimation response, using fallback");
                Estimate::fallback()
            }
        }
    }
}

fn build_prompt(description: &str) -> String {
    let description = match description.trim() {
        "" => DEFAULT_DESCRIPTION,
        d => d,
    };
    format!("{ESTIMATE_PROMPT}\nUser Description: \"{description}\"\n")
}

fn parse_estimate_response(response: &str) -> Option<Estimate> {
    if let Ok(estimate) = serde_json::from_str::<Estimate>(response) {
        return Some(estimate);
    }

    // Strip markdown code fences
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    serde_json::from_str::<Estimate>(cleaned).ok()
}
