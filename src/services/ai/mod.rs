pub mod estimate;
pub mod gemini;

use async_trait::async_trait;

use crate::models::ImageAttachment;

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn generate(&self, prompt: &str, image: &ImageAttachment) -> anyhow::Result<String>;
}
