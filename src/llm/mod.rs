pub mod gemini;
pub mod media;

use anyhow::Result;
use async_trait::async_trait;

use media::UploadedImage;

pub use gemini::{GeminiAnalyzer, GeminiSettings};

/// Describes the person in an uploaded photograph as free text.
#[async_trait]
pub trait AttributeAnalyzer: Send + Sync {
    async fn analyze(&self, image: &UploadedImage) -> Result<String>;
}
