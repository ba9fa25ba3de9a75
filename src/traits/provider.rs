use async_trait::async_trait;

use crate::errors::ProviderError;

/// An external embedding/LLM provider.
///
/// `embed` receives one batch of texts. A whole-call failure is returned as `Err`;
/// otherwise the result holds one entry per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Vec<f32>, ProviderError>>, ProviderError>;
}
