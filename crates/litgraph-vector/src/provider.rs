use async_trait::async_trait;

/// External embedding service.
///
/// `Ok(None)` means the provider is reachable but produced nothing usable
/// for the batch; errors and timeouts are treated the same way by the
/// vectorizer.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Option<Vec<Vec<f32>>>>;

    /// Get provider name for identification
    fn provider_name(&self) -> &str;
}
