use crate::error::Result;

/// The seam between the catalog store (`scratch-store`) and embedding
/// generation (`scratch-search`). Kept in the shared crate so neither
/// service crate depends on the other — only on this trait.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Produces a fixed-dimension vector for `text`. Implementations decide
    /// their own dimension; the store validates it against its configured
    /// table dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifies the model/version used, recorded as `embedding_version` on
    /// each embedding row (`§4.E`).
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;
}
