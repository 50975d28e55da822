use std::time::Duration;

use scratch_core::embedder::Embedder;
use scratch_core::error::{Result, ServiceError};

/// A dependency-light, deterministic embedder: feature-hashes whitespace
/// tokens into a fixed-dimension vector and L2-normalizes it. Always
/// available — the fallback that makes the whole system runnable and
/// testable with no network/model dependency, the same role the teacher's
/// `enable_remote_embeddings` toggle plays in `search/src/config.rs`.
pub struct LocalEmbedder {
    dim: usize,
    model_id: String,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        LocalEmbedder {
            dim,
            model_id: format!("local-hash-{dim}"),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let bucket = (fnv1a(token) as usize) % self.dim;
            let sign = if fnv1a(&format!("{token}#sign")) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Calls a remote embeddings HTTP endpoint. Grounded on
/// `search/src/embeddings/mod.rs`'s `EmbeddingsClient`: a timeout-bound
/// `reqwest::Client`, a model id carried with every request, and a response
/// that's accepted as either JSON or msgpack.
pub struct HttpEmbedder {
    base_url: String,
    model_id: String,
    dim: usize,
    use_msgpack: bool,
    http: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: String, model_id: String, dim: usize, use_msgpack: bool, timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ServiceError::ConfigError(format!("embedder client: {e}")))?;
        Ok(HttpEmbedder {
            base_url,
            model_id,
            dim,
            use_msgpack,
            http,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let started = std::time::Instant::now();
        let body = serde_json::json!({ "input": text, "model": self.model_id });
        let response = self
            .http
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(format!("embedding request failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Internal(format!("embedding response read failed: {e}")))?;

        let vector: Vec<f32> = if self.use_msgpack {
            let decoded: EmbeddingResponse = rmp_serde::from_slice(&bytes)
                .map_err(|e| ServiceError::Internal(format!("msgpack decode failed: {e}")))?;
            decoded.vector
        } else {
            let decoded: EmbeddingResponse = serde_json::from_slice(&bytes)
                .map_err(|e| ServiceError::Internal(format!("json decode failed: {e}")))?;
            decoded.vector
        };

        tracing::debug!(
            took_ms = started.elapsed().as_millis() as u64,
            model = %self.model_id,
            "embedding request completed"
        );
        Ok(vector)
    }
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    vector: Vec<f32>,
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.request(text).await?;
        if vector.len() != self.dim {
            return Err(ServiceError::Internal(format!(
                "remote embedder returned dimension {}, expected {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_embedder_is_deterministic() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed("hello scratchpad world").await.unwrap();
        let b = embedder.embed("hello scratchpad world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn local_embedder_distinguishes_inputs() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("beta gamma delta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn local_embedder_normalizes() {
        let embedder = LocalEmbedder::new(32);
        let v = embedder.embed("some reasonably long piece of text").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }
}
