use super::{EmbeddingClient, EmbeddingError};
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic in-process embedding client.
///
/// Folds byte values into positional slots and hashes lowercase word tokens into buckets, then
/// L2-normalizes. Needs no model download, which makes it the default for local runs and tests.
#[derive(Debug, Clone)]
pub struct HashingClient {
    dimension: usize,
}

impl HashingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::ModelUnavailable(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Encode a single text.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let dimension = self.dimension;
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            embedding[idx % dimension] += f32::from(byte) / 255.0;
        }

        for token in text.split_whitespace() {
            let bucket = fnv1a(token.to_lowercase().as_bytes()) % dimension as u64;
            embedding[bucket as usize] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingClient for HashingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tracing::trace!(
            dimension = self.dimension,
            count = texts.len(),
            "Generating hashed embeddings"
        );
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimension() {
        assert!(matches!(
            HashingClient::new(0),
            Err(EmbeddingError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn encoding_is_deterministic_and_normalized() {
        let client = HashingClient::new(64).unwrap();
        let first = client.encode("Certificate of caste issued by the Tehsildar");
        let second = client.encode("Certificate of caste issued by the Tehsildar");
        assert_eq!(first, second);

        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn different_texts_produce_different_vectors() {
        let client = HashingClient::new(64).unwrap();
        assert_ne!(client.encode("date of birth"), client.encode("issuing authority"));
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let client = HashingClient::new(16).unwrap();
        let vectors = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], client.encode("alpha"));
        assert_eq!(vectors[1], client.encode("beta"));
    }
}
