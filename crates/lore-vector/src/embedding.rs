//! Embedder trait and built-in implementations.
//!
//! - `HashingEmbedder` produces deterministic feature-hashed bag-of-words
//!   vectors. It is the default backend when no model is plugged in.
//! - `MockEmbedding` provides deterministic hash-of-text vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use tracing::debug;

use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, IndexedVector};

/// Service for turning text into fixed-dimension vectors.
///
/// Implementations must be deterministic for a pinned model: the same text
/// always maps to the same vector.
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed several texts, preserving order.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Return the dimensionality of vectors produced by this embedder.
    fn dimensions(&self) -> usize;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`Embedder`] for dynamic dispatch.
///
/// `Embedder::embed` returns `impl Future`, which is not object-safe. This
/// trait boxes the future instead so `Arc<dyn DynEmbedder>` can be stored in
/// structs without generics. Every `Embedder` gets it through the blanket
/// impl below.
pub trait DynEmbedder: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn dimensions(&self) -> usize;
}

impl<T: Embedder> DynEmbedder for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        Embedder::dimensions(self)
    }
}

/// Embed every document in `batch_size` chunks.
///
/// The text embedded per document is its title, a blank line, then its
/// content. Every returned vector is checked against the embedder's declared
/// dimension.
pub async fn embed_documents(
    embedder: &dyn DynEmbedder,
    documents: &[CorpusDocument],
    batch_size: usize,
) -> Result<Vec<IndexedVector>> {
    let expected = embedder.dimensions();
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(documents.len());

    for (batch_no, batch) in documents.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(CorpusDocument::embedding_text).collect();
        let embedded = embedder.embed_batch_boxed(&texts).await?;
        if embedded.len() != batch.len() {
            return Err(LoreError::Embedding(format!(
                "batch {} returned {} vectors for {} texts",
                batch_no,
                embedded.len(),
                batch.len()
            )));
        }
        for (doc, vector) in batch.iter().zip(embedded) {
            if vector.len() != expected {
                return Err(LoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            vectors.push(IndexedVector::new(doc.doc_id.clone(), vector));
        }
        debug!(batch = batch_no, size = batch.len(), "Embedded batch");
    }

    Ok(vectors)
}

/// Scale a vector to unit length in place. Zero vectors are left as is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// HashingEmbedder - feature-hashed bag of words
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each lowercased alphanumeric token (hyphens kept, so ids like
/// `def-functor-001` stay whole) is hashed with BLAKE3 into one bucket with a
/// sign bit. The result is L2-normalised. Texts sharing vocabulary land near
/// each other, which is enough for retrieval without a neural model, and the
/// hash is stable across builds so persisted vectors stay comparable with
/// fresh query vectors.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(LoreError::InvalidArgument(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .map(|t| t.trim_matches('-'))
            .filter(|t| !t.is_empty());

        for token in tokens {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimensions;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedder that returns deterministic pseudo-random unit vectors.
///
/// The output is derived from a hash of the whole input text, so identical
/// inputs always produce identical outputs but similar texts are unrelated.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        l2_normalize(&mut result);
        result
    }
}

impl Embedder for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(LoreError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::types::DocType;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 384);
        assert_eq!(MockEmbedding::with_dimensions(8).embed("x").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_unit_length() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let v = embedder.embed("Functor composition law").await.unwrap();
        let norm = dot(&v, &v).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let query = embedder.embed("functor composition").await.unwrap();
        let near = embedder.embed("Functor composition preserves identity").await.unwrap();
        let far = embedder.embed("monoid associativity of append").await.unwrap();
        assert!(dot(&query, &near) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let v = embedder.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_embedder_rejects_zero_dimensions() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = MockEmbedding::with_dimensions(16);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("a").await.unwrap());
        assert_eq!(batch[1], embedder.embed("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_embed_documents_in_batches() {
        let embedder = MockEmbedding::with_dimensions(16);
        let docs: Vec<_> = (0..5)
            .map(|i| {
                CorpusDocument::new(
                    format!("def-d-{i:03}"),
                    format!("Doc {i}"),
                    vec![],
                    DocType::Definition,
                    "body",
                    "d.md",
                )
            })
            .collect();

        let vectors = embed_documents(&embedder, &docs, 2).await.unwrap();
        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[3].doc_id, "def-d-003");
        assert_eq!(
            vectors[3].vector,
            embedder.embed(&docs[3].embedding_text()).await.unwrap()
        );
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_embed_documents_checks_dimension() {
        let docs = vec![CorpusDocument::new(
            "def-a-001",
            "A",
            vec![],
            DocType::Definition,
            "x",
            "a.md",
        )];
        let err = embed_documents(&ShortEmbedder, &docs, 8).await.unwrap_err();
        assert!(matches!(
            err,
            LoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }
}
