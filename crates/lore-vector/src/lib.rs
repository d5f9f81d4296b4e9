//! Lore vector crate - embedder contract, vector indexes, and graph refinement.
//!
//! Provides the `Embedder` trait with a hashing implementation and a mock
//! for testing, three interchangeable k-nearest-neighbour indexes behind one
//! `VectorIndex` trait, and the optional `NodeEmbeddingRefiner`.

pub mod embedding;
pub mod index;
pub mod refine;

pub use embedding::{embed_documents, DynEmbedder, Embedder, HashingEmbedder, MockEmbedding};
pub use index::{build_index, ClusteredIndex, ExactIndex, GraphIndex, IndexParams, Neighbor, VectorIndex};
pub use refine::{NeighborMeanRefiner, NodeEmbeddingRefiner};
