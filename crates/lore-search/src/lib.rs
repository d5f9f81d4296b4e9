//! Lore search crate - score fusion, hybrid retrieval, index builds and
//! query sessions.
//!
//! `IndexBuilder` turns a corpus into artifacts, `KnowledgeBase` loads them
//! back for querying, and `QuerySession` keeps per-user query defaults.

pub mod fusion;
pub mod knowledge_base;
pub mod outcome;
pub mod pipeline;
pub mod retriever;
pub mod session;

pub use fusion::{fuse, normalize, FusedScore};
pub use knowledge_base::{IndexStats, KnowledgeBase};
pub use outcome::QueryOutcome;
pub use pipeline::{BuildOptions, BuildOutput, BuildReport, IndexBuilder};
pub use retriever::{DocumentTable, HybridRetriever};
pub use session::{CommandOutcome, QuerySession, SessionCommand};
