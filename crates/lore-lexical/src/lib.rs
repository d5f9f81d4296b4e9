//! Lore lexical crate - BM25 keyword ranking.

pub mod bm25;
pub mod tokenize;

pub use bm25::{Bm25Index, Bm25Params, LexicalDocument};
pub use tokenize::tokenize;
