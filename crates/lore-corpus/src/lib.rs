//! Lore corpus crate - turns markdown knowledge files into documents.

pub mod corpus;
pub mod parser;
pub mod related;

pub use corpus::{Corpus, CorpusSource, CorpusWarning};
pub use parser::{CorpusParser, ParseIssue, ParsedSection};
pub use related::{scan_related, RelatedAnnotation, RelatedAnnotations};
