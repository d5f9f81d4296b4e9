//! Loading a whole corpus from many files.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, DocType};

use crate::parser::{CorpusParser, ParseIssue};
use crate::related::{scan_related, RelatedAnnotations};

/// One named corpus file held in memory.
#[derive(Clone, Debug)]
pub struct CorpusSource {
    pub name: String,
    pub text: String,
}

impl CorpusSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// A non-fatal problem found while loading a corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorpusWarning {
    /// A later section reused an id. The first occurrence was kept.
    DuplicateDocumentId {
        doc_id: String,
        first_source: String,
        duplicate_source: String,
    },
    UnknownDocType {
        doc_id: String,
        source_file: String,
        value: Option<String>,
        inferred: Option<DocType>,
    },
    EmptyMetadata {
        title: String,
        source_file: String,
        marker: String,
    },
}

impl CorpusWarning {
    fn from_issue(issue: ParseIssue, source_file: &str) -> Self {
        match issue {
            ParseIssue::UnknownDocType {
                doc_id,
                value,
                inferred,
            } => CorpusWarning::UnknownDocType {
                doc_id,
                source_file: source_file.to_string(),
                value,
                inferred,
            },
            ParseIssue::EmptyMetadata { title, marker } => CorpusWarning::EmptyMetadata {
                title,
                source_file: source_file.to_string(),
                marker,
            },
        }
    }
}

impl fmt::Display for CorpusWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusWarning::DuplicateDocumentId {
                doc_id,
                first_source,
                duplicate_source,
            } => {
                let err = LoreError::DuplicateDocumentId {
                    doc_id: doc_id.clone(),
                    first_source: first_source.clone(),
                    duplicate_source: duplicate_source.clone(),
                };
                write!(f, "{}", err)
            }
            CorpusWarning::UnknownDocType {
                doc_id,
                source_file,
                value,
                inferred,
            } => {
                let fallback = inferred.unwrap_or(DocType::Definition);
                match value {
                    Some(v) => write!(
                        f,
                        "{}: unknown type '{}' for {}, using {}",
                        source_file, v, doc_id, fallback
                    ),
                    None => write!(
                        f,
                        "{}: missing type for {}, using {}",
                        source_file, doc_id, fallback
                    ),
                }
            }
            CorpusWarning::EmptyMetadata {
                title,
                source_file,
                marker,
            } => write!(f, "{}: empty {} line in section '{}'", source_file, marker, title),
        }
    }
}

/// Every accepted document of a corpus, with relations and load warnings.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    documents: Vec<CorpusDocument>,
    related: RelatedAnnotations,
    warnings: Vec<CorpusWarning>,
}

impl Corpus {
    /// Parse in-memory sources, in the order given.
    ///
    /// A document id seen again later is reported and the later section is
    /// dropped, together with its `Related` lines. Fails with `CorpusEmpty`
    /// when no source yields a document.
    pub fn from_sources(sources: &[CorpusSource]) -> Result<Self> {
        let mut documents = Vec::new();
        let mut related = RelatedAnnotations::new();
        let mut warnings = Vec::new();
        let mut first_source: HashMap<String, String> = HashMap::new();

        for source in sources {
            let mut accepted_sections = HashSet::new();

            for section in CorpusParser::sections(&source.text, &source.name) {
                warnings.extend(
                    section
                        .issues
                        .into_iter()
                        .map(|issue| CorpusWarning::from_issue(issue, &source.name)),
                );
                let Some(document) = section.document else {
                    continue;
                };

                if let Some(first) = first_source.get(&document.doc_id) {
                    warn!(
                        doc_id = %document.doc_id,
                        first_source = %first,
                        duplicate_source = %source.name,
                        "Duplicate document id, keeping first occurrence"
                    );
                    warnings.push(CorpusWarning::DuplicateDocumentId {
                        doc_id: document.doc_id.clone(),
                        first_source: first.clone(),
                        duplicate_source: source.name.clone(),
                    });
                    continue;
                }

                first_source.insert(document.doc_id.clone(), source.name.clone());
                accepted_sections.insert(section.index);
                documents.push(document);
            }

            for annotation in scan_related(&source.text) {
                if accepted_sections.contains(&annotation.section_index) {
                    related.insert(annotation.doc_id, annotation.related_ids);
                }
            }
            debug!(source = %source.name, "Parsed corpus source");
        }

        if documents.is_empty() {
            return Err(LoreError::CorpusEmpty);
        }

        info!(
            documents = documents.len(),
            sources = sources.len(),
            warnings = warnings.len(),
            "Corpus loaded"
        );

        Ok(Self {
            documents,
            related,
            warnings,
        })
    }

    /// Load every file with the given extension directly inside `dir`.
    ///
    /// Files are read in sorted name order so the first occurrence of a
    /// duplicate id is stable across runs.
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));
            if path.is_file() && matches {
                paths.push(path);
            }
        }
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let text = std::fs::read_to_string(path)?;
            sources.push(CorpusSource { name, text });
        }

        info!(dir = %dir.display(), files = sources.len(), "Reading corpus directory");
        Self::from_sources(&sources)
    }

    pub fn documents(&self) -> &[CorpusDocument] {
        &self.documents
    }

    pub fn related(&self) -> &RelatedAnnotations {
        &self.related
    }

    pub fn warnings(&self) -> &[CorpusWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn into_parts(self) -> (Vec<CorpusDocument>, RelatedAnnotations, Vec<CorpusWarning>) {
        (self.documents, self.related, self.warnings)
    }
}
