//! BM25 ranking over tokenized documents.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lore_core::config::LexicalConfig;
use lore_core::types::{CorpusDocument, IdfVariant};

use crate::tokenize::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f64,
    /// Length normalisation, 0 disables it.
    pub b: f64,
    pub idf: IdfVariant,
    /// Floor for negative Okapi IDF values, as a fraction of the mean IDF.
    pub okapi_epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            idf: IdfVariant::Okapi,
            okapi_epsilon: 0.25,
        }
    }
}

impl From<&LexicalConfig> for Bm25Params {
    fn from(config: &LexicalConfig) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
            idf: config.idf,
            okapi_epsilon: config.okapi_epsilon,
        }
    }
}

/// Token multiset of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalDocument {
    pub doc_id: String,
    /// Total token count.
    pub length: usize,
    pub term_counts: BTreeMap<String, u32>,
}

impl LexicalDocument {
    pub fn from_tokens(doc_id: impl Into<String>, tokens: &[String]) -> Self {
        let mut term_counts = BTreeMap::new();
        for token in tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        Self {
            doc_id: doc_id.into(),
            length: tokens.len(),
            term_counts,
        }
    }

    pub fn term_frequency(&self, term: &str) -> u32 {
        self.term_counts.get(term).copied().unwrap_or(0)
    }
}

/// Read-only BM25 index. Corpus statistics are fixed at build time.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    documents: Vec<LexicalDocument>,
    doc_freq: HashMap<String, usize>,
    idf: HashMap<String, f64>,
    avg_doc_len: f64,
}

impl Bm25Index {
    /// Tokenize title, tags and content of every document and index them.
    pub fn build(documents: &[CorpusDocument], params: Bm25Params) -> Self {
        let entries = documents
            .iter()
            .map(|doc| LexicalDocument::from_tokens(doc.doc_id.clone(), &tokenize(&doc.lexical_text())))
            .collect();
        Self::from_documents(entries, params)
    }

    /// Index pre-tokenized documents, e.g. term counts loaded from storage.
    pub fn from_documents(documents: Vec<LexicalDocument>, params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        for doc in &documents {
            total_len += doc.length;
            for term in doc.term_counts.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
        }

        let n = documents.len();
        let avg_doc_len = if n == 0 { 0.0 } else { total_len as f64 / n as f64 };
        let idf = compute_idf(&doc_freq, n, &params);

        info!(
            documents = n,
            terms = doc_freq.len(),
            avg_doc_len,
            "BM25 index built"
        );

        Self {
            params,
            documents,
            doc_freq,
            idf,
            avg_doc_len,
        }
    }

    pub fn params(&self) -> &Bm25Params {
        &self.params
    }

    pub fn documents(&self) -> &[LexicalDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    pub fn vocabulary_size(&self) -> usize {
        self.doc_freq.len()
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    /// IDF of `term`, zero for terms absent from the corpus.
    pub fn idf(&self, term: &str) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// BM25 score of every document for the given query tokens.
    ///
    /// Every indexed document appears in the result, scoring zero when it
    /// shares no term with the query. A repeated query token counts once per
    /// occurrence.
    pub fn score(&self, query_tokens: &[String]) -> HashMap<String, f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let mut scores: HashMap<String, f64> = self
            .documents
            .iter()
            .map(|d| (d.doc_id.clone(), 0.0))
            .collect();

        for term in query_tokens {
            let Some(&idf) = self.idf.get(term) else {
                continue;
            };
            for doc in &self.documents {
                let tf = doc.term_frequency(term) as f64;
                if tf == 0.0 {
                    continue;
                }
                let length_ratio = if self.avg_doc_len > 0.0 {
                    doc.length as f64 / self.avg_doc_len
                } else {
                    0.0
                };
                let contribution = idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * length_ratio));
                if let Some(score) = scores.get_mut(&doc.doc_id) {
                    *score += contribution;
                }
            }
        }

        debug!(terms = query_tokens.len(), documents = scores.len(), "BM25 scored");
        scores
    }

    /// Tokenize `query` and score every document.
    pub fn score_text(&self, query: &str) -> HashMap<String, f64> {
        self.score(&tokenize(query))
    }
}

fn compute_idf(doc_freq: &HashMap<String, usize>, n: usize, params: &Bm25Params) -> HashMap<String, f64> {
    let n = n as f64;
    match params.idf {
        IdfVariant::Lucene => doc_freq
            .iter()
            .map(|(term, &df)| {
                let df = df as f64;
                (term.clone(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect(),
        IdfVariant::Okapi => {
            let raw: HashMap<String, f64> = doc_freq
                .iter()
                .map(|(term, &df)| {
                    let df = df as f64;
                    (term.clone(), (n - df + 0.5).ln() - (df + 0.5).ln())
                })
                .collect();
            if raw.is_empty() {
                return raw;
            }
            let mean = raw.values().sum::<f64>() / raw.len() as f64;
            let floor = (params.okapi_epsilon * mean).max(0.0);
            raw.into_iter()
                .map(|(term, idf)| (term, if idf < 0.0 { floor } else { idf }))
                .collect()
        }
    }
}
