//! SQLite-backed artifact repository.
//!
//! A save replaces every artifact of the previous build in one transaction.
//! Readers therefore see either the old build or the new one, never a mix.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use lore_core::error::{LoreError, Result};
use lore_core::types::{CorpusDocument, DocType, EdgeType, IndexVariant, IndexedVector};
use lore_graph::{GraphEdge, GraphNode};
use lore_lexical::LexicalDocument;

use crate::artifacts::{decode_vector, encode_vector, Artifacts, BuildManifest};
use crate::db::Database;

fn sql_err(context: &'static str) -> impl Fn(rusqlite::Error) -> LoreError {
    move |e| LoreError::Storage(format!("{}: {}", context, e))
}

fn parse_field<T: std::str::FromStr>(value: &str, column: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| LoreError::Storage(format!("Invalid {} value in store: {}", column, value)))
}

/// Repository for the artifacts of the current build.
#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    db: Arc<Database>,
}

impl ArtifactRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Open the store at `path`, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(Database::new(path)?)))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Database::in_memory()?)))
    }

    /// Replace all stored artifacts with `artifacts`.
    pub fn save(&self, artifacts: &Artifacts) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sql_err("Failed to begin transaction"))?;

            clear(&tx)?;
            insert_documents(&tx, &artifacts.documents)?;
            insert_vectors(&tx, "vectors", &artifacts.vectors)?;
            insert_vectors(&tx, "node_embeddings", &artifacts.node_embeddings)?;
            insert_lexical(&tx, &artifacts.lexical)?;
            insert_graph(&tx, &artifacts.nodes, &artifacts.edges)?;
            insert_manifest(&tx, &artifacts.manifest)?;

            tx.commit().map_err(sql_err("Failed to commit artifacts"))?;
            Ok(())
        })?;

        info!(
            build_id = %artifacts.manifest.build_id,
            documents = artifacts.documents.len(),
            edges = artifacts.edges.len(),
            "Artifacts saved"
        );
        Ok(())
    }

    /// Manifest of the current build, if any build was saved.
    pub fn manifest(&self) -> Result<Option<BuildManifest>> {
        self.db.with_conn(read_manifest)
    }

    /// Load every artifact of the current build.
    ///
    /// Fails with `IndexNotBuilt` when nothing was saved yet.
    pub fn load(&self) -> Result<Artifacts> {
        let artifacts = self.db.with_conn(|conn| {
            let manifest = read_manifest(conn)?.ok_or_else(|| {
                LoreError::IndexNotBuilt("no build found in the artifact store".to_string())
            })?;
            Ok(Artifacts {
                documents: read_documents(conn)?,
                vectors: read_vectors(conn, "vectors")?,
                node_embeddings: read_vectors(conn, "node_embeddings")?,
                lexical: read_lexical(conn)?,
                nodes: read_nodes(conn)?,
                edges: read_edges(conn)?,
                manifest,
            })
        })?;

        debug!(
            build_id = %artifacts.manifest.build_id,
            documents = artifacts.documents.len(),
            "Artifacts loaded"
        );
        Ok(artifacts)
    }

    /// Look up one document by id.
    pub fn document(&self, doc_id: &str) -> Result<Option<CorpusDocument>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT doc_id, title, tags, doc_type, content, source_file, content_hash
                     FROM documents WHERE doc_id = ?1",
                )
                .map_err(sql_err("Failed to prepare document lookup"))?;
            let row = stmt
                .query_row([doc_id], |row| Ok(row_to_document(row)))
                .optional()
                .map_err(sql_err("Failed to look up document"))?;
            row.transpose()
        })
    }
}

fn clear(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM lexical_postings;
         DELETE FROM lexical_docs;
         DELETE FROM vectors;
         DELETE FROM node_embeddings;
         DELETE FROM documents;
         DELETE FROM graph_edges;
         DELETE FROM graph_nodes;
         DELETE FROM build_manifest;",
    )
    .map_err(sql_err("Failed to clear previous build"))
}

fn insert_documents(conn: &Connection, documents: &[CorpusDocument]) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO documents (doc_id, position, title, tags, doc_type, content, source_file, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(sql_err("Failed to prepare document insert"))?;
    for (position, doc) in documents.iter().enumerate() {
        stmt.execute(rusqlite::params![
            doc.doc_id,
            position as i64,
            doc.title,
            serde_json::to_string(&doc.tags)?,
            doc.doc_type.as_str(),
            doc.content,
            doc.source_file,
            doc.content_hash,
        ])
        .map_err(sql_err("Failed to save document"))?;
    }
    Ok(())
}

fn insert_vectors(conn: &Connection, table: &str, vectors: &[IndexedVector]) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {} (doc_id, dimension, vector) VALUES (?1, ?2, ?3)",
            table
        ))
        .map_err(sql_err("Failed to prepare vector insert"))?;
    for v in vectors {
        stmt.execute(rusqlite::params![v.doc_id, v.dimension() as i64, encode_vector(&v.vector)])
            .map_err(sql_err("Failed to save vector"))?;
    }
    Ok(())
}

fn insert_lexical(conn: &Connection, lexical: &[LexicalDocument]) -> Result<()> {
    let mut doc_stmt = conn
        .prepare("INSERT INTO lexical_docs (doc_id, position, length) VALUES (?1, ?2, ?3)")
        .map_err(sql_err("Failed to prepare lexical insert"))?;
    let mut posting_stmt = conn
        .prepare("INSERT INTO lexical_postings (doc_id, term, tf) VALUES (?1, ?2, ?3)")
        .map_err(sql_err("Failed to prepare posting insert"))?;

    for (position, doc) in lexical.iter().enumerate() {
        doc_stmt
            .execute(rusqlite::params![doc.doc_id, position as i64, doc.length as i64])
            .map_err(sql_err("Failed to save lexical document"))?;
        for (term, tf) in &doc.term_counts {
            posting_stmt
                .execute(rusqlite::params![doc.doc_id, term, tf])
                .map_err(sql_err("Failed to save posting"))?;
        }
    }
    Ok(())
}

fn insert_graph(conn: &Connection, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<()> {
    let mut node_stmt = conn
        .prepare("INSERT INTO graph_nodes (doc_id, position, node_type, tags) VALUES (?1, ?2, ?3, ?4)")
        .map_err(sql_err("Failed to prepare node insert"))?;
    for (position, node) in nodes.iter().enumerate() {
        node_stmt
            .execute(rusqlite::params![
                node.doc_id,
                position as i64,
                node.node_type.as_str(),
                serde_json::to_string(&node.tags)?,
            ])
            .map_err(sql_err("Failed to save graph node"))?;
    }

    let mut edge_stmt = conn
        .prepare("INSERT INTO graph_edges (seq, source, target, edge_type) VALUES (?1, ?2, ?3, ?4)")
        .map_err(sql_err("Failed to prepare edge insert"))?;
    for (seq, edge) in edges.iter().enumerate() {
        edge_stmt
            .execute(rusqlite::params![
                seq as i64,
                edge.source,
                edge.target,
                edge.edge_type.as_str(),
            ])
            .map_err(sql_err("Failed to save graph edge"))?;
    }
    Ok(())
}

fn insert_manifest(conn: &Connection, manifest: &BuildManifest) -> Result<()> {
    conn.execute(
        "INSERT INTO build_manifest
            (id, build_id, built_at, index_variant, dimension, document_count, embedder,
             refiner, index_refined, index_params, lexical_params, warnings)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            manifest.build_id.to_string(),
            manifest.built_at.to_rfc3339(),
            manifest.index_variant.as_str(),
            manifest.dimension as i64,
            manifest.document_count as i64,
            manifest.embedder,
            manifest.refiner,
            manifest.index_refined,
            serde_json::to_string(&manifest.index_params)?,
            serde_json::to_string(&manifest.lexical_params)?,
            serde_json::to_string(&manifest.warnings)?,
        ],
    )
    .map_err(sql_err("Failed to save build manifest"))?;
    Ok(())
}

fn read_manifest(conn: &Connection) -> Result<Option<BuildManifest>> {
    let row = conn
        .query_row(
            "SELECT build_id, built_at, index_variant, dimension, document_count, embedder,
                    refiner, index_refined, index_params, lexical_params, warnings
             FROM build_manifest WHERE id = 1",
            [],
            |row| Ok(row_to_manifest(row)),
        )
        .optional()
        .map_err(sql_err("Failed to read build manifest"))?;
    row.transpose()
}

fn row_to_manifest(row: &Row<'_>) -> Result<BuildManifest> {
    let get_err = |e: rusqlite::Error| LoreError::Storage(format!("Invalid manifest row: {}", e));

    let build_id: String = row.get(0).map_err(get_err)?;
    let built_at: String = row.get(1).map_err(get_err)?;
    let variant: String = row.get(2).map_err(get_err)?;
    let index_params: String = row.get(8).map_err(get_err)?;
    let lexical_params: String = row.get(9).map_err(get_err)?;
    let warnings: String = row.get(10).map_err(get_err)?;

    Ok(BuildManifest {
        build_id: Uuid::parse_str(&build_id)
            .map_err(|e| LoreError::Storage(format!("Invalid build id: {}", e)))?,
        built_at: DateTime::parse_from_rfc3339(&built_at)
            .map_err(|e| LoreError::Storage(format!("Invalid build timestamp: {}", e)))?
            .with_timezone(&Utc),
        index_variant: parse_field::<IndexVariant>(&variant, "index_variant")?,
        dimension: row.get::<_, i64>(3).map_err(get_err)? as usize,
        document_count: row.get::<_, i64>(4).map_err(get_err)? as usize,
        embedder: row.get(5).map_err(get_err)?,
        refiner: row.get(6).map_err(get_err)?,
        index_refined: row.get(7).map_err(get_err)?,
        index_params: serde_json::from_str(&index_params)?,
        lexical_params: serde_json::from_str(&lexical_params)?,
        warnings: serde_json::from_str(&warnings)?,
    })
}

fn row_to_document(row: &Row<'_>) -> Result<CorpusDocument> {
    let get_err = |e: rusqlite::Error| LoreError::Storage(format!("Invalid document row: {}", e));
    let tags: String = row.get(2).map_err(get_err)?;
    let doc_type: String = row.get(3).map_err(get_err)?;

    Ok(CorpusDocument {
        doc_id: row.get(0).map_err(get_err)?,
        title: row.get(1).map_err(get_err)?,
        tags: serde_json::from_str(&tags)?,
        doc_type: parse_field::<DocType>(&doc_type, "doc_type")?,
        content: row.get(4).map_err(get_err)?,
        source_file: row.get(5).map_err(get_err)?,
        content_hash: row.get(6).map_err(get_err)?,
    })
}

fn read_documents(conn: &Connection) -> Result<Vec<CorpusDocument>> {
    let mut stmt = conn
        .prepare(
            "SELECT doc_id, title, tags, doc_type, content, source_file, content_hash
             FROM documents ORDER BY position",
        )
        .map_err(sql_err("Failed to prepare document query"))?;
    let rows = stmt
        .query_map([], |row| Ok(row_to_document(row)))
        .map_err(sql_err("Failed to query documents"))?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(row.map_err(sql_err("Failed to read document"))??);
    }
    Ok(documents)
}

fn read_vectors(conn: &Connection, table: &str) -> Result<Vec<IndexedVector>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT v.doc_id, v.dimension, v.vector FROM {} v
             JOIN documents d ON d.doc_id = v.doc_id
             ORDER BY d.position",
            table
        ))
        .map_err(sql_err("Failed to prepare vector query"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })
        .map_err(sql_err("Failed to query vectors"))?;

    let mut vectors = Vec::new();
    for row in rows {
        let (doc_id, dimension, blob) = row.map_err(sql_err("Failed to read vector"))?;
        let vector = decode_vector(&blob)
            .ok_or_else(|| LoreError::Storage(format!("Corrupt vector blob for {}", doc_id)))?;
        if vector.len() != dimension as usize {
            return Err(LoreError::DimensionMismatch {
                expected: dimension as usize,
                actual: vector.len(),
            });
        }
        vectors.push(IndexedVector::new(doc_id, vector));
    }
    Ok(vectors)
}

fn read_lexical(conn: &Connection) -> Result<Vec<LexicalDocument>> {
    let mut postings: HashMap<String, Vec<(String, u32)>> = HashMap::new();
    {
        let mut stmt = conn
            .prepare("SELECT doc_id, term, tf FROM lexical_postings")
            .map_err(sql_err("Failed to prepare posting query"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })
            .map_err(sql_err("Failed to query postings"))?;
        for row in rows {
            let (doc_id, term, tf) = row.map_err(sql_err("Failed to read posting"))?;
            postings.entry(doc_id).or_default().push((term, tf));
        }
    }

    let mut stmt = conn
        .prepare("SELECT doc_id, length FROM lexical_docs ORDER BY position")
        .map_err(sql_err("Failed to prepare lexical query"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(sql_err("Failed to query lexical documents"))?;

    let mut documents = Vec::new();
    for row in rows {
        let (doc_id, length) = row.map_err(sql_err("Failed to read lexical document"))?;
        let term_counts = postings.remove(&doc_id).unwrap_or_default().into_iter().collect();
        documents.push(LexicalDocument {
            doc_id,
            length: length as usize,
            term_counts,
        });
    }
    Ok(documents)
}

fn read_nodes(conn: &Connection) -> Result<Vec<GraphNode>> {
    let mut stmt = conn
        .prepare("SELECT doc_id, node_type, tags FROM graph_nodes ORDER BY position")
        .map_err(sql_err("Failed to prepare node query"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(sql_err("Failed to query graph nodes"))?;

    let mut nodes = Vec::new();
    for row in rows {
        let (doc_id, node_type, tags) = row.map_err(sql_err("Failed to read graph node"))?;
        nodes.push(GraphNode {
            doc_id,
            node_type: parse_field(&node_type, "node_type")?,
            tags: serde_json::from_str(&tags)?,
        });
    }
    Ok(nodes)
}

fn read_edges(conn: &Connection) -> Result<Vec<GraphEdge>> {
    let mut stmt = conn
        .prepare("SELECT source, target, edge_type FROM graph_edges ORDER BY seq")
        .map_err(sql_err("Failed to prepare edge query"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(sql_err("Failed to query graph edges"))?;

    let mut edges = Vec::new();
    for row in rows {
        let (source, target, edge_type) = row.map_err(sql_err("Failed to read graph edge"))?;
        edges.push(GraphEdge::new(
            source,
            target,
            parse_field::<EdgeType>(&edge_type, "edge_type")?,
        ));
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_corpus::CorpusWarning;

    fn sample_artifacts() -> Artifacts {
        let documents = vec![
            CorpusDocument::new(
                "def-functor-001",
                "Functor",
                vec!["category".into(), "map".into()],
                DocType::Definition,
                "Maps arrows.",
                "defs.md",
            ),
            CorpusDocument::new(
                "pattern-compose-001",
                "Compose",
                vec![],
                DocType::Pattern,
                "Uses def-functor-001.",
                "patterns.md",
            ),
        ];
        let mut manifest = BuildManifest::new(IndexVariant::Graph, 2, "hashing");
        manifest.document_count = 2;
        manifest.refiner = Some("neighbor-mean".into());
        manifest.warnings.push(CorpusWarning::DuplicateDocumentId {
            doc_id: "def-functor-001".into(),
            first_source: "defs.md".into(),
            duplicate_source: "more.md".into(),
        });

        Artifacts {
            manifest,
            vectors: vec![
                IndexedVector::new("def-functor-001", vec![1.0, 0.0]),
                IndexedVector::new("pattern-compose-001", vec![0.0, 1.0]),
            ],
            node_embeddings: vec![
                IndexedVector::new("def-functor-001", vec![0.7, 0.7]),
                IndexedVector::new("pattern-compose-001", vec![0.7, 0.7]),
            ],
            lexical: vec![
                LexicalDocument::from_tokens("def-functor-001", &["functor".into(), "maps".into()]),
                LexicalDocument::from_tokens("pattern-compose-001", &["compose".into()]),
            ],
            nodes: documents.iter().map(GraphNode::from).collect(),
            edges: vec![
                GraphEdge::new("def-functor-001", "pattern-compose-001", EdgeType::Defines),
                GraphEdge::new("pattern-compose-001", "law-missing-001", EdgeType::RelatesTo),
                GraphEdge::new("def-functor-001", "pattern-compose-001", EdgeType::Defines),
            ],
            documents,
        }
    }

    #[test]
    fn test_load_before_build_is_index_not_built() {
        let repo = ArtifactRepository::in_memory().unwrap();
        assert!(repo.manifest().unwrap().is_none());
        assert!(matches!(repo.load(), Err(LoreError::IndexNotBuilt(_))));
    }

    #[test]
    fn test_save_then_load_preserves_everything() {
        let repo = ArtifactRepository::in_memory().unwrap();
        let saved = sample_artifacts();
        repo.save(&saved).unwrap();

        let loaded = repo.load().unwrap();
        assert_eq!(loaded.manifest.build_id, saved.manifest.build_id);
        assert_eq!(loaded.manifest.index_variant, IndexVariant::Graph);
        assert_eq!(loaded.manifest.warnings, saved.manifest.warnings);
        assert_eq!(loaded.manifest.refiner.as_deref(), Some("neighbor-mean"));
        assert_eq!(loaded.documents, saved.documents);
        assert_eq!(loaded.vectors, saved.vectors);
        assert_eq!(loaded.node_embeddings, saved.node_embeddings);
        assert_eq!(loaded.lexical, saved.lexical);
        assert_eq!(loaded.nodes, saved.nodes);
        assert_eq!(loaded.edges, saved.edges);
    }

    #[test]
    fn test_save_replaces_previous_build() {
        let repo = ArtifactRepository::in_memory().unwrap();
        repo.save(&sample_artifacts()).unwrap();

        let mut second = sample_artifacts();
        second.documents.truncate(1);
        second.vectors.truncate(1);
        second.node_embeddings.clear();
        second.lexical.truncate(1);
        second.nodes.truncate(1);
        second.edges.clear();
        repo.save(&second).unwrap();

        let loaded = repo.load().unwrap();
        assert_eq!(loaded.manifest.build_id, second.manifest.build_id);
        assert_eq!(loaded.documents.len(), 1);
        assert!(loaded.node_embeddings.is_empty());
        assert!(loaded.edges.is_empty());
    }

    #[test]
    fn test_failed_save_keeps_previous_build() {
        let repo = ArtifactRepository::in_memory().unwrap();
        let first = sample_artifacts();
        repo.save(&first).unwrap();

        // A vector without a document violates the foreign key.
        let mut broken = sample_artifacts();
        broken.vectors.push(IndexedVector::new("orphan", vec![0.0, 0.0]));
        assert!(repo.save(&broken).is_err());

        let loaded = repo.load().unwrap();
        assert_eq!(loaded.manifest.build_id, first.manifest.build_id);
        assert_eq!(loaded.vectors.len(), 2);
    }

    #[test]
    fn test_document_lookup() {
        let repo = ArtifactRepository::in_memory().unwrap();
        repo.save(&sample_artifacts()).unwrap();
        let doc = repo.document("pattern-compose-001").unwrap().unwrap();
        assert_eq!(doc.title, "Compose");
        assert!(repo.document("nope").unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lore.db");
        let saved = sample_artifacts();
        ArtifactRepository::open(&path).unwrap().save(&saved).unwrap();

        let reopened = ArtifactRepository::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap().documents, saved.documents);
    }

    #[test]
    fn test_index_vectors_selects_refined_when_flagged() {
        let mut artifacts = sample_artifacts();
        assert_eq!(artifacts.index_vectors()[0].vector, vec![1.0, 0.0]);
        artifacts.manifest.index_refined = true;
        assert_eq!(artifacts.index_vectors()[0].vector, vec![0.7, 0.7]);
    }
}
