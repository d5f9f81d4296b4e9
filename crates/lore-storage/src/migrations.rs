//! Database schema migrations.
//!
//! Applies the artifact schema: documents, vectors, node embeddings,
//! lexical statistics, graph nodes and edges, and the build manifest.

use rusqlite::Connection;
use tracing::info;

use lore_core::error::{LoreError, Result};

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| LoreError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| LoreError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: artifact_schema");
    }

    Ok(())
}

/// Version 1: artifact schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Document metadata. `position` keeps corpus order.
        CREATE TABLE IF NOT EXISTS documents (
            doc_id          TEXT PRIMARY KEY NOT NULL,
            position        INTEGER NOT NULL,
            title           TEXT NOT NULL,
            tags            TEXT NOT NULL DEFAULT '[]',
            doc_type        TEXT NOT NULL
                            CHECK (doc_type IN ('definition', 'law', 'pattern', 'violation',
                                                'fix', 'example', 'test_template')),
            content         TEXT NOT NULL DEFAULT '',
            source_file     TEXT NOT NULL,
            content_hash    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_position
            ON documents (position);

        -- Raw embeddings, little-endian f32 blobs.
        CREATE TABLE IF NOT EXISTS vectors (
            doc_id          TEXT PRIMARY KEY NOT NULL,
            dimension       INTEGER NOT NULL,
            vector          BLOB NOT NULL,
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        );

        -- Graph-refined embeddings, present only when a refiner ran.
        CREATE TABLE IF NOT EXISTS node_embeddings (
            doc_id          TEXT PRIMARY KEY NOT NULL,
            dimension       INTEGER NOT NULL,
            vector          BLOB NOT NULL,
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS lexical_docs (
            doc_id          TEXT PRIMARY KEY NOT NULL,
            position        INTEGER NOT NULL,
            length          INTEGER NOT NULL,
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS lexical_postings (
            doc_id          TEXT NOT NULL,
            term            TEXT NOT NULL,
            tf              INTEGER NOT NULL CHECK (tf > 0),
            PRIMARY KEY (doc_id, term),
            FOREIGN KEY (doc_id) REFERENCES lexical_docs(doc_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_lexical_postings_term
            ON lexical_postings (term);

        CREATE TABLE IF NOT EXISTS graph_nodes (
            doc_id          TEXT PRIMARY KEY NOT NULL,
            position        INTEGER NOT NULL,
            node_type       TEXT NOT NULL,
            tags            TEXT NOT NULL DEFAULT '[]'
        );

        -- Edge multiset. Endpoints are not foreign keys: dangling edges are kept.
        CREATE TABLE IF NOT EXISTS graph_edges (
            seq             INTEGER PRIMARY KEY NOT NULL,
            source          TEXT NOT NULL,
            target          TEXT NOT NULL,
            edge_type       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_source
            ON graph_edges (source);

        CREATE INDEX IF NOT EXISTS idx_graph_edges_target
            ON graph_edges (target);

        -- At most one row: the current build.
        CREATE TABLE IF NOT EXISTS build_manifest (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            build_id        TEXT NOT NULL,
            built_at        TEXT NOT NULL,
            index_variant   TEXT NOT NULL,
            dimension       INTEGER NOT NULL,
            document_count  INTEGER NOT NULL,
            embedder        TEXT NOT NULL,
            refiner         TEXT,
            index_refined   INTEGER NOT NULL DEFAULT 0,
            index_params    TEXT NOT NULL DEFAULT '{}',
            lexical_params  TEXT NOT NULL DEFAULT '{}',
            warnings        TEXT NOT NULL DEFAULT '[]'
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'artifact_schema');
        ",
    )
    .map_err(|e| LoreError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
