//! SQLite persistence for build artifacts.

pub mod artifacts;
pub mod db;
pub mod migrations;
pub mod repository;

pub use artifacts::{Artifacts, BuildManifest};
pub use db::Database;
pub use repository::ArtifactRepository;
