use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datamapper_core::Schema;
use serde::{Deserialize, Serialize};

const DEFAULT_DB: &str = "datamapper.db";

/// Where imports are stored and which schema they map onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    /// Schema definition file; the built-in RSS schema when unset.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB),
            schema_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var_os("DATAMAPPER_DB")
                .map_or_else(|| PathBuf::from(DEFAULT_DB), PathBuf::from),
            schema_path: std::env::var_os("DATAMAPPER_SCHEMA").map(PathBuf::from),
        }
    }

    /// Applies command-line flags on top of the environment.
    #[must_use]
    pub fn with_overrides(mut self, db: Option<&Path>, schema: Option<&Path>) -> Self {
        if let Some(db) = db {
            self.db_path = db.to_path_buf();
        }
        if let Some(schema) = schema {
            self.schema_path = Some(schema.to_path_buf());
        }
        self
    }

    pub fn db_url(&self) -> Result<&str> {
        self.db_path
            .to_str()
            .with_context(|| format!("database path is not UTF-8: {}", self.db_path.display()))
    }

    pub fn load_schema(&self) -> Result<Schema> {
        match &self.schema_path {
            Some(path) => Schema::load(path)
                .with_context(|| format!("failed to load schema {}", path.display())),
            None => Ok(Schema::rss()),
        }
    }
}
