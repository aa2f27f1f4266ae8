use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document to import, either already in memory or still to be read.
pub enum Source {
    Text(String),
    Reader(Box<dyn Read + Send>),
    Path(PathBuf),
}

impl Source {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Short human-readable description, used in logs and the import log.
    pub fn label(&self) -> String {
        match self {
            Self::Text(_) => "<text>".to_string(),
            Self::Reader(_) => "<stream>".to_string(),
            Self::Path(path) => path.display().to_string(),
        }
    }

    /// Format implied by a file extension, if any.
    pub fn format_hint(&self) -> Option<SourceFormat> {
        match self {
            Self::Path(path) => SourceFormat::from_path(path),
            Self::Text(_) | Self::Reader(_) => None,
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Xml,
    Json,
}

impl SourceFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "xml" | "rss" | "atom" => Some(Self::Xml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unsupported format: {s}"))
    }
}

/// One completed import, as recorded by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLog {
    pub id: Uuid,
    pub source: String,
    pub entity_count: u32,
    pub created_count: u32,
    pub matched_count: u32,
    pub imported_at: DateTime<Utc>,
}

impl ImportLog {
    #[must_use]
    pub fn new(source: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            source,
            entity_count: 0,
            created_count: 0,
            matched_count: 0,
            imported_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn with_counts(mut self, created: u32, matched: u32) -> Self {
        self.created_count = created;
        self.matched_count = matched;
        self.entity_count = created.saturating_add(matched);
        self
    }
}
