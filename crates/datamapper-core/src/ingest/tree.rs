use std::fs::File;
use std::io::{BufRead, BufReader};

use thiserror::Error;

use crate::source::{Source, SourceFormat};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document has no root element")]
    NoRoot,
    #[error("Document has more than one root element")]
    MultipleRoots,
    #[error("Element <{0}> is never closed")]
    Unclosed(String),
    #[error("Document nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Deepest nesting an adapter accepts.
///
/// Extraction walks the tree recursively, so this bounds its stack use.
pub const MAX_DEPTH: usize = 256;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// Never empty.
    Children(Vec<TaggedNode>),
    Text(Option<String>),
}

/// Format-independent document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedNode {
    tag: String,
    content: NodeContent,
}

impl TaggedNode {
    pub fn leaf(tag: impl Into<String>, text: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            content: NodeContent::Text(text),
        }
    }

    pub fn text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::leaf(tag, Some(text.into()))
    }

    /// A node with `children`; without any it degrades to a value-less leaf.
    pub fn branch(tag: impl Into<String>, children: Vec<Self>) -> Self {
        let content = if children.is_empty() {
            NodeContent::Text(None)
        } else {
            NodeContent::Children(children)
        };

        Self {
            tag: tag.into(),
            content,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub const fn content(&self) -> &NodeContent {
        &self.content
    }

    pub fn children(&self) -> &[Self] {
        match &self.content {
            NodeContent::Children(children) => children,
            NodeContent::Text(_) => &[],
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Text(text) => text.as_deref(),
            NodeContent::Children(_) => None,
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Self::node_count).sum::<usize>()
    }
}

/// Turns a raw document into a [`TaggedNode`] tree.
pub trait TreeAdapter: Send + Sync {
    fn format(&self) -> SourceFormat;

    fn parse_reader(&self, reader: &mut dyn BufRead) -> ParseResult<TaggedNode>;

    fn parse_str(&self, text: &str) -> ParseResult<TaggedNode> {
        self.parse_reader(&mut text.as_bytes())
    }

    fn parse(&self, source: Source) -> ParseResult<TaggedNode> {
        tracing::debug!("Parsing {} as {}", source.label(), self.format());
        match source {
            Source::Text(text) => self.parse_str(&text),
            Source::Reader(reader) => self.parse_reader(&mut BufReader::new(reader)),
            Source::Path(path) => {
                let file = File::open(&path)?;
                self.parse_reader(&mut BufReader::new(file))
            }
        }
    }
}
