use std::io::BufRead;

use serde_json::Value;

use super::tree::{ParseError, ParseResult, TaggedNode, TreeAdapter, MAX_DEPTH};
use crate::source::SourceFormat;

const DEFAULT_ROOT_TAG: &str = "root";

/// Maps a JSON document onto a [`TaggedNode`] tree.
///
/// Object members become nodes tagged with the member name, array elements
/// become repeated siblings sharing the member name, and scalars become
/// text leaves.
#[derive(Debug, Clone)]
pub struct JsonAdapter {
    root_tag: String,
}

impl JsonAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root_tag: DEFAULT_ROOT_TAG.to_string(),
        }
    }

    #[must_use]
    pub fn with_root_tag(mut self, tag: impl Into<String>) -> Self {
        self.root_tag = tag.into();
        self
    }

    /// Converts a parsed value into a tree rooted at the configured tag.
    ///
    /// A top-level array always becomes a root node with one child per
    /// element.
    pub fn convert(&self, value: &Value) -> ParseResult<TaggedNode> {
        let mut nodes = convert_value(&self.root_tag, value, 0)?;
        if value.is_array() || nodes.len() != 1 {
            Ok(TaggedNode::branch(self.root_tag.clone(), nodes))
        } else {
            Ok(nodes.remove(0))
        }
    }
}

impl Default for JsonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_value(tag: &str, value: &Value, depth: usize) -> ParseResult<Vec<TaggedNode>> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
    }

    let nodes = match value {
        Value::Object(members) => {
            let mut children = Vec::with_capacity(members.len());
            for (name, member) in members {
                children.extend(convert_value(name, member, depth + 1)?);
            }
            vec![TaggedNode::branch(tag, children)]
        }
        Value::Array(items) => {
            let mut siblings = Vec::with_capacity(items.len());
            for item in items {
                siblings.extend(convert_value(tag, item, depth + 1)?);
            }
            siblings
        }
        Value::String(s) => vec![TaggedNode::text(tag, s.clone())],
        Value::Number(n) => vec![TaggedNode::text(tag, n.to_string())],
        Value::Bool(b) => vec![TaggedNode::text(tag, b.to_string())],
        Value::Null => vec![TaggedNode::leaf(tag, None)],
    };
    Ok(nodes)
}

impl TreeAdapter for JsonAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }

    fn parse_reader(&self, reader: &mut dyn BufRead) -> ParseResult<TaggedNode> {
        let value: Value = serde_json::from_reader(reader)?;
        self.convert(&value)
    }
}
