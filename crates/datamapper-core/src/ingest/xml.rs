use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::tree::{ParseError, ParseResult, TaggedNode, TreeAdapter, MAX_DEPTH};
use crate::source::SourceFormat;

/// Maps every XML element onto one [`TaggedNode`].
///
/// Elements with child elements keep only their children; the text of leaf
/// elements (CDATA included) becomes the node's value. Attributes are not
/// part of the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlAdapter;

impl XmlAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

struct OpenElement {
    tag: String,
    children: Vec<TaggedNode>,
    text: Option<String>,
}

impl OpenElement {
    fn new(start: &BytesStart<'_>) -> Self {
        Self {
            tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            children: Vec::new(),
            text: None,
        }
    }

    fn push_text(&mut self, text: &str) {
        self.text.get_or_insert_with(String::new).push_str(text);
    }

    fn close(self) -> TaggedNode {
        if self.children.is_empty() {
            TaggedNode::leaf(self.tag, self.text)
        } else {
            TaggedNode::branch(self.tag, self.children)
        }
    }
}

fn attach(
    node: TaggedNode,
    stack: &mut [OpenElement],
    root: &mut Option<TaggedNode>,
) -> ParseResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::MultipleRoots);
    }
    *root = Some(node);
    Ok(())
}

impl TreeAdapter for XmlAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Xml
    }

    fn parse_reader(&self, reader: &mut dyn BufRead) -> ParseResult<TaggedNode> {
        let mut reader = Reader::from_reader(reader);
        let mut buf = Vec::new();
        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<TaggedNode> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| ParseError::Xml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })?;

            match event {
                Event::Start(start) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
                    }
                    stack.push(OpenElement::new(&start));
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(ParseError::Xml {
                            position: reader.buffer_position(),
                            message: "unexpected closing tag".into(),
                        });
                    };
                    attach(element.close(), &mut stack, &mut root)?;
                }
                Event::Empty(start) => {
                    attach(OpenElement::new(&start).close(), &mut stack, &mut root)?;
                }
                // text outside the root element is whitespace at most
                Event::Text(text) => {
                    if let Some(element) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| ParseError::Xml {
                            position: reader.buffer_position(),
                            message: e.to_string(),
                        })?;
                        element.push_text(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(element) = stack.last_mut() {
                        element.push_text(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.tag));
        }

        root.ok_or(ParseError::NoRoot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>Channel title</title>
                <description>Channel description</description>
                <link>http://example.com/</link>
                <item>
                    <title><![CDATA[Item title]]></title>
                    <link>http://example.com/item/</link>
                </item>
            </channel>
        </rss>
    "#;

    #[test]
    fn test_parse_rss() {
        let root = XmlAdapter::new().parse_str(RSS).unwrap();

        assert_eq!(root.tag(), "rss");
        assert_eq!(root.children().len(), 1);

        let channel = &root.children()[0];
        assert_eq!(channel.tag(), "channel");
        let tags: Vec<&str> = channel.children().iter().map(TaggedNode::tag).collect();
        assert_eq!(tags, vec!["title", "description", "link", "item"]);
        assert_eq!(channel.children()[0].text_value(), Some("Channel title"));

        let item = &channel.children()[3];
        assert_eq!(item.children()[0].text_value(), Some("Item title"));
        assert_eq!(item.children()[1].text_value(), Some("http://example.com/item/"));
    }

    #[test]
    fn test_branch_text_discarded_and_leaf_text_kept() {
        let root = XmlAdapter::new()
            .parse_str("<a>loose<b> spaced </b><c/><d></d><e>x &amp; y</e></a>")
            .unwrap();

        assert_eq!(root.text_value(), None);
        assert_eq!(root.children()[0].text_value(), Some(" spaced "));
        assert_eq!(root.children()[1].text_value(), None);
        assert_eq!(root.children()[2].text_value(), None);
        assert_eq!(root.children()[3].text_value(), Some("x & y"));
    }

    #[test]
    fn test_parse_reader() {
        let reader = std::io::Cursor::new(RSS.as_bytes().to_vec());
        let root = XmlAdapter::new()
            .parse(crate::source::Source::reader(reader))
            .unwrap();

        assert_eq!(root, XmlAdapter::new().parse_str(RSS).unwrap());
    }

    #[test]
    fn test_malformed_documents() {
        let adapter = XmlAdapter::new();

        assert!(matches!(adapter.parse_str(""), Err(ParseError::NoRoot)));
        assert!(matches!(
            adapter.parse_str("<a/><b/>"),
            Err(ParseError::MultipleRoots)
        ));
        assert!(matches!(
            adapter.parse_str("<a><b></b>"),
            Err(ParseError::Unclosed(_) | ParseError::Xml { .. })
        ));
        assert!(matches!(
            adapter.parse_str("<a></b>"),
            Err(ParseError::Xml { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            format!(
                "{}<title>x</title>{}",
                "<g>".repeat(depth),
                "</g>".repeat(depth)
            )
        };
        let adapter = XmlAdapter::new();

        assert!(adapter.parse_str(&nested(MAX_DEPTH - 1)).is_ok());
        assert!(matches!(
            adapter.parse_str(&nested(MAX_DEPTH + 1)),
            Err(ParseError::TooDeep { limit: MAX_DEPTH })
        ));
        assert!(matches!(
            adapter.parse_str(&nested(5000)),
            Err(ParseError::TooDeep { .. })
        ));
    }
}
