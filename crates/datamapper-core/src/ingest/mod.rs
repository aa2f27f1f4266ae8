mod extractor;
mod json;
mod persister;
mod pipeline;
mod tree;
mod xml;

pub use extractor::{extract, ExtractionOutput, Extractor, SkippedTag};
pub use json::JsonAdapter;
pub use persister::{PersistError, PersistResult, Persister, SaveReport};
pub use pipeline::{ImportReport, Mapper};
pub use tree::{NodeContent, ParseError, ParseResult, TaggedNode, TreeAdapter};
pub use xml::XmlAdapter;

use crate::source::SourceFormat;

/// The adapter that reads documents of `format`.
pub fn adapter_for(format: SourceFormat) -> Box<dyn TreeAdapter> {
    match format {
        SourceFormat::Xml => Box::new(XmlAdapter::new()),
        SourceFormat::Json => Box::new(JsonAdapter::new()),
    }
}
