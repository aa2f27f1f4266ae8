#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod entity;
pub mod error;
pub mod ingest;
pub mod resolve;
pub mod schema;
pub mod source;
pub mod storage;
pub mod store;

pub use entity::{EntityIndex, ExtractedEntity, RecordId, Reference};
pub use error::{Error, Result};
pub use ingest::{
    adapter_for, ExtractionOutput, Extractor, ImportReport, JsonAdapter, Mapper, ParseError,
    PersistError, Persister, SaveReport, SkippedTag, TaggedNode, TreeAdapter, XmlAdapter,
};
pub use resolve::{
    find_ambiguities, normalize, AmbiguityPolicy, AmbiguousNameError, NameKind, NameResolver,
};
pub use schema::{FieldKind, Schema, SchemaEntity, SchemaError, SchemaField, SchemaRegistry};
pub use source::{ImportLog, Source, SourceFormat};
pub use storage::SqliteStore;
pub use store::{Commit, MemoryStore, Store, StoreError, StoredRecord};
