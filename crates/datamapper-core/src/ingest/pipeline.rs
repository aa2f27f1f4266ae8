use std::time::Instant;

use serde::Serialize;

use super::extractor::{ExtractionOutput, Extractor, SkippedTag};
use super::persister::{Persister, SaveReport};
use super::tree::{TaggedNode, TreeAdapter};
use super::xml::XmlAdapter;
use crate::entity::ExtractedEntity;
use crate::error::{Error, Result};
use crate::resolve::AmbiguityPolicy;
use crate::schema::SchemaRegistry;
use crate::source::{ImportLog, Source};
use crate::store::Store;

/// Outcome of one [`Mapper::import_data`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub source: String,
    pub entities: usize,
    pub created: usize,
    pub matched: usize,
    pub skipped: Vec<SkippedTag>,
    pub duration_ms: u64,
}

impl ImportReport {
    /// Audit entry for this import.
    pub fn to_import_log(&self) -> ImportLog {
        ImportLog::new(self.source.clone()).with_counts(
            u32::try_from(self.created).unwrap_or(u32::MAX),
            u32::try_from(self.matched).unwrap_or(u32::MAX),
        )
    }
}

/// Parses a source, maps it onto a schema and saves the result.
///
/// The source can be handed over up front with [`Mapper::with_source`] or
/// passed to [`Mapper::import_data`]; both give the same result.
pub struct Mapper {
    schema: Box<dyn SchemaRegistry>,
    adapter: Box<dyn TreeAdapter>,
    policy: AmbiguityPolicy,
    source: Option<Source>,
    label: String,
    tree: Option<TaggedNode>,
    extraction: Option<ExtractionOutput>,
}

impl Mapper {
    #[must_use]
    pub fn new(schema: impl SchemaRegistry + 'static) -> Self {
        Self {
            schema: Box::new(schema),
            adapter: Box::new(XmlAdapter::new()),
            policy: AmbiguityPolicy::default(),
            source: None,
            label: String::new(),
            tree: None,
            extraction: None,
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: Box<dyn TreeAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parses `source`, or the pending construction-time source.
    ///
    /// A freshly parsed tree drops any cached extraction. Without a source
    /// to parse, an already parsed tree is kept.
    pub fn prepare_source(&mut self, source: Option<Source>) -> Result<&TaggedNode> {
        if let Some(source) = source.or_else(|| self.source.take()) {
            self.label = source.label();
            let tree = self.adapter.parse(source)?;
            tracing::debug!("Parsed {} into {} nodes", self.label, tree.node_count());
            self.extraction = None;
            self.tree = Some(tree);
        }

        self.tree.as_ref().ok_or(Error::NoSource)
    }

    /// Maps the parsed tree onto the schema.
    ///
    /// The result is cached until a new source is parsed, so repeated calls
    /// return the same entities.
    pub fn extract(&mut self) -> Result<&[ExtractedEntity]> {
        self.ensure_extracted()?;
        Ok(self.entities())
    }

    pub fn entities(&self) -> &[ExtractedEntity] {
        self.extraction
            .as_ref()
            .map_or(&[], |output| output.entities.as_slice())
    }

    /// Tags from the last extraction that mapped onto nothing.
    pub fn skipped(&self) -> impl Iterator<Item = &SkippedTag> {
        self.extraction
            .iter()
            .flat_map(|output| output.skipped.iter())
    }

    fn ensure_extracted(&mut self) -> Result<()> {
        if self.extraction.is_some() {
            return Ok(());
        }

        self.prepare_source(None)?;
        let Some(tree) = self.tree.as_ref() else {
            return Err(Error::NoSource);
        };
        let output = Extractor::new(self.schema.as_ref())
            .with_policy(self.policy)
            .extract(tree)?;

        if !output.skipped.is_empty() {
            tracing::warn!(
                "{} tags in {} did not map onto the schema",
                output.skipped.len(),
                self.label
            );
        }

        self.extraction = Some(output);
        Ok(())
    }

    /// Saves the extracted entities, extracting first when needed.
    pub async fn save<S: Store + ?Sized>(&mut self, store: &S) -> Result<SaveReport> {
        self.ensure_extracted()?;

        let Some(extraction) = self.extraction.as_mut() else {
            return Err(Error::NoSource);
        };
        let report = Persister::new(self.schema.as_ref(), store)
            .save(&mut extraction.entities)
            .await?;

        Ok(report)
    }

    /// Parse, extract and save in one step.
    pub async fn import_data<S: Store + ?Sized>(
        &mut self,
        store: &S,
        source: Option<Source>,
    ) -> Result<ImportReport> {
        let start = Instant::now();

        self.prepare_source(source)?;
        let saved = self.save(store).await?;

        let report = ImportReport {
            source: self.label.clone(),
            entities: saved.total(),
            created: saved.created,
            matched: saved.matched,
            skipped: self.skipped().cloned().collect(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        tracing::info!(
            "Imported {}: {} entities ({} new, {} existing)",
            report.source,
            report.entities,
            report.created,
            report.matched
        );
        Ok(report)
    }
}
