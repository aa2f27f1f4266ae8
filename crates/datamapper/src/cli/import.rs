use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;
use datamapper_core::{
    adapter_for, AmbiguityPolicy, ImportReport, JsonAdapter, Mapper, MemoryStore, NameResolver,
    Schema, SchemaRegistry, SkippedTag, Source, SourceFormat, SqliteStore, TreeAdapter,
};

use crate::config::Config;

pub struct ImportOptions {
    pub format: Option<SourceFormat>,
    /// Tag given to the top-level JSON value.
    pub root_tag: Option<String>,
    pub first_match: bool,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn run(config: &Config, file: &Path, options: &ImportOptions) -> Result<()> {
    if !file.is_file() {
        bail!("file not found: {}", file.display());
    }

    let schema = config.load_schema()?;
    let source = Source::path(file);
    let format = options
        .format
        .or_else(|| source.format_hint())
        .unwrap_or(SourceFormat::Xml);
    let policy = if options.first_match {
        AmbiguityPolicy::FirstMatch
    } else {
        AmbiguityPolicy::Reject
    };

    let mut mapper = Mapper::new(schema.clone())
        .with_adapter(adapter(format, options.root_tag.as_deref()))
        .with_policy(policy);
    let source = Some(source);

    let report = if options.dry_run {
        let store = MemoryStore::new(schema.clone());
        mapper
            .import_data(&store, source)
            .await
            .with_context(|| format!("failed to map {}", file.display()))?
    } else {
        let store = SqliteStore::open(config.db_url()?, &schema)
            .await
            .with_context(|| format!("failed to open {}", config.db_path.display()))?;
        let report = mapper
            .import_data(&store, source)
            .await
            .with_context(|| format!("failed to import {}", file.display()))?;
        store.record_import(&report.to_import_log()).await?;
        report
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, options.dry_run);
        print_skipped(&schema, &report.skipped);
    }

    Ok(())
}

fn adapter(format: SourceFormat, root_tag: Option<&str>) -> Box<dyn TreeAdapter> {
    match (format, root_tag) {
        (SourceFormat::Json, Some(tag)) => Box::new(JsonAdapter::new().with_root_tag(tag)),
        _ => adapter_for(format),
    }
}

fn print_report(report: &ImportReport, dry_run: bool) {
    let verb = if dry_run { "Mapped" } else { "Imported" };
    eprintln!(
        "{} {}: {} entities ({} new, {} existing)",
        style(verb).green(),
        report.source,
        report.entities,
        report.created,
        report.matched
    );
}

fn print_skipped(schema: &Schema, skipped: &[SkippedTag]) {
    if skipped.is_empty() {
        return;
    }

    let resolver = NameResolver::new(schema);
    eprintln!("  Unmapped tags:");
    for tag in skipped {
        let suggestion = match tag.scope.as_deref().and_then(|s| schema.entity(s)) {
            Some(entity) => resolver.suggest_field(&tag.tag, entity),
            None => resolver.suggest_entity(&tag.tag),
        };
        let scope = tag.scope.as_deref().unwrap_or("-");
        match suggestion {
            Some(name) => eprintln!(
                "    {} in {} {}",
                tag.tag,
                scope,
                style(format!("(did you mean {name}?)")).dim()
            ),
            None => eprintln!("    {} in {}", tag.tag, scope),
        }
    }
}
