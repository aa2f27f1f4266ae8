use anyhow::{bail, Context, Result};
use console::style;
use datamapper_core::{find_ambiguities, normalize, FieldKind, Schema};

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let schema = match &config.schema_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<Schema>(&json)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => Schema::rss(),
    };

    print_schema(&schema);

    let ambiguities = find_ambiguities(&schema);
    for ambiguity in &ambiguities {
        eprintln!("{} {ambiguity}", style("!").yellow());
    }

    if let Err(e) = schema.validate() {
        bail!("schema is invalid: {e}");
    }

    Ok(())
}

fn print_schema(schema: &Schema) {
    for entity in &schema.entities {
        println!("{} ({})", style(&entity.name).bold(), normalize(&entity.name));
        for field in &entity.fields {
            let kind = match &field.kind {
                FieldKind::Scalar => "scalar".to_string(),
                FieldKind::Reference { target } => format!("-> {target}"),
            };
            let unique = if field.unique { " unique" } else { "" };
            println!(
                "  {:<20} {:<20} {kind}{unique}",
                field.name,
                normalize(&field.name)
            );
        }
    }
}
