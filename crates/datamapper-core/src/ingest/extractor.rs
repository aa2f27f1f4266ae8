use std::collections::BTreeSet;

use serde::Serialize;

use super::tree::{NodeContent, TaggedNode};
use crate::entity::{EntityIndex, ExtractedEntity, Reference};
use crate::resolve::{AmbiguityPolicy, NameResolver, ResolveResult};
use crate::schema::{SchemaEntity, SchemaRegistry};

/// A tag that was present in the tree but mapped onto nothing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SkippedTag {
    pub tag: String,
    /// Entity type in scope when the tag was met.
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutput {
    /// In creation order: every entity comes after the entity it nests in.
    pub entities: Vec<ExtractedEntity>,
    pub skipped: BTreeSet<SkippedTag>,
}

impl ExtractionOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Walks a tagged tree depth first and builds the entity graph.
pub struct Extractor<'a> {
    resolver: NameResolver<'a>,
}

struct Walk<'a> {
    output: ExtractionOutput,
    types: Vec<&'a SchemaEntity>,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub fn new(registry: &'a dyn SchemaRegistry) -> Self {
        Self {
            resolver: NameResolver::new(registry),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.resolver = self.resolver.with_policy(policy);
        self
    }

    pub fn extract(&self, tree: &TaggedNode) -> ResolveResult<ExtractionOutput> {
        let mut walk = Walk {
            output: ExtractionOutput::new(),
            types: Vec::new(),
        };

        self.visit(tree, None, &mut walk)?;

        tracing::debug!(
            "Extracted {} entities ({} tags skipped)",
            walk.output.entities.len(),
            walk.output.skipped.len()
        );
        Ok(walk.output)
    }

    fn visit(
        &self,
        node: &TaggedNode,
        parent: Option<EntityIndex>,
        walk: &mut Walk<'a>,
    ) -> ResolveResult<()> {
        match node.content() {
            NodeContent::Text(Some(text)) => {
                if let Some(parent) = parent {
                    self.assign_scalar(node.tag(), text, parent, walk)?;
                }
            }
            NodeContent::Text(None) => {}
            NodeContent::Children(children) => {
                let created = match self.resolver.resolve_entity(node.tag())? {
                    Some(def) => {
                        let index = EntityIndex(walk.output.entities.len());
                        walk.output.entities.push(ExtractedEntity::new(def.name.clone()));
                        walk.types.push(def);
                        Some(index)
                    }
                    None => {
                        walk.skip(node.tag(), parent);
                        None
                    }
                };

                let scope = created.or(parent);
                for child in children {
                    self.visit(child, scope, walk)?;
                }

                if let (Some(child), Some(parent)) = (created, parent) {
                    self.link_to_parent(child, parent, walk)?;
                }
            }
        }

        Ok(())
    }

    fn assign_scalar(
        &self,
        tag: &str,
        text: &str,
        parent: EntityIndex,
        walk: &mut Walk<'a>,
    ) -> ResolveResult<()> {
        let def = walk.types[parent.0];
        match self.resolver.resolve_field(tag, def)? {
            Some(field) if field.is_scalar() => {
                tracing::debug!("Setting {}.{} to {:?}", def.name, field.name, text);
                walk.output.entities[parent.0].set_value(field.name.clone(), text);
            }
            Some(field) => {
                tracing::debug!(
                    "Ignoring text for reference field {}.{}",
                    def.name,
                    field.name
                );
            }
            None => walk.skip(tag, Some(parent)),
        }
        Ok(())
    }

    fn link_to_parent(
        &self,
        child: EntityIndex,
        parent: EntityIndex,
        walk: &mut Walk<'a>,
    ) -> ResolveResult<()> {
        let child_def = walk.types[child.0];
        let parent_def = walk.types[parent.0];

        match self.resolver.resolve_field(&parent_def.name, child_def)? {
            Some(field) if field.target() == Some(parent_def.name.as_str()) => {
                tracing::debug!(
                    "Linking {}.{} to its parent {}",
                    child_def.name,
                    field.name,
                    parent_def.name
                );
                walk.output.entities[child.0]
                    .references
                    .insert(field.name.clone(), Reference::Pending(parent));
            }
            _ => {
                tracing::debug!(
                    "{} has no reference to {}, relation dropped",
                    child_def.name,
                    parent_def.name
                );
            }
        }
        Ok(())
    }
}

impl Walk<'_> {
    fn skip(&mut self, tag: &str, scope: Option<EntityIndex>) {
        self.output.skipped.insert(SkippedTag {
            tag: tag.to_string(),
            scope: scope.map(|i| self.types[i.0].name.clone()),
        });
    }
}

/// Extracts with the default ambiguity policy.
pub fn extract(
    tree: &TaggedNode,
    registry: &dyn SchemaRegistry,
) -> ResolveResult<Vec<ExtractedEntity>> {
    Extractor::new(registry)
        .extract(tree)
        .map(|output| output.entities)
}
