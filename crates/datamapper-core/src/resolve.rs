//! Tag-to-schema name resolution.
//!
//! Tags and schema names are compared after [`normalize`], so `pub_date`,
//! `pubDate` and `PUB-DATE` all refer to the same field.

use std::fmt;

use thiserror::Error;

use crate::schema::{SchemaEntity, SchemaField, SchemaRegistry};

/// Minimum Jaro-Winkler similarity for a name to be offered as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Strips every non-alphabetic character and lower-cases the rest.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Entity,
    Field,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Field => f.write_str("field"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ambiguous {kind} name {tag:?}{}: matches {}", scope_suffix(.scope.as_deref()), .candidates.join(", "))]
pub struct AmbiguousNameError {
    pub kind: NameKind,
    pub tag: String,
    pub scope: Option<String>,
    pub candidates: Vec<String>,
}

fn scope_suffix(scope: Option<&str>) -> String {
    scope.map(|s| format!(" in {s}")).unwrap_or_default()
}

/// What to do when several schema names normalize to the same string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Fail with [`AmbiguousNameError`].
    #[default]
    Reject,
    /// Take the first candidate in registry order.
    FirstMatch,
}

pub type ResolveResult<T> = Result<T, AmbiguousNameError>;

#[derive(Clone, Copy)]
pub struct NameResolver<'a> {
    registry: &'a dyn SchemaRegistry,
    policy: AmbiguityPolicy,
}

impl<'a> NameResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a dyn SchemaRegistry) -> Self {
        Self {
            registry,
            policy: AmbiguityPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resolve_entity(&self, tag: &str) -> ResolveResult<Option<&'a SchemaEntity>> {
        tracing::debug!("Finding entity for tag {:?}", tag);
        let found = self.pick(
            NameKind::Entity,
            tag,
            None,
            self.registry.entities().iter().map(|e| (e.name.as_str(), e)),
        )?;
        if let Some(entity) = found {
            tracing::debug!("Found entity {}", entity.name);
        }
        Ok(found)
    }

    pub fn resolve_field(
        &self,
        tag: &str,
        entity: &'a SchemaEntity,
    ) -> ResolveResult<Option<&'a SchemaField>> {
        tracing::debug!("Finding field for tag {:?} in {}", tag, entity.name);
        let found = self.pick(
            NameKind::Field,
            tag,
            Some(&entity.name),
            entity.fields.iter().map(|f| (f.name.as_str(), f)),
        )?;
        if let Some(field) = found {
            tracing::debug!("Found field {}.{}", entity.name, field.name);
        }
        Ok(found)
    }

    fn pick<T>(
        &self,
        kind: NameKind,
        tag: &str,
        scope: Option<&str>,
        candidates: impl Iterator<Item = (&'a str, &'a T)>,
    ) -> ResolveResult<Option<&'a T>> {
        let wanted = normalize(tag);
        let mut matches = candidates.filter(|(name, _)| normalize(name) == wanted);

        let Some((first_name, first)) = matches.next() else {
            return Ok(None);
        };

        if self.policy == AmbiguityPolicy::FirstMatch {
            return Ok(Some(first));
        }

        let others: Vec<&str> = matches.map(|(name, _)| name).collect();
        if others.is_empty() {
            return Ok(Some(first));
        }

        Err(AmbiguousNameError {
            kind,
            tag: tag.to_string(),
            scope: scope.map(str::to_string),
            candidates: std::iter::once(first_name)
                .chain(others)
                .map(str::to_string)
                .collect(),
        })
    }

    /// Closest entity name for a tag that did not resolve.
    pub fn suggest_entity(&self, tag: &str) -> Option<&'a str> {
        closest(tag, self.registry.entities().iter().map(|e| e.name.as_str()))
    }

    /// Closest field name on `entity` for a tag that did not resolve.
    pub fn suggest_field(&self, tag: &str, entity: &'a SchemaEntity) -> Option<&'a str> {
        closest(tag, entity.fields.iter().map(|f| f.name.as_str()))
    }
}

fn closest<'a>(tag: &str, names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let wanted = normalize(tag);
    if wanted.is_empty() {
        return None;
    }

    names
        .map(|name| (name, strsim::jaro_winkler(&wanted, &normalize(name))))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
}

/// Every entity name, and every field name within one entity, that collides
/// with another after normalization.
pub fn find_ambiguities(registry: &dyn SchemaRegistry) -> Vec<AmbiguousNameError> {
    let mut found = collisions(
        NameKind::Entity,
        None,
        registry.entities().iter().map(|e| e.name.as_str()),
    );

    for entity in registry.entities() {
        found.extend(collisions(
            NameKind::Field,
            Some(&entity.name),
            entity.fields.iter().map(|f| f.name.as_str()),
        ));
    }

    found
}

fn collisions<'a>(
    kind: NameKind,
    scope: Option<&str>,
    names: impl Iterator<Item = &'a str>,
) -> Vec<AmbiguousNameError> {
    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();

    for name in names {
        let key = normalize(name);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(name),
            None => groups.push((key, vec![name])),
        }
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, members)| AmbiguousNameError {
            kind,
            tag: key,
            scope: scope.map(str::to_string),
            candidates: members.into_iter().map(str::to_string).collect(),
        })
        .collect()
}
