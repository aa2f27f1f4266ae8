use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolve::{find_ambiguities, AmbiguousNameError};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid name: {0:?} is not a valid identifier")]
    InvalidName(String),
    #[error("Field {field:?} on {entity} is reserved")]
    ReservedField { entity: String, field: String },
    #[error("Field {entity}.{field} references unknown entity {target:?}")]
    UnknownTarget {
        entity: String,
        field: String,
        target: String,
    },
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousNameError),
    #[error("Invalid schema definition: {0}")]
    Definition(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Reference { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl SchemaField {
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            unique: false,
        }
    }

    #[must_use]
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Reference {
                target: target.into(),
            },
            unique: false,
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar)
    }

    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Reference { target } => Some(target),
            FieldKind::Scalar => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntity {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl SchemaEntity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.unique)
    }
}

/// Enumerates the entity types a tree can be mapped onto.
///
/// Iteration order must be stable: name resolution walks it front to back.
pub trait SchemaRegistry: Send + Sync {
    fn entities(&self) -> &[SchemaEntity];

    fn entity(&self, name: &str) -> Option<&SchemaEntity> {
        self.entities().iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub entities: Vec<SchemaEntity>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: SchemaEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn from_json_str(json: &str) -> SchemaResult<Self> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn load(path: &Path) -> SchemaResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks names, reference targets and normalized-name collisions.
    pub fn validate(&self) -> SchemaResult<()> {
        for entity in &self.entities {
            if !IDENTIFIER.is_match(&entity.name) {
                return Err(SchemaError::InvalidName(entity.name.clone()));
            }

            for field in &entity.fields {
                if !IDENTIFIER.is_match(&field.name) {
                    return Err(SchemaError::InvalidName(field.name.clone()));
                }
                if field.name.eq_ignore_ascii_case("id") {
                    return Err(SchemaError::ReservedField {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if let Some(target) = field.target() {
                    if self.entity(target).is_none() {
                        return Err(SchemaError::UnknownTarget {
                            entity: entity.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(ambiguity) = find_ambiguities(self).into_iter().next() {
            return Err(ambiguity.into());
        }

        Ok(())
    }

    /// RSS 2.0 channels with their images and items.
    #[must_use]
    pub fn rss() -> Self {
        let channel = [
            "title",
            "description",
            "language",
            "copyright",
            "managing_editor",
            "web_master",
            "generator",
            "docs",
            "rating",
            "pub_date",
            "last_build_date",
            "ttl",
        ]
        .into_iter()
        .fold(
            SchemaEntity::new("Channel").with_field(SchemaField::scalar("link").unique()),
            |entity, name| entity.with_field(SchemaField::scalar(name)),
        );

        let image = ["url", "title", "link", "description", "width", "height"]
            .into_iter()
            .fold(
                SchemaEntity::new("Image").with_field(SchemaField::reference("channel", "Channel")),
                |entity, name| entity.with_field(SchemaField::scalar(name)),
            );

        let item = [
            "title",
            "link",
            "description",
            "author",
            "comments",
            "guid",
            "pubDate",
            "source",
        ]
        .into_iter()
        .fold(
            SchemaEntity::new("Item").with_field(SchemaField::reference("channel", "Channel")),
            |entity, name| entity.with_field(SchemaField::scalar(name)),
        );

        Self::new()
            .with_entity(channel)
            .with_entity(image)
            .with_entity(item)
    }
}

impl SchemaRegistry for Schema {
    fn entities(&self) -> &[SchemaEntity] {
        &self.entities
    }
}

impl<T: SchemaRegistry + ?Sized> SchemaRegistry for &T {
    fn entities(&self) -> &[SchemaEntity] {
        (**self).entities()
    }
}

impl<T: SchemaRegistry + ?Sized> SchemaRegistry for Box<T> {
    fn entities(&self) -> &[SchemaEntity] {
        (**self).entities()
    }
}
