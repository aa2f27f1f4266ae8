use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::entity::{ExtractedEntity, RecordId};
use crate::schema::{SchemaEntity, SchemaRegistry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),
    #[error("Unknown field {field:?} on {entity}")]
    UnknownField { entity: String, field: String },
    #[error("Field {entity}.{field} still points at an unsaved entity")]
    PendingReference { entity: String, field: String },
    #[error("Unique constraint violated on {entity} without a matching record")]
    Conflict { entity: String },
    #[error("Invalid record id: {0}")]
    InvalidId(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub id: RecordId,
    /// False when the entity resolved to a record that already existed.
    pub created: bool,
}

/// Durable home of extracted entities.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn find_by_unique_field(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<RecordId>>;

    /// Inserts `entity`, or confirms the record named by its `record_id`.
    ///
    /// Returns once the write is durable.
    async fn commit(&self, entity: &ExtractedEntity) -> StoreResult<Commit>;
}

/// A stored row: scalar columns and reference columns by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: Option<RecordId>,
    pub values: BTreeMap<String, Option<String>>,
}

impl StoredRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Option::as_deref)
    }
}

/// Column values for `entity`, validated against its schema definition.
pub(crate) fn columns(
    def: &SchemaEntity,
    entity: &ExtractedEntity,
) -> StoreResult<BTreeMap<String, String>> {
    let mut columns = BTreeMap::new();

    for (field, value) in &entity.values {
        if def.field(field).is_none() {
            return Err(StoreError::UnknownField {
                entity: entity.entity.clone(),
                field: field.clone(),
            });
        }
        columns.insert(field.clone(), value.clone());
    }

    for (field, reference) in &entity.references {
        if def.field(field).is_none() {
            return Err(StoreError::UnknownField {
                entity: entity.entity.clone(),
                field: field.clone(),
            });
        }
        let Some(id) = reference.record_id() else {
            return Err(StoreError::PendingReference {
                entity: entity.entity.clone(),
                field: field.clone(),
            });
        };
        columns.insert(field.clone(), id.to_string());
    }

    Ok(columns)
}

/// In-process store with the same uniqueness rules as the database.
pub struct MemoryStore<R> {
    registry: R,
    tables: Mutex<HashMap<String, Vec<(RecordId, BTreeMap<String, String>)>>>,
}

impl<R: SchemaRegistry> MemoryStore<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub async fn count(&self, entity: &str) -> usize {
        self.tables.lock().await.get(entity).map_or(0, Vec::len)
    }

    pub async fn records(&self, entity: &str) -> Vec<StoredRecord> {
        let tables = self.tables.lock().await;
        let Some(def) = self.registry.entity(entity) else {
            return Vec::new();
        };

        tables
            .get(entity)
            .into_iter()
            .flatten()
            .map(|(id, row)| StoredRecord {
                id: Some(*id),
                values: def
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), row.get(&f.name).cloned()))
                    .collect(),
            })
            .collect()
    }

    fn definition(&self, entity: &str) -> StoreResult<&SchemaEntity> {
        self.registry
            .entity(entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }
}

#[async_trait::async_trait]
impl<R: SchemaRegistry> Store for MemoryStore<R> {
    async fn find_by_unique_field(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<RecordId>> {
        self.definition(entity)?;
        let tables = self.tables.lock().await;

        Ok(tables.get(entity).and_then(|rows| {
            rows.iter()
                .find(|(_, row)| row.get(field).is_some_and(|v| v == value))
                .map(|(id, _)| *id)
        }))
    }

    async fn commit(&self, entity: &ExtractedEntity) -> StoreResult<Commit> {
        let def = self.definition(&entity.entity)?;
        let columns = columns(def, entity)?;
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(entity.entity.clone()).or_default();

        if let Some(id) = entity.record_id {
            if rows.iter().any(|(existing, _)| *existing == id) {
                return Ok(Commit { id, created: false });
            }
        }

        for field in def.unique_fields() {
            let Some(value) = columns.get(&field.name) else {
                continue;
            };
            if let Some((id, _)) = rows
                .iter()
                .find(|(_, row)| row.get(&field.name) == Some(value))
            {
                return Ok(Commit {
                    id: *id,
                    created: false,
                });
            }
        }

        let id = entity.record_id.unwrap_or_default();
        rows.push((id, columns));
        Ok(Commit { id, created: true })
    }
}
