use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

use crate::entity::{ExtractedEntity, RecordId};
use crate::schema::{FieldKind, Schema, SchemaEntity, SchemaRegistry};
use crate::source::ImportLog;
use crate::store::{columns, Commit, Store, StoreError, StoreResult, StoredRecord};

const IMPORT_LOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS import_log (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    entity_count INTEGER NOT NULL,
    created_count INTEGER NOT NULL,
    matched_count INTEGER NOT NULL,
    imported_at TEXT NOT NULL
);
"#;

/// SQLite-backed [`Store`] with one table per schema entity.
///
/// Unique fields carry a `UNIQUE` constraint, so two imports racing on the
/// same natural key end up sharing one row.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    schema: Schema,
}

impl SqliteStore {
    pub async fn open(path: &str, registry: &dyn SchemaRegistry) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        Self::init(pool, registry).await
    }

    pub async fn open_memory(registry: &dyn SchemaRegistry) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::init(pool, registry).await
    }

    async fn init(pool: Pool<Sqlite>, registry: &dyn SchemaRegistry) -> StoreResult<Self> {
        let schema = Schema {
            entities: registry.entities().to_vec(),
        };

        sqlx::query(IMPORT_LOG_SQL).execute(&pool).await?;
        for entity in &schema.entities {
            sqlx::query(&create_table_sql(entity))
                .execute(&pool)
                .await?;
        }

        Ok(Self { pool, schema })
    }

    fn definition(&self, entity: &str) -> StoreResult<&SchemaEntity> {
        self.schema
            .entity(entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }

    fn column<'d>(def: &'d SchemaEntity, field: &str) -> StoreResult<&'d str> {
        def.field(field)
            .map(|f| f.name.as_str())
            .ok_or_else(|| StoreError::UnknownField {
                entity: def.name.clone(),
                field: field.to_string(),
            })
    }

    async fn exists(&self, entity: &str, id: RecordId) -> StoreResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", quote(entity));
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(
        &self,
        def: &SchemaEntity,
        id: RecordId,
        values: &BTreeMap<String, String>,
    ) -> StoreResult<bool> {
        let mut names = vec![quote("id")];
        names.extend(values.keys().map(|k| quote(k)));
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            quote(&def.name),
            names.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(id.to_string());
        for value in values.values() {
            query = query.bind(value.clone());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Row count for one entity type.
    pub async fn count(&self, entity: &str) -> StoreResult<i64> {
        self.definition(entity)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote(entity));
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Every stored row of one entity type, oldest first.
    pub async fn records(&self, entity: &str) -> StoreResult<Vec<StoredRecord>> {
        let def = self.definition(entity)?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote(entity));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> StoreResult<StoredRecord> {
                let id: String = row.try_get("id")?;
                let mut values = BTreeMap::new();
                for field in &def.fields {
                    let value: Option<String> = row.try_get(field.name.as_str())?;
                    values.insert(field.name.clone(), value);
                }
                Ok(StoredRecord {
                    id: Some(id.parse().map_err(|_| StoreError::InvalidId(id))?),
                    values,
                })
            })
            .collect()
    }

    pub async fn record_import(&self, log: &ImportLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_log (id, source, entity_count, created_count, matched_count, imported_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.source)
        .bind(i64::from(log.entity_count))
        .bind(i64::from(log.created_count))
        .bind(i64::from(log.matched_count))
        .bind(log.imported_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn import_history(&self) -> StoreResult<Vec<ImportLog>> {
        let rows: Vec<(String, String, i64, i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT id, source, entity_count, created_count, matched_count, imported_at
            FROM import_log ORDER BY imported_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_import_row).collect()
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn find_by_unique_field(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<RecordId>> {
        let def = self.definition(entity)?;
        let column = Self::column(def, field)?;
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ? LIMIT 1",
            quote(entity),
            quote(column)
        );

        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id,)| id.parse().map_err(|_| StoreError::InvalidId(id)))
            .transpose()
    }

    async fn commit(&self, entity: &ExtractedEntity) -> StoreResult<Commit> {
        let def = self.definition(&entity.entity)?;
        let values = columns(def, entity)?;

        if let Some(id) = entity.record_id {
            if self.exists(&def.name, id).await? {
                return Ok(Commit { id, created: false });
            }
        }

        let id = entity.record_id.unwrap_or_default();
        if self.insert(def, id, &values).await? {
            return Ok(Commit { id, created: true });
        }

        // Lost a race on a unique column: the row is already there.
        for field in def.unique_fields() {
            let Some(value) = values.get(&field.name) else {
                continue;
            };
            if let Some(existing) = self
                .find_by_unique_field(&def.name, &field.name, value)
                .await?
            {
                tracing::debug!("{} {} already stored as {}", def.name, id, existing);
                return Ok(Commit {
                    id: existing,
                    created: false,
                });
            }
        }

        Err(StoreError::Conflict {
            entity: def.name.clone(),
        })
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(entity: &SchemaEntity) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    id TEXT PRIMARY KEY",
        quote(&entity.name)
    );

    for field in &entity.fields {
        let _ = write!(sql, ",\n    {} TEXT", quote(&field.name));
        if field.unique {
            sql.push_str(" UNIQUE");
        }
        if let FieldKind::Reference { target } = &field.kind {
            let _ = write!(sql, " REFERENCES {}(id)", quote(target));
        }
    }

    sql.push_str("\n)");
    sql
}

fn parse_import_row(row: (String, String, i64, i64, i64, String)) -> StoreResult<ImportLog> {
    let (id, source, entity_count, created_count, matched_count, imported_at) = row;

    Ok(ImportLog {
        id: id.parse().map_err(|_| StoreError::InvalidId(id))?,
        source,
        entity_count: u32::try_from(entity_count).unwrap_or_default(),
        created_count: u32::try_from(created_count).unwrap_or_default(),
        matched_count: u32::try_from(matched_count).unwrap_or_default(),
        imported_at: DateTime::parse_from_rfc3339(&imported_at)
            .map_or_else(|_| Utc::now(), |t| t.with_timezone(&Utc)),
    })
}
