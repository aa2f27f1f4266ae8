use serde::Serialize;
use thiserror::Error;

use crate::entity::{EntityIndex, ExtractedEntity, RecordId, Reference};
use crate::schema::SchemaRegistry;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to save {entity} #{index}: {source}")]
    Store {
        index: usize,
        entity: String,
        #[source]
        source: StoreError,
    },
    #[error("{entity} #{index} references entity #{target}, which has not been saved")]
    UnresolvedReference {
        index: usize,
        entity: String,
        target: usize,
    },
}

pub type PersistResult<T> = Result<T, PersistError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub created: usize,
    pub matched: usize,
}

impl SaveReport {
    pub const fn total(&self) -> usize {
        self.created + self.matched
    }
}

/// Writes an extracted entity graph to a [`Store`], parents first.
pub struct Persister<'a, S: ?Sized> {
    registry: &'a dyn SchemaRegistry,
    store: &'a S,
}

impl<'a, S: Store + ?Sized> Persister<'a, S> {
    pub fn new(registry: &'a dyn SchemaRegistry, store: &'a S) -> Self {
        Self { registry, store }
    }

    /// Saves `entities` in order.
    ///
    /// Stops at the first failure; entities committed before it stay
    /// committed and keep their `record_id`.
    pub async fn save(&self, entities: &mut [ExtractedEntity]) -> PersistResult<SaveReport> {
        let mut report = SaveReport::default();

        for index in 0..entities.len() {
            materialize_references(entities, index)?;

            let entity = &entities[index];
            let wrap = |source| PersistError::Store {
                index,
                entity: entity.entity.clone(),
                source,
            };

            let existing = if entity.is_persisted() {
                None
            } else {
                self.find_existing(entity).await.map_err(wrap)?
            };

            let commit = match existing {
                Some(id) => {
                    tracing::debug!("{} #{} matches existing record {}", entity.entity, index, id);
                    let mut adopted = entity.clone();
                    adopted.record_id = Some(id);
                    self.store.commit(&adopted).await.map_err(wrap)?
                }
                None => self.store.commit(entity).await.map_err(wrap)?,
            };

            if commit.created {
                report.created += 1;
            } else {
                report.matched += 1;
            }
            tracing::debug!("Saved {} #{} as {}", entities[index].entity, index, commit.id);
            entities[index].record_id = Some(commit.id);
        }

        Ok(report)
    }

    async fn find_existing(&self, entity: &ExtractedEntity) -> Result<Option<RecordId>, StoreError> {
        let def = self
            .registry
            .entity(&entity.entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.entity.clone()))?;

        for field in def.unique_fields() {
            let Some(value) = entity.value(&field.name) else {
                continue;
            };
            if let Some(id) = self
                .store
                .find_by_unique_field(&entity.entity, &field.name, value)
                .await?
            {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }
}

fn materialize_references(entities: &mut [ExtractedEntity], index: usize) -> PersistResult<()> {
    let pending: Vec<(String, EntityIndex)> = entities[index]
        .references
        .iter()
        .filter_map(|(field, reference)| match reference {
            Reference::Pending(target) => Some((field.clone(), *target)),
            Reference::Persisted(_) => None,
        })
        .collect();

    for (field, target) in pending {
        let id = entities
            .get(target.0)
            .and_then(|e| e.record_id)
            .ok_or_else(|| PersistError::UnresolvedReference {
                index,
                entity: entities[index].entity.clone(),
                target: target.0,
            })?;
        entities[index]
            .references
            .insert(field, Reference::Persisted(id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::schema::Schema;
    use crate::store::{Commit, MemoryStore, StoreResult};

    fn feed(link: &str, items: &[&str]) -> Vec<ExtractedEntity> {
        let mut entities = vec![ExtractedEntity::new("Channel").with_value("link", link)];
        entities.extend(items.iter().map(|title| {
            ExtractedEntity::new("Item")
                .with_value("title", *title)
                .with_reference("channel", Reference::Pending(EntityIndex(0)))
        }));
        entities
    }

    /// Fails every commit after the first `allowed`, and every lookup when
    /// `fail_lookups` is set.
    struct FlakyStore {
        inner: MemoryStore<Schema>,
        allowed: usize,
        commits: AtomicUsize,
        fail_lookups: bool,
    }

    impl FlakyStore {
        fn new(allowed: usize, fail_lookups: bool) -> Self {
            Self {
                inner: MemoryStore::new(Schema::rss()),
                allowed,
                commits: AtomicUsize::new(0),
                fail_lookups,
            }
        }
    }

    #[async_trait::async_trait]
    impl Store for FlakyStore {
        async fn find_by_unique_field(
            &self,
            entity: &str,
            field: &str,
            value: &str,
        ) -> StoreResult<Option<RecordId>> {
            if self.fail_lookups {
                return Err(StoreError::InvalidId(value.to_string()));
            }
            self.inner.find_by_unique_field(entity, field, value).await
        }

        async fn commit(&self, entity: &ExtractedEntity) -> StoreResult<Commit> {
            if self.commits.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(StoreError::Conflict {
                    entity: entity.entity.clone(),
                });
            }
            self.inner.commit(entity).await
        }
    }

    #[tokio::test]
    async fn test_save_links_children_to_parent_id() {
        let schema = Schema::rss();
        let store = MemoryStore::new(Schema::rss());
        let mut entities = feed("http://example.com/", &["a", "b"]);

        let report = Persister::new(&schema, &store).save(&mut entities).await.unwrap();

        assert_eq!(report, SaveReport { created: 3, matched: 0 });
        let channel_id = entities[0].record_id.unwrap();
        for item in &entities[1..] {
            assert_eq!(item.reference("channel"), Some(Reference::Persisted(channel_id)));
        }
        assert_eq!(store.count("Item").await, 2);
    }

    #[tokio::test]
    async fn test_unique_field_adopts_existing_record() {
        let schema = Schema::rss();
        let store = MemoryStore::new(Schema::rss());

        let mut first = feed("http://example.com/", &["a"]);
        Persister::new(&schema, &store).save(&mut first).await.unwrap();

        let mut second = feed("http://example.com/", &["a"]);
        second[0].set_value("title", "Renamed");
        let report = Persister::new(&schema, &store).save(&mut second).await.unwrap();

        assert_eq!(report, SaveReport { created: 1, matched: 1 });
        assert_eq!(second[0].record_id, first[0].record_id);
        assert_eq!(
            second[1].reference("channel"),
            Some(Reference::Persisted(first[0].record_id.unwrap()))
        );
        assert_eq!(store.count("Channel").await, 1);
        assert_eq!(store.count("Item").await, 2);
        assert_eq!(store.records("Channel").await[0].get("title"), None);
    }

    #[tokio::test]
    async fn test_missing_unique_value_is_not_looked_up() {
        let schema = Schema::rss();
        let store = MemoryStore::new(Schema::rss());

        for _ in 0..2 {
            let mut entities = vec![ExtractedEntity::new("Channel").with_value("title", "t")];
            Persister::new(&schema, &store).save(&mut entities).await.unwrap();
        }

        assert_eq!(store.count("Channel").await, 2);
    }

    #[tokio::test]
    async fn test_resave_confirms_existing_records() {
        let schema = Schema::rss();
        let store = MemoryStore::new(Schema::rss());
        let mut entities = feed("http://example.com/", &["a"]);

        Persister::new(&schema, &store).save(&mut entities).await.unwrap();
        let report = Persister::new(&schema, &store).save(&mut entities).await.unwrap();

        assert_eq!(report, SaveReport { created: 0, matched: 2 });
        assert_eq!(store.count("Item").await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_earlier_commits() {
        let schema = Schema::rss();
        let store = FlakyStore::new(2, false);
        let mut entities = feed("http://example.com/", &["a", "b", "c"]);

        let err = Persister::new(&schema, &store)
            .save(&mut entities)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PersistError::Store { index: 2, ref entity, .. } if entity == "Item"
        ));
        assert!(entities[1].is_persisted());
        assert!(!entities[2].is_persisted());
        assert!(!entities[3].is_persisted());
        assert_eq!(store.inner.count("Channel").await, 1);
        assert_eq!(store.inner.count("Item").await, 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_earlier_commits() {
        let schema = Schema::rss();
        let store = FlakyStore::new(usize::MAX, true);
        let mut entities = vec![
            ExtractedEntity::new("Channel").with_value("title", "no link"),
            ExtractedEntity::new("Channel").with_value("link", "http://example.com/"),
            ExtractedEntity::new("Channel").with_value("title", "never reached"),
        ];

        let err = Persister::new(&schema, &store)
            .save(&mut entities)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PersistError::Store {
                index: 1,
                ref entity,
                source: StoreError::InvalidId(_),
            } if entity == "Channel"
        ));
        assert!(entities[0].is_persisted());
        assert!(!entities[1].is_persisted());
        assert!(!entities[2].is_persisted());
        assert_eq!(store.inner.count("Channel").await, 1);
    }

    #[tokio::test]
    async fn test_reference_to_unsaved_entity_fails() {
        let schema = Schema::rss();
        let store = MemoryStore::new(Schema::rss());
        let mut entities = vec![ExtractedEntity::new("Item")
            .with_reference("channel", Reference::Pending(EntityIndex(1)))];

        let err = Persister::new(&schema, &store)
            .save(&mut entities)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PersistError::UnresolvedReference { index: 0, target: 1, .. }
        ));
    }
}
