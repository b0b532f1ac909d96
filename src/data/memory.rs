//! In-process [`EntitySource`] used when no database is configured, and by tests.

use super::source::{Entity, EntitySource, SourceError, UpdateOutcome};
use crate::query::{CompiledQuery, Filter};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct MemorySource<E> {
    rows: RwLock<HashMap<Uuid, E>>,
}

impl<E: Entity> Default for MemorySource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemorySource<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Seed with rows as-is; unique keys are not checked.
    pub fn with_rows(rows: impl IntoIterator<Item = E>) -> Self {
        Self {
            rows: RwLock::new(rows.into_iter().map(|e| (e.id(), e)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// First natural key of `entity` already held by a different row.
fn taken_key<'a, E: Entity>(
    rows: impl Iterator<Item = &'a E>,
    entity: &E,
) -> Option<&'static str> {
    let keys = entity.unique_keys();
    rows.filter(|other| other.id() != entity.id())
        .flat_map(|other| other.unique_keys())
        .find_map(|taken| keys.iter().find(|k| **k == taken).map(|(name, _)| *name))
}

#[async_trait]
impl<E: Entity> EntitySource<E> for MemorySource<E> {
    async fn count(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn fetch(&self, query: &CompiledQuery<E>) -> Result<Vec<E>, SourceError> {
        let mut matched: Vec<E> = {
            let rows = self.rows.read().await;
            rows.values()
                .filter(|e| query.filter.matches(e))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| query.order.compare(a, b));

        Ok(match query.window {
            Some(window) => matched
                .into_iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matched,
        })
    }

    async fn find(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn insert(&self, entity: E) -> Result<E, SourceError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&entity.id()) {
            return Err(SourceError::UniqueViolation("id".to_owned()));
        }
        if let Some(key) = taken_key(rows.values(), &entity) {
            return Err(SourceError::UniqueViolation(key.to_owned()));
        }
        rows.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn update(
        &self,
        mut entity: E,
        expected_version: i64,
    ) -> Result<UpdateOutcome<E>, SourceError> {
        let mut rows = self.rows.write().await;
        let Some(current) = rows.get(&entity.id()) else {
            return Ok(UpdateOutcome::Missing);
        };
        if current.row_version() != expected_version {
            return Ok(UpdateOutcome::Conflict {
                actual: current.row_version(),
            });
        }
        if let Some(key) = taken_key(rows.values(), &entity) {
            return Err(SourceError::UniqueViolation(key.to_owned()));
        }
        entity.set_row_version(expected_version + 1);
        rows.insert(entity.id(), entity.clone());
        Ok(UpdateOutcome::Updated(entity))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        Ok(self.rows.write().await.remove(&id))
    }

    async fn delete_matching(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        if filter.is_empty() {
            return Ok(0);
        }
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, e| !filter.matches(e));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::companies::Company;
    use crate::query::{SearchBuilder, SortClause};
    use chrono::Utc;

    fn company(code: &str, name: &str) -> Company {
        Company::new(code, name, Utc::now())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_natural_key() {
        let source = MemorySource::new();
        source.insert(company("ACME", "Acme")).await.unwrap();
        let err = source.insert(company("acme", "Other")).await.unwrap_err();
        assert!(matches!(err, SourceError::UniqueViolation(ref k) if k == "code"));
        assert_eq!(source.len().await, 1);
    }

    #[tokio::test]
    async fn update_checks_version() {
        let source = MemorySource::new();
        let stored = source.insert(company("ACME", "Acme")).await.unwrap();
        assert_eq!(stored.row_version, 1);

        let mut edited = stored.clone();
        edited.name = "Acme Ltd".into();
        let outcome = source.update(edited.clone(), 1).await.unwrap();
        let UpdateOutcome::Updated(updated) = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(updated.row_version, 2);

        // stale writer still holds version 1
        let stale = source.update(edited, 1).await.unwrap();
        assert_eq!(stale, UpdateOutcome::Conflict { actual: 2 });
    }

    #[tokio::test]
    async fn update_and_delete_missing_rows() {
        let source = MemorySource::<Company>::new();
        let ghost = company("GHOST", "Ghost");
        assert_eq!(
            source.update(ghost.clone(), 1).await.unwrap(),
            UpdateOutcome::Missing
        );
        assert!(source.delete(ghost.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_matching_removes_only_matches() {
        let source = MemorySource::with_rows([
            company("A", "Alpha"),
            company("B", "Bravo"),
            company("C", "Charlie"),
        ]);
        let builder = SearchBuilder::<Company>::for_entity();

        assert_eq!(source.delete_matching(&Filter::all()).await.unwrap(), 0);
        assert_eq!(source.len().await, 3);

        let removed = source
            .delete_matching(&builder.filter_eq("code", "B"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(source.len().await, 2);
    }

    #[tokio::test]
    async fn fetch_applies_window_after_ordering() {
        let source = MemorySource::with_rows([
            company("C", "Charlie"),
            company("A", "Alpha"),
            company("B", "Bravo"),
        ]);
        let builder = SearchBuilder::<Company>::for_entity();
        let query = crate::query::CompiledQuery {
            filter: crate::query::Filter::all(),
            order: builder.order(&[SortClause::asc("name")]),
            window: Some(crate::query::Window {
                offset: 1,
                limit: 5,
            }),
        };
        let rows = source.fetch(&query).await.unwrap();
        let names: Vec<_> = rows.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bravo", "Charlie"]);
    }
}
