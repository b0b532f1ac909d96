//! Postgres-backed [`EntitySource`].
//!
//! Compiled filters and orderings are rendered with `sqlx::QueryBuilder`.
//! Column names come only from field registries; every value is a bound
//! parameter.

use super::source::{Entity, EntitySource, SourceError, UpdateOutcome};
use crate::query::{
    CompiledQuery, Condition, FieldKind, FieldValue, Filter, SortDirection, SortOrder, Test,
    Window,
};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::marker::PhantomData;
use uuid::Uuid;

/// Columns the generic UPDATE never writes.
const IMMUTABLE_COLUMNS: &[&str] = &["id", "created_at", "row_version"];

/// An entity stored in its own table.
pub trait PgEntity: Entity + for<'r> FromRow<'r, PgRow> + Unpin {
    const TABLE: &'static str;

    /// Every stored column with its kind and current value, `id` first.
    fn row(&self) -> Vec<(&'static str, FieldKind, FieldValue)>;
}

pub struct PgSource<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: PgEntity> PgSource<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

/// Escape LIKE meta-characters so user input matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, kind: FieldKind, value: FieldValue) {
    match value {
        FieldValue::Text(v) => qb.push_bind(v),
        FieldValue::Integer(v) => qb.push_bind(v),
        FieldValue::Bool(v) => qb.push_bind(v),
        FieldValue::Uuid(v) => qb.push_bind(v),
        FieldValue::Timestamp(v) => qb.push_bind(v),
        FieldValue::Null => match kind {
            FieldKind::Text => qb.push_bind(None::<String>),
            FieldKind::Integer => qb.push_bind(None::<i64>),
            FieldKind::Bool => qb.push_bind(None::<bool>),
            FieldKind::Uuid => qb.push_bind(None::<Uuid>),
            FieldKind::Timestamp => qb.push_bind(None::<chrono::DateTime<chrono::Utc>>),
        },
    };
}

fn push_condition<E>(qb: &mut QueryBuilder<'static, Postgres>, condition: &Condition<E>) {
    let column = condition.field.column;
    let kind = condition.field.kind;
    match &condition.test {
        Test::Compare(cmp, value) => {
            qb.push(column).push(' ').push(cmp.sql()).push(' ');
            push_value(qb, kind, value.clone());
        }
        Test::In(values) => {
            qb.push(column).push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, kind, value.clone());
            }
            qb.push(')');
        }
        Test::Like(mode, needle) => {
            qb.push(column).push(" ILIKE ");
            qb.push_bind(mode.pattern(&escape_like(needle)));
            qb.push(" ESCAPE '\\'");
        }
        Test::EqualsIgnoreCase(value) => {
            qb.push("lower(").push(column).push(") = lower(");
            qb.push_bind(value.clone());
            qb.push(')');
        }
    }
}

fn push_where<E>(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter<E>) {
    for (i, condition) in filter.conditions().iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_condition(qb, condition);
    }
}

fn push_order<E>(qb: &mut QueryBuilder<'static, Postgres>, order: &SortOrder<E>) {
    for (i, (field, direction)) in order.keys().iter().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(field.column);
        if field.kind.is_text() {
            qb.push(" COLLATE \"C\"");
        }
        qb.push(match direction {
            SortDirection::Asc => " ASC NULLS LAST",
            SortDirection::Desc => " DESC NULLS LAST",
        });
    }
}

fn push_window(qb: &mut QueryBuilder<'static, Postgres>, window: Window) {
    qb.push(" LIMIT ");
    qb.push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));
}

pub(crate) fn count_query<E: PgEntity>(filter: &Filter<E>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_where(&mut qb, filter);
    qb
}

pub(crate) fn delete_query<E: PgEntity>(filter: &Filter<E>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {}", E::TABLE));
    push_where(&mut qb, filter);
    qb
}

pub(crate) fn fetch_query<E: PgEntity>(query: &CompiledQuery<E>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", E::TABLE));
    push_where(&mut qb, &query.filter);
    push_order(&mut qb, &query.order);
    if let Some(window) = query.window {
        push_window(&mut qb, window);
    }
    qb
}

pub(crate) fn insert_query<E: PgEntity>(entity: &E) -> QueryBuilder<'static, Postgres> {
    let row = entity.row();
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", E::TABLE));
    for (i, (column, _, _)) in row.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column);
    }
    qb.push(") VALUES (");
    for (i, (_, kind, value)) in row.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, kind, value);
    }
    qb.push(") RETURNING *");
    qb
}

pub(crate) fn update_query<E: PgEntity>(
    entity: &E,
    expected_version: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
    for (column, kind, value) in entity.row() {
        if IMMUTABLE_COLUMNS.contains(&column) {
            continue;
        }
        qb.push(column).push(" = ");
        push_value(&mut qb, kind, value);
        qb.push(", ");
    }
    qb.push("row_version = row_version + 1 WHERE id = ");
    qb.push_bind(entity.id());
    qb.push(" AND row_version = ");
    qb.push_bind(expected_version);
    qb.push(" RETURNING *");
    qb
}

/// Map a driver error, surfacing unique-index violations as their own kind.
fn map_db_error(err: sqlx::Error) -> SourceError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return SourceError::UniqueViolation(db.constraint().unwrap_or("unique").to_owned());
        }
    }
    SourceError::Database(err)
}

#[async_trait]
impl<E: PgEntity> EntitySource<E> for PgSource<E> {
    async fn count(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        let total: i64 = count_query(filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn fetch(&self, query: &CompiledQuery<E>) -> Result<Vec<E>, SourceError> {
        let rows = fetch_query(query)
            .build_query_as::<E>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        let row = sqlx::query_as::<_, E>(&format!("SELECT * FROM {} WHERE id = $1", E::TABLE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert(&self, entity: E) -> Result<E, SourceError> {
        insert_query(&entity)
            .build_query_as::<E>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn update(
        &self,
        entity: E,
        expected_version: i64,
    ) -> Result<UpdateOutcome<E>, SourceError> {
        let updated = update_query(&entity, expected_version)
            .build_query_as::<E>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        if let Some(updated) = updated {
            return Ok(UpdateOutcome::Updated(updated));
        }

        // Nothing matched: either the row is gone or its version moved on.
        let actual: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT row_version FROM {} WHERE id = $1",
            E::TABLE
        ))
        .bind(entity.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(match actual {
            Some(actual) => UpdateOutcome::Conflict { actual },
            None => UpdateOutcome::Missing,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        let row = sqlx::query_as::<_, E>(&format!(
            "DELETE FROM {} WHERE id = $1 RETURNING *",
            E::TABLE
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_matching(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        if filter.is_empty() {
            return Ok(0);
        }
        let result = delete_query(filter).build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
