//! Per-entity allow-lists mapping external field names to typed accessors.
//!
//! A registry is the only way a query-string field name reaches an entity
//! value or a database column. Names are matched case-insensitively; anything
//! not registered is unreachable.

use super::params::SortDirection;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Storage type of a registered field. Drives value coercion and SQL binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Bool,
    Uuid,
    Timestamp,
}

impl FieldKind {
    /// Coerce a raw query-string value into a typed value for this kind.
    pub fn coerce(self, raw: &str) -> Option<FieldValue> {
        match self {
            FieldKind::Text => Some(FieldValue::Text(raw.to_owned())),
            FieldKind::Integer => raw.trim().parse().ok().map(FieldValue::Integer),
            FieldKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(FieldValue::Bool(true)),
                "false" | "0" | "no" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            FieldKind::Uuid => Uuid::parse_str(raw.trim()).ok().map(FieldValue::Uuid),
            FieldKind::Timestamp => parse_timestamp(raw.trim()).map(FieldValue::Timestamp),
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, FieldKind::Text)
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.to_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A field value read from an entity or coerced from a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// SQL-style comparison: `None` when either side is null or the kinds differ.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Ordering for sorting: nulls last regardless of direction.
    pub fn sort_cmp(&self, other: &FieldValue, direction: SortDirection) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = self.compare(other).unwrap_or(Ordering::Equal);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A registered field: external name, backing column, kind, and accessor.
pub struct Field<E> {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    accessor: fn(&E) -> FieldValue,
}

impl<E> Field<E> {
    pub const fn new(
        name: &'static str,
        column: &'static str,
        kind: FieldKind,
        accessor: fn(&E) -> FieldValue,
    ) -> Self {
        Self {
            name,
            column,
            kind,
            accessor,
        }
    }

    /// Read this field from an entity.
    pub fn value(&self, entity: &E) -> FieldValue {
        (self.accessor)(entity)
    }
}

// Manual impls: deriving would require `E: Clone`.
impl<E> Clone for Field<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Field<E> {}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Case-insensitive name → field map.
pub struct FieldRegistry<E> {
    fields: HashMap<String, Field<E>>,
}

impl<E> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FieldRegistry<E> {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, field: Field<E>) -> Self {
        self.fields.insert(field.name.to_lowercase(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<Field<E>> {
        self.fields.get(&name.trim().to_lowercase()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered external names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.fields.values().map(|f| f.name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Everything the search builder needs to know about one entity type.
pub struct EntitySchema<E> {
    pub filters: FieldRegistry<E>,
    pub sorts: FieldRegistry<E>,
    /// Unique row key, appended as the final tie-breaker of every ordering.
    pub key: Field<E>,
    /// Ordering used when a request has no valid sort clause.
    pub default_order: Vec<(Field<E>, SortDirection)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Row {
        name: String,
        nickname: Option<String>,
    }

    fn registry() -> FieldRegistry<Row> {
        FieldRegistry::new()
            .with(Field::new("displayName", "name", FieldKind::Text, |r: &Row| {
                r.name.clone().into()
            }))
            .with(Field::new(
                "nickname",
                "nickname",
                FieldKind::Text,
                |r: &Row| r.nickname.clone().into(),
            ))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = registry();
        assert_eq!(reg.get("displayname").unwrap().column, "name");
        assert_eq!(reg.get("DISPLAYNAME").unwrap().column, "name");
        assert_eq!(reg.get(" displayName ").unwrap().column, "name");
        assert!(reg.get("name").is_none());
        assert_eq!(reg.names(), vec!["displayName", "nickname"]);
    }

    #[test]
    fn accessor_reads_entity() {
        let reg = registry();
        let row = Row {
            name: "Acme".into(),
            nickname: None,
        };
        assert_eq!(
            reg.get("displayName").unwrap().value(&row),
            FieldValue::Text("Acme".into())
        );
        assert_eq!(reg.get("nickname").unwrap().value(&row), FieldValue::Null);
    }

    #[test]
    fn coerce_per_kind() {
        assert_eq!(
            FieldKind::Integer.coerce(" 42 "),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(FieldKind::Integer.coerce("4.2"), None);
        assert_eq!(FieldKind::Bool.coerce("TRUE"), Some(FieldValue::Bool(true)));
        assert_eq!(FieldKind::Bool.coerce("0"), Some(FieldValue::Bool(false)));
        assert_eq!(FieldKind::Bool.coerce("maybe"), None);
        assert_eq!(FieldKind::Uuid.coerce("not-a-uuid"), None);
        assert_eq!(
            FieldKind::Text.coerce(" padded "),
            Some(FieldValue::Text(" padded ".into()))
        );
    }

    #[test]
    fn coerce_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            FieldKind::Timestamp.coerce("2024-03-01"),
            Some(FieldValue::Timestamp(expected))
        );
        assert_eq!(
            FieldKind::Timestamp.coerce("2024-03-01T02:00:00+02:00"),
            Some(FieldValue::Timestamp(expected))
        );
        assert_eq!(FieldKind::Timestamp.coerce("03/01/2024"), None);
    }

    #[test]
    fn compare_follows_sql_null_semantics() {
        let a = FieldValue::Integer(1);
        assert_eq!(a.compare(&FieldValue::Integer(2)), Some(Ordering::Less));
        assert_eq!(a.compare(&FieldValue::Null), None);
        assert_eq!(FieldValue::Null.compare(&FieldValue::Null), None);
        assert_eq!(a.compare(&FieldValue::Text("1".into())), None);
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let null = FieldValue::Null;
        let one = FieldValue::Integer(1);
        let two = FieldValue::Integer(2);
        assert_eq!(null.sort_cmp(&one, SortDirection::Asc), Ordering::Greater);
        assert_eq!(null.sort_cmp(&one, SortDirection::Desc), Ordering::Greater);
        assert_eq!(one.sort_cmp(&two, SortDirection::Asc), Ordering::Less);
        assert_eq!(one.sort_cmp(&two, SortDirection::Desc), Ordering::Greater);
    }
}
