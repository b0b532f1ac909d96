//! Compiles normalized search requests into typed predicates and orderings,
//! then runs the count + page round trips against an [`EntitySource`].

use super::page::PageResult;
use super::params::{FilterClause, FilterOp, SearchRequest, SortClause, SortDirection};
use super::registry::{EntitySchema, Field, FieldValue};
use crate::data::source::{Entity, EntitySource, IncludeApplier, SourceError};
use crate::utils::log_if_slow;
use std::cmp::Ordering;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

const SLOW_SEARCH: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search cancelled")]
    Cancelled,
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Ne => ord != Ordering::Equal,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Gte => ord != Ordering::Less,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Lte => ord != Ordering::Greater,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// Case-insensitive substring match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMode {
    Contains,
    StartsWith,
    EndsWith,
}

impl LikeMode {
    fn matches(self, haystack: &str, needle: &str) -> bool {
        let (haystack, needle) = (haystack.to_lowercase(), needle.to_lowercase());
        match self {
            LikeMode::Contains => haystack.contains(&needle),
            LikeMode::StartsWith => haystack.starts_with(&needle),
            LikeMode::EndsWith => haystack.ends_with(&needle),
        }
    }

    /// Wrap an already-escaped LIKE literal with the wildcards for this mode.
    pub fn pattern(self, escaped: &str) -> String {
        match self {
            LikeMode::Contains => format!("%{escaped}%"),
            LikeMode::StartsWith => format!("{escaped}%"),
            LikeMode::EndsWith => format!("%{escaped}"),
        }
    }
}

/// The test a condition applies to one field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Compare(Comparison, FieldValue),
    In(Vec<FieldValue>),
    Like(LikeMode, String),
    /// Natural-key lookups; not reachable from the query string.
    EqualsIgnoreCase(String),
}

#[derive(Debug, Clone)]
pub struct Condition<E> {
    pub field: Field<E>,
    pub test: Test,
}

impl<E> Condition<E> {
    pub fn new(field: Field<E>, test: Test) -> Self {
        Self { field, test }
    }

    /// Build a condition from a raw filter value, or `None` if the value does
    /// not coerce to the field's kind or the operator does not apply to it.
    pub fn compile(field: Field<E>, op: FilterOp, raw: &str) -> Option<Self> {
        let compare = |cmp: Comparison| {
            field
                .kind
                .coerce(raw)
                .map(|value| Test::Compare(cmp, value))
        };
        let like = |mode: LikeMode| {
            (field.kind.is_text() && !raw.is_empty()).then(|| Test::Like(mode, raw.to_owned()))
        };

        let test = match op {
            FilterOp::Eq => compare(Comparison::Eq),
            FilterOp::Ne => compare(Comparison::Ne),
            FilterOp::Gt => compare(Comparison::Gt),
            FilterOp::Gte => compare(Comparison::Gte),
            FilterOp::Lt => compare(Comparison::Lt),
            FilterOp::Lte => compare(Comparison::Lte),
            FilterOp::Contains => like(LikeMode::Contains),
            FilterOp::StartsWith => like(LikeMode::StartsWith),
            FilterOp::EndsWith => like(LikeMode::EndsWith),
            FilterOp::In => {
                let mut values: Vec<FieldValue> = Vec::new();
                for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match field.kind.coerce(item) {
                        Some(value) if !values.contains(&value) => values.push(value),
                        _ => {}
                    }
                }
                (!values.is_empty()).then_some(Test::In(values))
            }
        }?;
        Some(Self { field, test })
    }

    pub fn matches(&self, entity: &E) -> bool {
        let value = self.field.value(entity);
        match &self.test {
            Test::Compare(cmp, expected) => value.compare(expected).is_some_and(|o| cmp.holds(o)),
            Test::In(values) => values
                .iter()
                .any(|v| value.compare(v) == Some(Ordering::Equal)),
            Test::Like(mode, needle) => match &value {
                FieldValue::Text(s) => mode.matches(s, needle),
                _ => false,
            },
            Test::EqualsIgnoreCase(expected) => match &value {
                FieldValue::Text(s) => s.to_lowercase() == expected.to_lowercase(),
                _ => false,
            },
        }
    }
}

/// Conjunction of conditions. Empty matches everything.
#[derive(Debug, Clone)]
pub struct Filter<E> {
    conditions: Vec<Condition<E>>,
}

impl<E> Default for Filter<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> Filter<E> {
    pub fn all() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, condition: Condition<E>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition<E>] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, entity: &E) -> bool {
        self.conditions.iter().all(|c| c.matches(entity))
    }
}

/// Multi-key ordering, first key primary.
#[derive(Debug, Clone)]
pub struct SortOrder<E> {
    keys: Vec<(Field<E>, SortDirection)>,
}

impl<E> SortOrder<E> {
    pub fn keys(&self) -> &[(Field<E>, SortDirection)] {
        &self.keys
    }

    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        self.keys
            .iter()
            .map(|(field, dir)| field.value(a).sort_cmp(&field.value(b), *dir))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// A request translated into typed parts. `window: None` fetches every match.
#[derive(Debug, Clone)]
pub struct CompiledQuery<E> {
    pub filter: Filter<E>,
    pub order: SortOrder<E>,
    pub window: Option<Window>,
}

pub struct SearchBuilder<'a, E> {
    schema: &'a EntitySchema<E>,
}

impl<E: Entity> SearchBuilder<'static, E> {
    pub fn for_entity() -> Self {
        Self::new(E::schema())
    }
}

impl<'a, E: Entity> SearchBuilder<'a, E> {
    pub fn new(schema: &'a EntitySchema<E>) -> Self {
        Self { schema }
    }

    /// Compile filter clauses, silently dropping unknown fields and values that
    /// do not fit the field.
    pub fn filter(&self, clauses: &[FilterClause]) -> Filter<E> {
        let mut filter = Filter::all();
        for clause in clauses {
            match self.compile_clause(clause) {
                Some(condition) => filter = filter.with(condition),
                None => trace!(
                    entity = E::NAME,
                    field = %clause.field,
                    op = %clause.op,
                    "dropping filter clause"
                ),
            }
        }
        filter
    }

    /// Shorthand for an equality filter on a registered field. An unknown field
    /// yields an empty (match-all) filter.
    pub fn filter_eq(&self, field: &str, value: impl Into<FieldValue>) -> Filter<E> {
        match self.schema.filters.get(field) {
            Some(field) => Filter::all().with(Condition::new(
                field,
                Test::Compare(Comparison::Eq, value.into()),
            )),
            None => Filter::all(),
        }
    }

    /// Case-insensitive equality on a text field, for natural-key lookups.
    pub fn filter_eq_ignore_case(&self, field: &str, value: &str) -> Filter<E> {
        match self.schema.filters.get(field) {
            Some(field) if field.kind.is_text() => Filter::all().with(Condition::new(
                field,
                Test::EqualsIgnoreCase(value.to_owned()),
            )),
            _ => Filter::all(),
        }
    }

    fn compile_clause(&self, clause: &FilterClause) -> Option<Condition<E>> {
        let field = self.schema.filters.get(&clause.field)?;
        Condition::compile(field, clause.op, &clause.value)
    }

    /// Resolve sort clauses in request order. Falls back to the schema's default
    /// ordering and always ends with the row key as a tie-breaker.
    pub fn order(&self, clauses: &[SortClause]) -> SortOrder<E> {
        let mut keys: Vec<(Field<E>, SortDirection)> = clauses
            .iter()
            .filter_map(|c| self.schema.sorts.get(&c.field).map(|f| (f, c.direction)))
            .collect();
        if keys.is_empty() {
            keys = self.schema.default_order.clone();
        }
        let key = self.schema.key;
        if !keys.iter().any(|(f, _)| f.column == key.column) {
            keys.push((key, SortDirection::Asc));
        }
        SortOrder { keys }
    }

    pub fn compile(&self, request: &SearchRequest) -> CompiledQuery<E> {
        CompiledQuery {
            filter: self.filter(&request.filters),
            order: self.order(&request.sort),
            window: Some(Window {
                offset: request.offset(),
                limit: u64::from(request.page_size),
            }),
        }
    }

    /// Drop everything the registry would ignore, so requests with the same
    /// effect share one canonical form.
    pub fn sanitize(&self, mut request: SearchRequest) -> SearchRequest {
        request.filters.retain(|c| self.compile_clause(c).is_some());
        request.sort.retain(|c| self.schema.sorts.contains(&c.field));
        request
    }

    /// Count the filtered set, then fetch the requested page.
    ///
    /// A page past the end returns no items but the correct total. Both round
    /// trips abort with [`SearchError::Cancelled`] once `cancel` fires.
    pub async fn execute(
        &self,
        source: &dyn EntitySource<E>,
        request: &SearchRequest,
        include: Option<&dyn IncludeApplier<E>>,
        cancel: &CancellationToken,
    ) -> Result<PageResult<E>, SearchError> {
        let query = self.compile(request);
        let start = Instant::now();

        let total_count = cancellable(cancel, source.count(&query.filter)).await?;
        if request.offset() >= total_count {
            return Ok(PageResult::empty(
                total_count,
                request.page,
                request.page_size,
            ));
        }

        let mut items = cancellable(cancel, source.fetch(&query)).await?;
        if let Some(include) = include {
            cancellable(cancel, include.apply(&mut items)).await?;
        }
        log_if_slow(start, SLOW_SEARCH, E::NAME);

        Ok(PageResult {
            items,
            total_count,
            page: request.page,
            page_size: request.page_size,
        })
    }

    /// Every row matching `filter`, in default order.
    pub async fn list(
        &self,
        source: &dyn EntitySource<E>,
        filter: Filter<E>,
    ) -> Result<Vec<E>, SourceError> {
        let query = CompiledQuery {
            filter,
            order: self.order(&[]),
            window: None,
        };
        source.fetch(&query).await
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SearchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SearchError::Cancelled),
        result = fut => result.map_err(SearchError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemorySource;
    use crate::query::params::PageLimits;
    use crate::query::registry::{FieldKind, FieldRegistry};
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::LazyLock;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct Item {
        id: Uuid,
        name: String,
        qty: i64,
        active: bool,
        note: Option<String>,
        created_at: DateTime<Utc>,
        version: i64,
    }

    static SCHEMA: LazyLock<EntitySchema<Item>> = LazyLock::new(|| {
        let id = Field::new("id", "id", FieldKind::Uuid, |i: &Item| i.id.into());
        let name = Field::new("name", "name", FieldKind::Text, |i: &Item| {
            i.name.clone().into()
        });
        let qty = Field::new("qty", "qty", FieldKind::Integer, |i: &Item| i.qty.into());
        let active = Field::new("isActive", "is_active", FieldKind::Bool, |i: &Item| {
            i.active.into()
        });
        let note = Field::new("note", "note", FieldKind::Text, |i: &Item| {
            i.note.clone().into()
        });
        let created = Field::new(
            "createdAt",
            "created_at",
            FieldKind::Timestamp,
            |i: &Item| i.created_at.into(),
        );
        EntitySchema {
            filters: FieldRegistry::new()
                .with(id)
                .with(name)
                .with(qty)
                .with(active)
                .with(note)
                .with(created),
            sorts: FieldRegistry::new().with(name).with(qty).with(created),
            key: id,
            default_order: vec![(created, SortDirection::Desc)],
        }
    });

    impl Entity for Item {
        const NAME: &'static str = "item";

        fn id(&self) -> Uuid {
            self.id
        }

        fn row_version(&self) -> i64 {
            self.version
        }

        fn set_row_version(&mut self, version: i64) {
            self.version = version;
        }

        fn schema() -> &'static EntitySchema<Self> {
            &SCHEMA
        }

        fn unique_keys(&self) -> Vec<(&'static str, String)> {
            Vec::new()
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn item(n: u128, name: &str, qty: i64, active: bool) -> Item {
        Item {
            id: Uuid::from_u128(n),
            name: name.to_owned(),
            qty,
            active,
            note: None,
            created_at: base_time() + ChronoDuration::minutes(n as i64),
            version: 1,
        }
    }

    fn items() -> Vec<Item> {
        vec![
            item(1, "Anvil", 5, true),
            item(2, "bolt", 50, false),
            item(3, "Crate", 5, true),
            item(4, "Drill", 12, true),
            item(5, "anchor", 0, true),
        ]
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest::from_query_str(query, PageLimits::default())
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    fn matching(query: &str) -> Vec<String> {
        let filter = SearchBuilder::<Item>::for_entity().filter(&request(query).filters);
        let mut rows: Vec<String> = items()
            .into_iter()
            .filter(|i| filter.matches(i))
            .map(|i| i.name)
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn equality_and_ordering_operators() {
        assert_eq!(matching("filter[qty]=5"), vec!["Anvil", "Crate"]);
        assert_eq!(matching("filter[qty][ne]=5").len(), 3);
        assert_eq!(matching("filter[qty][gt]=5"), vec!["Drill", "bolt"]);
        assert_eq!(matching("filter[qty][gte]=12"), vec!["Drill", "bolt"]);
        assert_eq!(matching("filter[qty][lt]=5"), vec!["anchor"]);
        assert_eq!(matching("filter[qty][lte]=5"), vec!["Anvil", "Crate", "anchor"]);
    }

    #[test]
    fn substring_operators_ignore_case() {
        assert_eq!(matching("filter[name][contains]=AN"), vec!["Anvil", "anchor"]);
        assert_eq!(matching("filter[name][startswith]=b"), vec!["bolt"]);
        assert_eq!(matching("filter[name][endswith]=LL"), vec!["Drill"]);
    }

    #[test]
    fn in_operator_matches_any() {
        assert_eq!(matching("filter[qty][in]=0,12,999"), vec!["Drill", "anchor"]);
        assert_eq!(matching("filter[name][in]=bolt, Crate"), vec!["Crate", "bolt"]);
    }

    #[test]
    fn clauses_combine_with_and() {
        assert_eq!(
            matching("filter[isActive]=true&filter[qty][gte]=5"),
            vec!["Anvil", "Crate", "Drill"]
        );
    }

    #[test]
    fn unknown_fields_and_bad_values_are_dropped() {
        let all = matching("");
        assert_eq!(all.len(), 5);
        assert_eq!(matching("filter[password]=x"), all);
        assert_eq!(matching("filter[qty]=many"), all);
        assert_eq!(matching("filter[qty][in]=a,b"), all);
        // substring operators only apply to text
        assert_eq!(matching("filter[qty][contains]=5"), all);
    }

    #[test]
    fn null_values_never_match_comparisons() {
        let mut rows = items();
        rows[0].note = Some("fragile".into());
        let builder = SearchBuilder::<Item>::for_entity();
        let ne = builder.filter(&request("filter[note][ne]=other").filters);
        let hits: Vec<_> = rows.iter().filter(|i| ne.matches(i)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn sanitize_removes_ineffective_parts() {
        let builder = SearchBuilder::<Item>::for_entity();
        let noisy = builder.sanitize(request(
            "filter[qty]=5&filter[bogus]=1&filter[qty][gt]=x&sort=bogus,-name",
        ));
        let clean = builder.sanitize(request("filter[qty]=5&sort=-name"));
        assert_eq!(noisy, clean);
        assert_eq!(noisy.fingerprint(), clean.fingerprint());
    }

    #[test]
    fn order_falls_back_to_default_and_appends_key() {
        let builder = SearchBuilder::<Item>::for_entity();
        let order = builder.order(&[SortClause::asc("bogus")]);
        let cols: Vec<_> = order
            .keys()
            .iter()
            .map(|(f, d)| (f.column, *d))
            .collect();
        assert_eq!(
            cols,
            vec![
                ("created_at", SortDirection::Desc),
                ("id", SortDirection::Asc)
            ]
        );

        let order = builder.order(&[SortClause::desc("qty"), SortClause::asc("name")]);
        let cols: Vec<_> = order.keys().iter().map(|(f, _)| f.column).collect();
        assert_eq!(cols, vec!["qty", "name", "id"]);
    }

    #[test]
    fn multi_key_ordering_is_stable() {
        let builder = SearchBuilder::<Item>::for_entity();
        let order = builder.order(&[SortClause::asc("qty"), SortClause::desc("name")]);
        let mut rows = items();
        rows.sort_by(|a, b| order.compare(a, b));
        assert_eq!(names(&rows), vec!["anchor", "Crate", "Anvil", "Drill", "bolt"]);
    }

    #[tokio::test]
    async fn execute_counts_then_pages() {
        let source = MemorySource::with_rows(items());
        let builder = SearchBuilder::<Item>::for_entity();
        let cancel = CancellationToken::new();

        let page = builder
            .execute(
                &source,
                &request("filter[isActive]=true&sort=-createdAt&page=1&pageSize=2"),
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 4);
        assert_eq!(names(&page.items), vec!["anchor", "Drill"]);

        let page = builder
            .execute(
                &source,
                &request("filter[isActive]=true&sort=-createdAt&page=2&pageSize=2"),
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(names(&page.items), vec!["Crate", "Anvil"]);
    }

    #[tokio::test]
    async fn execute_past_last_page_is_empty() {
        let source = MemorySource::with_rows(items());
        let builder = SearchBuilder::<Item>::for_entity();
        let page = builder
            .execute(
                &source,
                &request("page=9&pageSize=2"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 5);
        assert_eq!(page.page, 9);
    }

    #[tokio::test]
    async fn execute_honors_cancellation() {
        let source = MemorySource::with_rows(items());
        let builder = SearchBuilder::<Item>::for_entity();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = builder
            .execute(&source, &request(""), None, &cancel)
            .await;
        assert!(matches!(result, Err(SearchError::Cancelled)));
    }

    #[tokio::test]
    async fn list_uses_default_order() {
        let source = MemorySource::with_rows(items());
        let builder = SearchBuilder::<Item>::for_entity();
        let rows = builder
            .list(&source, builder.filter_eq("isActive", true))
            .await
            .unwrap();
        assert_eq!(names(&rows), vec!["anchor", "Drill", "Crate", "Anvil"]);
    }
}
