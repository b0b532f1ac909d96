//! Query-string parsing into a normalized search request.
//!
//! Grammar:
//!
//! ```text
//! filter[<field>]=<value>            implicit eq
//! filter[<field>][<op>]=<value>
//! sort=<field1>,-<field2>            leading '-' = descending
//! fields=<field1>,<field2>
//! page=<int>
//! pageSize=<int>
//! ```
//!
//! Parsing is lenient: malformed fragments are skipped, never reported. The
//! resulting [`SearchRequest`] is canonical, so two query strings that differ
//! only in parameter order or key casing produce equal requests (and therefore
//! the same cache fingerprint).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const FILTER_PREFIX: &str = "filter[";
/// Shortest well-formed filter key: `filter[x]`.
const MIN_FILTER_KEY_LEN: usize = FILTER_PREFIX.len() + 2;
/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 32;

/// Comparison applied by a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "startswith",
            FilterOp::EndsWith => "endswith",
            FilterOp::In => "in",
        }
    }

    /// Parse an operator name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "contains" => Some(FilterOp::Contains),
            "startswith" => Some(FilterOp::StartsWith),
            "endswith" => Some(FilterOp::EndsWith),
            "in" => Some(FilterOp::In),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `(field, operator, value)` filter. `field` is lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterClause {
    pub fn new(field: &str, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: field.trim().to_lowercase(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.trim().to_lowercase(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.trim().to_lowercase(),
            direction: SortDirection::Desc,
        }
    }
}

/// Page-size bounds applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Canonical search request.
///
/// - `filters` sorted by field, then operator, then value; duplicates removed
/// - `sort` in request order (first = primary key), never re-sorted
/// - `fields` lower-cased, deduplicated and sorted
/// - `page` >= 1, `page_size` within [`PageLimits`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filters: Vec<FilterClause>,
    pub sort: Vec<SortClause>,
    pub fields: Vec<String>,
    pub page: u32,
    pub page_size: u32,
}

impl SearchRequest {
    /// An unfiltered first page.
    pub fn new(limits: PageLimits) -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            fields: Vec::new(),
            page: 1,
            page_size: limits.default_page_size,
        }
    }

    /// Parse a raw (still percent-encoded) query string, without the leading `?`.
    pub fn from_query_str(query: &str, limits: PageLimits) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()), limits)
    }

    /// Parse already-decoded `(key, value)` pairs in request order.
    pub fn from_pairs<I, K, V>(pairs: I, limits: PageLimits) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self::new(limits);
        let mut fields = BTreeSet::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            match key.to_ascii_lowercase().as_str() {
                "sort" => push_sort_clauses(value, &mut request.sort),
                "fields" => {
                    fields.extend(
                        value
                            .split(',')
                            .map(|f| f.trim().to_lowercase())
                            .filter(|f| !f.is_empty()),
                    );
                }
                "page" => request.page = parse_page(value),
                "pagesize" => request.page_size = parse_page_size(value, limits),
                _ => {
                    if let Some(clause) = parse_filter(key, value) {
                        request.filters.push(clause);
                    }
                }
            }
        }

        request.fields = fields.into_iter().collect();
        request.canonicalize_filters();
        request
    }

    /// Sort filters into canonical order and drop exact duplicates.
    pub fn canonicalize_filters(&mut self) {
        self.filters.sort_by(|a, b| {
            a.field
                .cmp(&b.field)
                .then_with(|| a.op.as_str().cmp(b.op.as_str()))
                .then_with(|| a.value.cmp(&b.value))
        });
        self.filters.dedup();
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Canonical serialization used as the hashing input.
    pub fn canonical_json(&self) -> String {
        // Plain strings, enums and integers only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Stable hash of the canonical form, suitable for cache keys.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        hex
    }
}

/// Split `filter[field]` / `filter[field][op]` into `(field, op)`.
///
/// Returns `None` for anything malformed. A missing operator segment means `eq`.
pub fn parse_filter_key(key: &str) -> Option<(String, Option<String>)> {
    if key.len() < MIN_FILTER_KEY_LEN {
        return None;
    }
    let prefix = key.get(..FILTER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(FILTER_PREFIX) {
        return None;
    }
    let rest = &key[FILTER_PREFIX.len()..];
    let close = rest.find(']')?;
    let field = rest[..close].trim();
    if field.is_empty() || field.contains('[') {
        return None;
    }

    let tail = &rest[close + 1..];
    if tail.is_empty() {
        return Some((field.to_lowercase(), None));
    }
    let op = tail.strip_prefix('[')?.strip_suffix(']')?.trim();
    if op.is_empty() || op.contains(['[', ']']) {
        return None;
    }
    Some((field.to_lowercase(), Some(op.to_ascii_lowercase())))
}

fn parse_filter(key: &str, value: &str) -> Option<FilterClause> {
    let (field, op) = parse_filter_key(key)?;
    let op = match op {
        Some(op) => FilterOp::parse(&op)?,
        None => FilterOp::Eq,
    };
    if value.trim().is_empty() {
        return None;
    }
    Some(FilterClause {
        field,
        op,
        value: value.to_owned(),
    })
}

/// Append clauses from one `sort=` value. A field already present keeps its
/// first position; later repeats cannot change precedence.
fn push_sort_clauses(raw: &str, into: &mut Vec<SortClause>) {
    for part in raw.split(',') {
        let part = part.trim();
        let (field, direction) = match part.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Desc),
            None => (part.strip_prefix('+').unwrap_or(part), SortDirection::Asc),
        };
        let field = field.trim().to_lowercase();
        if field.is_empty() || into.iter().any(|s| s.field == field) {
            continue;
        }
        into.push(SortClause { field, direction });
    }
}

fn parse_page(raw: &str) -> u32 {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|page| *page >= 1)
        .map(|page| u32::try_from(page).unwrap_or(u32::MAX))
        .unwrap_or(1)
}

fn parse_page_size(raw: &str, limits: PageLimits) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(size) if size >= 1 => {
            u32::try_from(size).map_or(limits.max_page_size, |s| s.min(limits.max_page_size))
        }
        _ => limits.default_page_size,
    }
}
