//! Query-string parsing, field registries, and the search builder.

pub mod builder;
pub mod page;
pub mod params;
pub mod registry;

pub use builder::{
    Comparison, CompiledQuery, Condition, Filter, LikeMode, SearchBuilder, SearchError, SortOrder,
    Test, Window,
};
pub use page::PageResult;
pub use params::{FilterClause, FilterOp, PageLimits, SearchRequest, SortClause, SortDirection};
pub use registry::{EntitySchema, Field, FieldKind, FieldRegistry, FieldValue};
